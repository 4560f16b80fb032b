use thiserror::Error;

/// Error taxonomy for the forecasting pipeline.
///
/// None of these are retried: forecasting failures are deterministic given
/// their inputs, so every error propagates immediately with its message.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The durable store is unreachable or a raw-table write failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A feature vector or table disagrees with the trained schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The request names a disease this service does not model.
    #[error("unknown disease: {0:?} (expected 'corona' or 'variole')")]
    UnknownDisease(String),

    /// The source table for the requested disease holds no rows.
    #[error("no historical data: {0}")]
    NoHistoricalData(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Catch-all around model and projection failures.
    #[error("{0}")]
    Internal(String),
}

impl From<sqlx::Error> for ForecastError {
    fn from(err: sqlx::Error) -> Self {
        ForecastError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
