use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ForecastError;

/// The two diseases this service forecasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disease {
    Corona,
    Variole,
}

impl Disease {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disease::Corona => "corona",
            Disease::Variole => "variole",
        }
    }

    /// Name of the raw archival table in the durable store.
    pub fn raw_table(&self) -> &'static str {
        match self {
            Disease::Corona => "corona_original",
            Disease::Variole => "variole_original",
        }
    }
}

impl FromStr for Disease {
    type Err = ForecastError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "corona" => Ok(Disease::Corona),
            "variole" => Ok(Disease::Variole),
            other => Err(ForecastError::UnknownDisease(other.to_string())),
        }
    }
}

/// One cleaned, typed row of a disease time series.
///
/// The canonical numeric fields are always populated (missing cells become
/// zero at load time). The optional fields only exist for sources that carry
/// cumulative/active columns; `None` means the source has no such column,
/// which is different from a zero cell.
#[derive(Debug, Clone)]
pub struct CaseRow {
    pub country: String,
    pub date: NaiveDate,
    pub total_cases: f64,
    pub total_deaths: f64,
    pub new_cases: f64,
    pub new_deaths: f64,
    pub cumulative_total_cases: Option<f64>,
    pub active_cases: Option<f64>,
    pub daily_new_cases: Option<f64>,
}

/// Read-only geographic reference data joined into every disease table.
#[derive(Debug, Clone)]
pub struct GeoRecord {
    pub country: String,
    pub continent: String,
}

/// One fully joined, derived, model-ready record.
///
/// The date is a string here on purpose: this is the transport form served
/// over `/api/processed-data`, kept independent of the calendar type used
/// internally for date arithmetic.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureRow {
    pub country: String,
    pub date: String,
    pub continent: String,
    pub total_cases: f64,
    pub total_deaths: f64,
    pub new_cases: f64,
    pub new_deaths: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_total_cases: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_cases: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_new_cases: Option<f64>,
    pub year: i32,
    pub month: u32,
    pub month_sin: f64,
    pub month_cos: f64,
}

/// The latest known point of a disease table; anchor for projections.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub date: NaiveDate,
    pub cumulative_total: f64,
}

/// Inputs to a multi-day cumulative projection.
#[derive(Debug, Clone)]
pub struct ForecastQuery {
    pub disease: Disease,
    pub year: i32,
    pub month: u32,
    pub current_cases: f64,
    pub active_cases: f64,
}

/// Outcome of a projection; derived, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionResult {
    pub cumulative_total_cases: f64,
    pub model_accuracy: f64,
}

/// Latest date and its cumulative total across a disease table.
///
/// Sources that carry an explicit cumulative column use it; canonical-shape
/// sources fall back to `total_cases`, which is itself a running total.
pub fn last_observation(rows: &[CaseRow]) -> Option<Observation> {
    let latest = rows.iter().max_by_key(|row| row.date)?;
    Some(Observation {
        date: latest.date,
        cumulative_total: latest.cumulative_total_cases.unwrap_or(latest.total_cases),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, total: f64, cumulative: Option<f64>) -> CaseRow {
        CaseRow {
            country: "France".to_string(),
            date: date.parse().unwrap(),
            total_cases: total,
            total_deaths: 0.0,
            new_cases: 0.0,
            new_deaths: 0.0,
            cumulative_total_cases: cumulative,
            active_cases: None,
            daily_new_cases: None,
        }
    }

    #[test]
    fn disease_parses_known_names_only() {
        assert_eq!("corona".parse::<Disease>().unwrap(), Disease::Corona);
        assert_eq!("variole".parse::<Disease>().unwrap(), Disease::Variole);
        assert!(matches!(
            "ebola".parse::<Disease>(),
            Err(ForecastError::UnknownDisease(_))
        ));
    }

    #[test]
    fn last_observation_picks_the_latest_date() {
        let rows = vec![
            row("2024-12-30", 980.0, Some(990.0)),
            row("2024-12-31", 995.0, Some(1000.0)),
            row("2024-12-29", 970.0, Some(975.0)),
        ];
        let obs = last_observation(&rows).unwrap();
        assert_eq!(obs.date, "2024-12-31".parse::<NaiveDate>().unwrap());
        assert_eq!(obs.cumulative_total, 1000.0);
    }

    #[test]
    fn last_observation_falls_back_to_total_cases() {
        let rows = vec![row("2024-12-31", 420.0, None)];
        assert_eq!(last_observation(&rows).unwrap().cumulative_total, 420.0);
    }

    #[test]
    fn last_observation_is_none_for_empty_tables() {
        assert!(last_observation(&[]).is_none());
    }
}
