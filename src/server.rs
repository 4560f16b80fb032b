use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::ForecastError;
use crate::forecaster::Forecaster;
use crate::models::{Disease, FeatureRow, ForecastQuery, Observation, ProjectionResult};
use crate::projector::{project_to_month, ExogenousPolicy};

/// Everything the handlers need for one disease, built once at startup and
/// read-only afterwards. `predict` never mutates the forecaster, so the
/// state is shared across concurrent requests without locks.
pub struct DiseaseState {
    pub forecaster: Forecaster,
    pub features: Vec<FeatureRow>,
    pub last: Option<Observation>,
}

pub struct AppState {
    pub corona: DiseaseState,
    pub variole: DiseaseState,
    pub max_horizon_days: i64,
}

impl AppState {
    fn disease(&self, disease: Disease) -> &DiseaseState {
        match disease {
            Disease::Corona => &self.corona,
            Disease::Variole => &self.variole,
        }
    }
}

/// Maps the error taxonomy onto HTTP statuses: bad client inputs are 400,
/// missing history is 404, everything else is a 500 with its message.
struct ApiError(ForecastError);

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ForecastError::UnknownDisease(_) | ForecastError::SchemaMismatch(_) => {
                StatusCode::BAD_REQUEST
            }
            ForecastError::NoHistoricalData(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {}", self.0);
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictionRequest {
    pub disease: String,
    pub year: i32,
    pub month: u32,
    pub current_cases: f64,
    pub active_cases: f64,
}

#[derive(Debug, Serialize)]
struct PredictionResponse {
    prediction: f64,
    model_accuracy: f64,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_page_size")]
    page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    100
}

/// One page of rows; page numbering starts at 1 and out-of-range pages are
/// empty rather than errors.
fn page_slice(rows: &[FeatureRow], page: usize, page_size: usize) -> &[FeatureRow] {
    let page = page.max(1);
    let start = (page - 1).saturating_mul(page_size).min(rows.len());
    let end = start.saturating_add(page_size).min(rows.len());
    &rows[start..end]
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Pandemic Prediction API" }))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let disease: Disease = request.disease.parse()?;
    let disease_state = state.disease(disease);

    let vector = disease_state.forecaster.schema().request_vector(
        request.year,
        request.month,
        request.current_cases,
        request.active_cases,
    )?;
    let prediction = disease_state.forecaster.predict_one(&vector)?;

    Ok(Json(PredictionResponse {
        prediction,
        model_accuracy: disease_state.forecaster.accuracy(),
    }))
}

async fn predict_total_cases(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<ProjectionResult>, ApiError> {
    let query = ForecastQuery {
        disease: request.disease.parse()?,
        year: request.year,
        month: request.month,
        current_cases: request.current_cases,
        active_cases: request.active_cases,
    };
    let disease_state = state.disease(query.disease);

    let start = disease_state
        .last
        .ok_or_else(|| ForecastError::NoHistoricalData(query.disease.as_str().to_string()))?;

    let cumulative_total_cases = project_to_month(
        &disease_state.forecaster,
        start,
        &query,
        ExogenousPolicy::Static,
        state.max_horizon_days,
    )?;

    Ok(Json(ProjectionResult {
        cumulative_total_cases,
        model_accuracy: disease_state.forecaster.accuracy(),
    }))
}

async fn model_info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "corona_model_accuracy": state.corona.forecaster.accuracy(),
        "variole_model_accuracy": state.variole.forecaster.accuracy(),
    }))
}

async fn processed_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Json<serde_json::Value> {
    Json(json!({
        "corona": page_slice(&state.corona.features, params.page, params.page_size),
        "variole": page_slice(&state.variole.features, params.page, params.page_size),
        "total_corona": state.corona.features.len(),
        "total_variole": state.variole.features.len(),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/predict", post(predict))
        .route("/predict-total-cases", post(predict_total_cases))
        .route("/model-info", get(model_info))
        .route("/api/processed-data", get(processed_data))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(state: Arc<AppState>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("serving on {bind}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
