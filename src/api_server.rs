//! REST API Server for the Text2Chart pipeline
//!
//! Exposes CSV upload, natural-language query, and dataset inspection
//! endpoints for frontend integration.

use crate::dataset::DatasetSummary;
use crate::error::PipelineError;
use crate::pipeline::{QueryPipeline, QueryResponse};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// API State - Shared between handlers
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<QueryPipeline>,
}

/// Request for natural-language query
#[derive(Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

/// Request for chart type suggestion
#[derive(Deserialize)]
pub struct SuggestChartRequest {
    pub question: String,
}

/// Response for CSV upload
#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub dataset_id: Uuid,
    pub filename: String,
    pub loaded_at: DateTime<Utc>,
    pub row_count: usize,
    pub columns: Vec<String>,
}

/// Response for health check
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub dataset_loaded: bool,
}

type ApiError = (StatusCode, Json<Value>);

/// Map pipeline errors onto HTTP classes. Caller mistakes are 4xx,
/// everything else is a 500; the body shape matches the query failure shape.
fn error_response(err: &PipelineError) -> ApiError {
    let status = match err {
        PipelineError::NoDataLoaded
        | PipelineError::Parse(_)
        | PipelineError::UnsupportedChartKind(_) => StatusCode::BAD_REQUEST,
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"success": false, "error": err.to_string()})))
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "error": message})),
    )
}

/// Service metadata and endpoint listing
async fn root_info() -> Json<Value> {
    Json(json!({
        "name": "text2chart",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /api/health": "liveness and whether a dataset is loaded",
            "POST /api/upload-csv": "multipart upload, field 'file'",
            "POST /api/query": "natural-language question over the loaded dataset",
            "GET /api/dataset-info": "row count, schema, and sample rows",
            "POST /api/suggest-chart": "chart type suggestion for a question",
        },
    }))
}

/// Health check endpoint
async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        dataset_loaded: state.pipeline.is_loaded().await,
    })
}

/// CSV upload endpoint. Expects a multipart form with a `file` field;
/// replaces the active dataset on success.
async fn upload_csv(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.csv").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(&format!("Failed to read upload: {}", e)))?;
        upload = Some((filename, bytes.to_vec()));
    }

    let (filename, bytes) =
        upload.ok_or_else(|| bad_request("Multipart field 'file' is required"))?;
    if bytes.is_empty() {
        return Err(bad_request("Uploaded file is empty"));
    }

    let summary = state
        .pipeline
        .ingest(&bytes, &filename)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(UploadResponse {
        success: true,
        dataset_id: summary.dataset_id,
        filename: summary.filename,
        loaded_at: summary.loaded_at,
        row_count: summary.row_count,
        columns: summary.columns,
    }))
}

/// Natural-language query endpoint. Always 200; failures are reported in
/// the body with `success: false` so clients handle one shape.
async fn query(
    State(state): State<ApiState>,
    Json(request): Json<QueryRequest>,
) -> Json<QueryResponse> {
    Json(state.pipeline.answer(&request.question).await)
}

/// Dataset inspection endpoint
async fn dataset_info(
    State(state): State<ApiState>,
) -> Result<Json<DatasetSummary>, ApiError> {
    state
        .pipeline
        .dataset_info()
        .await
        .map(Json)
        .map_err(|e| error_response(&e))
}

/// Chart suggestion endpoint
async fn suggest_chart(
    State(state): State<ApiState>,
    Json(request): Json<SuggestChartRequest>,
) -> Result<Json<Value>, ApiError> {
    let kind = state
        .pipeline
        .suggest_chart(&request.question)
        .await
        .map_err(|e| error_response(&e))?;
    Ok(Json(json!({"chart_type": kind})))
}

/// Create the API router
pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_info))
        .route("/api/health", get(health))
        .route("/api/upload-csv", post(upload_csv))
        .route("/api/query", post(query))
        .route("/api/dataset-info", get(dataset_info))
        .route("/api/suggest-chart", post(suggest_chart))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(
    host: &str,
    port: u16,
    state: ApiState,
) -> crate::error::Result<()> {
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Text2Chart API server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dataset::DatasetStore;
    use crate::synthesizer::QuerySynthesizer;

    fn test_state() -> ApiState {
        let config = AppConfig::default();
        let store = DatasetStore::new(std::env::temp_dir().join("text2chart_api_tests"));
        let synthesizer =
            QuerySynthesizer::from_config(&config).expect("default config builds a provider");
        ApiState {
            pipeline: Arc::new(QueryPipeline::new(store, synthesizer)),
        }
    }

    #[test]
    fn router_builds() {
        let _router = create_router(test_state());
    }

    #[test]
    fn error_responses_carry_the_uniform_failure_shape() {
        let (status, Json(body)) = error_response(&PipelineError::NoDataLoaded);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("Upload a CSV"));
    }

    #[test]
    fn not_found_maps_to_404_and_internal_errors_to_500() {
        let (status, _) = error_response(&PipelineError::NotFound("x.csv".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            error_response(&PipelineError::SqlExecution("boom".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn health_reports_no_dataset_initially() {
        let state = test_state();
        let Json(body) = health(State(state)).await;
        assert_eq!(body.status, "healthy");
        assert!(!body.dataset_loaded);
    }
}
