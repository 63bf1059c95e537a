use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::PipelineFailure;
use crate::extraction::PdfPageRasterizer;
use crate::inference::OpenRouterClient;
use crate::models::{AnalysisOutcome, AnalyzeReportRequest, AnalyzeReportResponse, StoredAnalysis};
use crate::orchestrator::MasterAnalyzer;
use crate::reconcile::data_source_message;
use crate::storage::{BlobStorage, FsBlobStorage, InMemoryResultStore, ResultStore, StorageError};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn pipeline_error(failure: &PipelineFailure) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "error": failure.reason(),
            "stage": failure.stage,
            "kind": failure.error.kind()
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<MasterAnalyzer>,
    pub blobs: Arc<dyn BlobStorage>,
    pub results: Arc<dyn ResultStore>,
}

/// Wire the production collaborators from configuration.
pub fn create_app(config: &ServiceConfig) -> Router {
    let analyzer = MasterAnalyzer::new(
        Arc::new(OpenRouterClient::new(config.inference.clone())),
        Arc::new(PdfPageRasterizer),
        config.pipeline,
    );

    build_router(AppState {
        analyzer: Arc::new(analyzer),
        blobs: Arc::new(FsBlobStorage::new(config.blob_root.clone())),
        results: Arc::new(InMemoryResultStore::new()),
    })
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/lab-reports/analyze", post(analyze_report))
        .route("/lab-reports/{id}", get(get_analysis))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

/// Tag every request with a fresh correlation id and run it inside a span
/// carrying that id.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert(CORRELATION_ID_HEADER, value.clone());
        let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
        let mut response = next.run(request).instrument(span).await;
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        return response;
    }

    next.run(request).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Lab Report Analysis Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Extracts, classifies and analyzes lab report documents",
        "endpoints": {
            "POST /lab-reports/analyze": "Analyze a document given inline (base64) or by bucket and path",
            "GET /lab-reports/{id}": "Fetch a stored analysis",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn load_document(state: &AppState, request: &AnalyzeReportRequest) -> Result<Vec<u8>, ApiError> {
    if let Some(encoded) = &request.document_base64 {
        return STANDARD
            .decode(encoded.trim())
            .map_err(|e| bad_request_error(&format!("documentBase64 is not valid base64: {}", e)));
    }

    let (Some(bucket), Some(path)) = (&request.bucket, &request.path) else {
        return Err(bad_request_error("Either documentBase64 or bucket and path are required"));
    };

    state.blobs.download(bucket, path).await.map_err(|e| match e {
        StorageError::NotFound { .. } => not_found_error("Document not found", &format!("{}/{}", bucket, path)),
        StorageError::InvalidPath(_) => bad_request_error(&e.to_string()),
        StorageError::Io(_) => {
            error!(error = %e, "Failed to download document");
            internal_error("Failed to download document", &e.to_string())
        }
    })
}

async fn analyze_report(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeReportRequest>,
) -> ApiResult<AnalyzeReportResponse> {
    let bytes = load_document(&state, &request).await?;
    if bytes.is_empty() {
        return Err(bad_request_error("Document is empty"));
    }
    info!(bytes = bytes.len(), has_form = request.form.is_some(), "Analyzing lab report");

    let (outcome, client_data) = match &request.form {
        Some(form) => {
            let analysis = state
                .analyzer
                .analyze_for_client(bytes, form)
                .await
                .map_err(|f| pipeline_error(&f))?;
            (analysis.outcome, Some(analysis.client_data))
        }
        None => {
            let outcome = state
                .analyzer
                .analyze_report(bytes)
                .await
                .map_err(|f| pipeline_error(&f))?;
            (outcome, None)
        }
    };

    let id = Uuid::new_v4().to_string();
    let data_source_message = client_data.as_ref().map(data_source_message);
    let summary = MasterAnalyzer::summary(outcome.result());

    let (status, result, reasons) = match outcome {
        AnalysisOutcome::Accepted { result } => {
            let stored = StoredAnalysis {
                id: id.clone(),
                stored_at: chrono::Utc::now(),
                result: result.clone(),
                client_data: client_data.clone(),
            };
            state.results.save(stored).await.map_err(|e| {
                error!(id = %id, error = %e, "Failed to store analysis");
                internal_error("Failed to store analysis", &e.to_string())
            })?;
            ("accepted", result, Vec::new())
        }
        AnalysisOutcome::Rejected { result, reasons } => {
            warn!(id = %id, ?reasons, "Analysis rejected, not stored");
            ("rejected", result, reasons)
        }
    };

    Ok(Json(AnalyzeReportResponse {
        id,
        status: status.to_string(),
        result,
        reasons,
        client_data,
        data_source_message,
        summary,
    }))
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StoredAnalysis> {
    info!(id = %id, "Fetching stored analysis");

    match state.results.get(&id).await {
        Ok(Some(stored)) => Ok(Json(stored)),
        Ok(None) => Err(not_found_error("Analysis not found", &id)),
        Err(e) => {
            error!(id = %id, error = %e, "Failed to read stored analysis");
            Err(internal_error("Failed to read stored analysis", &e.to_string()))
        }
    }
}
