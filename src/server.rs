//! HTTP API
//!
//! 単品・一括の画像選定をJSON/CSVで返す

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::output::outcome_to_csv;
use crate::service::{AnalyzeRequest, AnalyzeService};
use crate::traits::ImageExtractor;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub urls: Vec<String>,
    #[serde(default)]
    pub use_ai: bool,
}

pub fn router<E: ImageExtractor + 'static>(service: AnalyzeService<E>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze::<E>))
        .route("/api/bulk", post(bulk::<E>))
        .route("/api/bulk/csv", post(bulk_csv::<E>))
        .with_state(service)
}

async fn health() -> &'static str {
    "ok"
}

async fn analyze<E: ImageExtractor + 'static>(
    State(service): State<AnalyzeService<E>>,
    Json(req): Json<AnalyzeRequest>,
) -> Response {
    match service.analyze(&req).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            warn!("Analyze failed for {}: {}", req.url, e);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "url": req.url, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn bulk<E: ImageExtractor + 'static>(
    State(service): State<AnalyzeService<E>>,
    Json(req): Json<BulkRequest>,
) -> Response {
    let outcome = service.analyze_bulk(&req.urls, req.use_ai).await;
    Json(outcome).into_response()
}

async fn bulk_csv<E: ImageExtractor + 'static>(
    State(service): State<AnalyzeService<E>>,
    Json(req): Json<BulkRequest>,
) -> Response {
    let outcome = service.analyze_bulk(&req.urls, req.use_ai).await;
    match outcome_to_csv(&outcome) {
        Ok(body) => ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
