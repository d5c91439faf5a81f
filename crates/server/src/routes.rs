use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, Method},
    routing::{get, post},
    Json, Router,
};
use cashpilot_core::TransactionType;
use cashpilot_insights::{AnalysisInput, AnalysisReport, InsightEngine, InsightType};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

/// Shared across requests; the engine itself is read-only.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<InsightEngine>,
}

impl ApiState {
    pub fn new(engine: InsightEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

pub fn router(state: ApiState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/api/insights", post(insights))
        .route("/api/categorize", post(categorize))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": env!("CARGO_PKG_NAME") }))
}

/// POST /api/insights: the full report for one transaction snapshot.
async fn insights(State(state): State<ApiState>, body: Bytes) -> Result<Json<AnalysisReport>, ApiError> {
    let input: AnalysisInput = serde_json::from_slice(&body)?;
    let report = state.engine.analyze(&input);
    tracing::info!(
        transactions = input.transactions.len(),
        orders = input.shopify_orders.len(),
        invoices = input.quickbooks_invoices.len(),
        bills = input.quickbooks_bills.len(),
        insights = report.insights.len(),
        critical = report.count_of(InsightType::Critical),
        score = report.health_score.score,
        "analysis complete"
    );
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct CategorizeRequest {
    description: String,
    #[serde(rename = "type")]
    kind: TransactionType,
}

#[derive(Debug, Serialize)]
struct CategorizeResponse {
    suggestions: Vec<String>,
}

/// POST /api/categorize: category suggestions for a description.
async fn categorize(State(state): State<ApiState>, body: Bytes) -> Result<Json<CategorizeResponse>, ApiError> {
    let request: CategorizeRequest = serde_json::from_slice(&body)?;
    let suggestions = state
        .engine
        .categorizer()
        .suggest(&request.description, request.kind);
    Ok(Json(CategorizeResponse { suggestions }))
}
