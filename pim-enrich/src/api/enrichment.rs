//! Enrichment API handlers
//!
//! POST /enrich, GET /enrich/status, POST /enrich/retry

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::products::{ProductStatusRow, StatusSummary};
use crate::error::{ApiError, ApiResult};
use crate::services::ProductOutcome;
use crate::AppState;

/// POST /enrich request
#[derive(Debug, Deserialize)]
pub struct EnrichRequest {
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

/// POST /enrich response
#[derive(Debug, Serialize)]
pub struct EnrichResponse {
    pub message: String,
    /// Outcomes of the synchronous slice, 1:1 with its ids
    pub processed: Vec<ProductOutcome>,
    /// Number of ids deferred to background processing
    pub queued: usize,
}

/// GET /enrich/status query parameters
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Optional comma-separated product ids to scope the report
    pub ids: Option<String>,
}

/// GET /enrich/status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub products: Vec<ProductStatusRow>,
    pub summary: StatusSummary,
}

/// POST /enrich/retry request
#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    /// Ids to reset; all failed products when omitted
    #[serde(default)]
    pub product_ids: Option<Vec<Uuid>>,
}

/// POST /enrich/retry response
#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub count: u64,
}

/// POST /enrich
///
/// Start an enrichment run. The first slice is processed inline and its
/// results returned; the remainder is queued for background processing.
pub async fn start_enrichment(
    State(state): State<AppState>,
    Json(request): Json<EnrichRequest>,
) -> ApiResult<Json<EnrichResponse>> {
    let dispatch = state.scheduler.dispatch(request.product_ids).await?;

    tracing::info!(
        processed = dispatch.processed.len(),
        queued = dispatch.queued,
        "Enrichment request dispatched"
    );

    Ok(Json(EnrichResponse {
        message: "Enrichment process started".to_string(),
        processed: dispatch.processed,
        queued: dispatch.queued,
    }))
}

/// GET /enrich/status
///
/// Report per-product enrichment status plus a per-status summary,
/// optionally scoped to a set of ids.
pub async fn enrichment_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let scope = parse_scope(query.ids.as_deref())?;

    let products = crate::db::products::status_overview(&state.db, scope.as_deref()).await?;
    let summary = crate::db::products::status_counts(&state.db, scope.as_deref()).await?;

    Ok(Json(StatusResponse { products, summary }))
}

/// POST /enrich/retry
///
/// Reset failed products back to pending so a later run picks them up.
pub async fn retry_enrichment(
    State(state): State<AppState>,
    Json(request): Json<RetryRequest>,
) -> ApiResult<Json<RetryResponse>> {
    let count =
        crate::db::products::reset_failed(&state.db, request.product_ids.as_deref()).await?;

    tracing::info!(count, "Failed products reset to pending");

    Ok(Json(RetryResponse { count }))
}

fn parse_scope(ids: Option<&str>) -> ApiResult<Option<Vec<Uuid>>> {
    let Some(ids) = ids else {
        return Ok(None);
    };

    let parsed: Result<Vec<Uuid>, _> = ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Uuid::parse_str)
        .collect();

    match parsed {
        Ok(list) => Ok(Some(list)),
        Err(e) => Err(ApiError::BadRequest(format!("Invalid product id: {}", e))),
    }
}

/// Build enrichment routes
pub fn enrichment_routes() -> Router<AppState> {
    Router::new()
        .route("/enrich", post(start_enrichment))
        .route("/enrich/status", get(enrichment_status))
        .route("/enrich/retry", post(retry_enrichment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_parsing() {
        assert_eq!(parse_scope(None).unwrap(), None);

        let id = Uuid::new_v4();
        let parsed = parse_scope(Some(&format!(" {} ,", id))).unwrap().unwrap();
        assert_eq!(parsed, vec![id]);

        assert!(parse_scope(Some("not-a-uuid")).is_err());
    }
}
