//! Handler for the health check endpoint.

use axum::{Json, extract::State, http::StatusCode};

use crate::api::dto::health::{CheckStatus, HealthChecks, HealthResponse};
use crate::state::AppState;

/// Returns worker health with component checks.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response Codes
///
/// - **200 OK**: All components healthy
/// - **503 Service Unavailable**: One or more components degraded
///
/// # Components Checked
///
/// 1. **Database**: Reads outbox counters
/// 2. **Cache**: Redis PING (always ok when caching is disabled)
/// 3. **Outbox**: Result of the latest dispatch run
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "checks": {
///     "database": { "status": "ok", "message": "Connected, 3 pending outbox messages" },
///     "cache": { "status": "ok", "message": "Cache reachable" },
///     "outbox": { "status": "ok", "message": "Last run delivered 2 of 2 messages" }
///   }
/// }
/// ```
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let database = check_database(&state).await;
    let cache = check_cache(&state).await;
    let outbox = check_outbox(&state).await;

    let all_healthy = database.is_ok() && cache.is_ok() && outbox.is_ok();

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database,
            cache,
            outbox,
        },
    };

    if all_healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

async fn check_database(state: &AppState) -> CheckStatus {
    match state.outbox.stats().await {
        Ok(stats) => CheckStatus::ok(format!(
            "Connected, {} pending outbox messages",
            stats.pending
        )),
        Err(e) => CheckStatus::error(format!("Database error: {}", e)),
    }
}

async fn check_cache(state: &AppState) -> CheckStatus {
    if state.cache.health_check().await {
        CheckStatus::ok("Cache reachable")
    } else {
        CheckStatus::error("Cache connection failed")
    }
}

async fn check_outbox(state: &AppState) -> CheckStatus {
    match state.dispatcher_status.last().await {
        None => CheckStatus::ok("No dispatch run yet"),
        Some(last) => match (last.report, last.error) {
            (_, Some(error)) => CheckStatus::error(format!(
                "Last run at {} failed: {}",
                last.finished_at.to_rfc3339(),
                error
            )),
            (Some(report), None) => CheckStatus::ok(format!(
                "Last run delivered {} of {} messages",
                report.delivered, report.fetched
            )),
            (None, None) => CheckStatus::ok("Last run finished"),
        },
    }
}
