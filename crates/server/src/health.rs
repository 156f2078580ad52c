use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use reengage_core::scheduler::RecommendationScheduler;
use reengage_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    scheduler: RecommendationScheduler,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub oracle: HealthCheck,
    pub scheduler: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, scheduler: RecommendationScheduler) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, scheduler })
}

/// Ready only when the database answers and the oracle can score.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let oracle = if state.scheduler.oracle_configured() {
        HealthCheck { status: "ready", detail: "recommendation oracle configured".to_string() }
    } else {
        HealthCheck { status: "degraded", detail: "recommendation oracle not configured".to_string() }
    };
    let scheduler_status = state.scheduler.status();
    let scheduler = HealthCheck {
        status: if scheduler_status.scheduled { "ready" } else { "idle" },
        detail: match scheduler_status.next_run {
            Some(next_run) => format!("next run at {}", next_run.to_rfc3339()),
            None => "no timer installed".to_string(),
        },
    };
    let ready = database.status == "ready" && oracle.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        oracle,
        scheduler,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}
