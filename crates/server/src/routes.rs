//! HTTP surface over the scheduler and stored recommendations.
//!
//! Scheduler:
//! - `GET    /scheduler/status`
//! - `POST   /scheduler/start`
//! - `POST   /scheduler/stop`
//! - `POST   /scheduler/trigger`             409 while a pass is running
//! - `PUT    /scheduler/schedule`
//!
//! Recommendations:
//! - `POST   /recommendations/generate`
//! - `GET    /recommendations`
//! - `GET    /recommendations/customer/{id}`
//! - `PATCH  /recommendations/{id}/status`
//! - `GET    /recommendations/analytics`
//! - `DELETE /recommendations/cleanup`
//! - `GET    /recommendations/system/status`

use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use reengage_core::domain::customer::CustomerId;
use reengage_core::domain::query::{
    Page, RecommendationAnalytics, RecommendationQuery, SortDirection, SortField, SystemStatus,
};
use reengage_core::domain::recommendation::{
    RecommendationId, RecommendationRecord, RecommendationStatus, RecommendationType,
};
use reengage_core::errors::{ApplicationError, InterfaceError};
use reengage_core::scheduler::{RecommendationScheduler, SchedulerError, SchedulerStatus};
use reengage_core::workflow::{WorkflowError, WorkflowOutcome, WorkflowRequest};
use reengage_core::RecommendationAdmin;

#[derive(Clone)]
pub struct ApiState {
    pub scheduler: RecommendationScheduler,
    pub admin: RecommendationAdmin,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: &'static str,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize, Default)]
pub struct TriggerRequest {
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub schedule: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct GenerateRequest {
    pub customer_ids: Option<Vec<String>>,
    #[serde(default)]
    pub force_refresh: bool,
    pub recommendation_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub recommendation_type: Option<String>,
    pub min_priority: Option<u8>,
    pub max_priority: Option<u8>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CustomerParams {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SchedulerActionResponse {
    pub changed: bool,
    pub status: SchedulerStatus,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/scheduler/status", get(scheduler_status))
        .route("/scheduler/start", post(start_scheduler))
        .route("/scheduler/stop", post(stop_scheduler))
        .route("/scheduler/trigger", post(trigger_generation))
        .route("/scheduler/schedule", put(update_schedule))
        .route("/recommendations", get(list_recommendations))
        .route("/recommendations/generate", post(generate_recommendations))
        .route("/recommendations/analytics", get(analytics))
        .route("/recommendations/cleanup", delete(cleanup))
        .route("/recommendations/system/status", get(system_status))
        .route("/recommendations/customer/{id}", get(customer_recommendations))
        .route("/recommendations/{id}/status", patch(update_status))
        .with_state(state)
}

fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn failure(error: InterfaceError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(
            event_name = "api.request.failed",
            correlation_id = %error.correlation_id(),
            error = %error,
            "request failed"
        );
    }
    (
        status,
        Json(ApiError {
            error: error.to_string(),
            message: error.user_message(),
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}

fn application_failure(error: ApplicationError) -> (StatusCode, Json<ApiError>) {
    failure(error.into_interface(correlation_id()))
}

fn bad_request(message: String) -> (StatusCode, Json<ApiError>) {
    failure(InterfaceError::BadRequest { message, correlation_id: correlation_id() })
}

pub fn scheduler_interface_error(error: SchedulerError, correlation_id: String) -> InterfaceError {
    match error {
        SchedulerError::Busy => InterfaceError::Conflict { message: error.to_string(), correlation_id },
        SchedulerError::InvalidSchedule(_) => {
            InterfaceError::BadRequest { message: error.to_string(), correlation_id }
        }
        SchedulerError::Workflow(WorkflowError::OracleNotConfigured) => {
            InterfaceError::ServiceUnavailable { message: error.to_string(), correlation_id }
        }
        SchedulerError::Workflow(WorkflowError::CustomerDiscovery(inner)) => {
            inner.into_interface(correlation_id)
        }
        SchedulerError::NoRuntime => {
            InterfaceError::Internal { message: error.to_string(), correlation_id }
        }
    }
}

fn scheduler_failure(error: SchedulerError) -> (StatusCode, Json<ApiError>) {
    failure(scheduler_interface_error(error, correlation_id()))
}

fn parse_status(raw: &str) -> Result<RecommendationStatus, (StatusCode, Json<ApiError>)> {
    RecommendationStatus::parse(raw).ok_or_else(|| bad_request(format!("unknown status `{raw}`")))
}

fn parse_type(raw: &str) -> Result<RecommendationType, (StatusCode, Json<ApiError>)> {
    RecommendationType::parse(raw)
        .ok_or_else(|| bad_request(format!("unknown recommendation type `{raw}`")))
}

pub fn build_query(params: ListParams) -> Result<RecommendationQuery, (StatusCode, Json<ApiError>)> {
    let mut query = RecommendationQuery::default();
    match params.status.as_deref().map(str::trim) {
        None | Some("") => {}
        Some("all") => query.status = None,
        Some(raw) => query.status = Some(parse_status(raw)?),
    }
    if let Some(raw) = params.recommendation_type.as_deref() {
        query.recommendation_type = Some(parse_type(raw)?);
    }
    query.min_priority = params.min_priority;
    query.max_priority = params.max_priority;
    if let Some(raw) = params.sort_by.as_deref() {
        query.sort_by =
            SortField::parse(raw).ok_or_else(|| bad_request(format!("cannot sort by `{raw}`")))?;
    }
    if let Some(raw) = params.sort_order.as_deref() {
        query.direction = SortDirection::parse(raw)
            .ok_or_else(|| bad_request(format!("unknown sort order `{raw}`")))?;
    }
    if let Some(page) = params.page {
        query.page = page;
    }
    if let Some(limit) = params.limit {
        query.limit = limit;
    }
    Ok(query.normalized())
}

fn workflow_request(body: GenerateRequest) -> Result<WorkflowRequest, (StatusCode, Json<ApiError>)> {
    let allowed_types = match body.recommendation_types {
        Some(raw) if !raw.is_empty() => {
            Some(raw.iter().map(|kind| parse_type(kind)).collect::<Result<BTreeSet<_>, _>>()?)
        }
        _ => None,
    };
    Ok(WorkflowRequest {
        customer_ids: body
            .customer_ids
            .map(|ids| ids.into_iter().map(CustomerId::new).collect()),
        force_refresh: body.force_refresh,
        allowed_types,
    })
}

pub async fn scheduler_status(State(state): State<ApiState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}

pub async fn start_scheduler(State(state): State<ApiState>) -> ApiResult<SchedulerActionResponse> {
    let changed = state.scheduler.start().map_err(scheduler_failure)?;
    Ok(Json(SchedulerActionResponse { changed, status: state.scheduler.status() }))
}

pub async fn stop_scheduler(State(state): State<ApiState>) -> Json<SchedulerActionResponse> {
    let changed = state.scheduler.stop();
    Json(SchedulerActionResponse { changed, status: state.scheduler.status() })
}

pub async fn trigger_generation(
    State(state): State<ApiState>,
    Json(body): Json<TriggerRequest>,
) -> ApiResult<WorkflowOutcome> {
    let outcome =
        state.scheduler.trigger_manual(body.force_refresh).await.map_err(scheduler_failure)?;
    Ok(Json(outcome))
}

pub async fn update_schedule(
    State(state): State<ApiState>,
    Json(body): Json<ScheduleRequest>,
) -> ApiResult<SchedulerStatus> {
    state.scheduler.update_schedule(&body.schedule).map_err(scheduler_failure)?;
    Ok(Json(state.scheduler.status()))
}

pub async fn generate_recommendations(
    State(state): State<ApiState>,
    Json(body): Json<GenerateRequest>,
) -> ApiResult<WorkflowOutcome> {
    let request = workflow_request(body)?;
    let outcome = state.scheduler.generate(request).await.map_err(scheduler_failure)?;
    Ok(Json(outcome))
}

pub async fn list_recommendations(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Page<RecommendationRecord>> {
    let query = build_query(params)?;
    state.admin.list(query).await.map(Json).map_err(application_failure)
}

pub async fn customer_recommendations(
    State(state): State<ApiState>,
    Path(customer_id): Path<String>,
    Query(params): Query<CustomerParams>,
) -> ApiResult<Vec<RecommendationRecord>> {
    let status = params.status.as_deref().map(parse_status).transpose()?;
    state
        .admin
        .list_for_customer(&CustomerId::new(customer_id), status)
        .await
        .map(Json)
        .map_err(application_failure)
}

pub async fn update_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdateRequest>,
) -> ApiResult<RecommendationRecord> {
    let status = parse_status(&body.status)?;
    state
        .admin
        .update_status(&RecommendationId(id), status, body.notes.as_deref())
        .await
        .map(Json)
        .map_err(application_failure)
}

pub async fn analytics(State(state): State<ApiState>) -> ApiResult<RecommendationAnalytics> {
    state.admin.analytics().await.map(Json).map_err(application_failure)
}

pub async fn cleanup(State(state): State<ApiState>) -> ApiResult<CleanupResponse> {
    let deleted = state.admin.cleanup().await.map_err(application_failure)?;
    info!(event_name = "api.recommendations.cleanup", correlation_id = "api", deleted, "cleanup requested");
    Ok(Json(CleanupResponse { deleted }))
}

pub async fn system_status(State(state): State<ApiState>) -> ApiResult<SystemStatus> {
    state.admin.system_status().await.map(Json).map_err(application_failure)
}
