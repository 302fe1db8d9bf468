use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::domain::{LeadCapture, LeadId, TenantId};
use super::repository::{EnrollmentWriter, LeadRepository, LeadStatusView};
use super::service::{
    ConvertLead, LeadLifecycleService, LeadServiceError, LoseLead, ManualTransition,
    ReactivateLead,
};
use crate::error::lead_error_status;

type SharedService<R, E> = Arc<LeadLifecycleService<R, E>>;

/// Router exposing lead capture, scoring and lifecycle endpoints, scoped by tenant.
pub fn lead_router<R, E>(service: SharedService<R, E>) -> Router
where
    R: LeadRepository + 'static,
    E: EnrollmentWriter + 'static,
{
    Router::new()
        .route(
            "/api/v1/tenants/:tenant_id/leads",
            post(capture_handler::<R, E>),
        )
        .route(
            "/api/v1/tenants/:tenant_id/leads/:lead_id",
            get(status_handler::<R, E>),
        )
        .route(
            "/api/v1/tenants/:tenant_id/leads/:lead_id/score",
            get(score_handler::<R, E>),
        )
        .route(
            "/api/v1/tenants/:tenant_id/leads/:lead_id/eligibility",
            get(eligibility_handler::<R, E>),
        )
        .route(
            "/api/v1/tenants/:tenant_id/leads/:lead_id/transitions",
            get(history_handler::<R, E>).post(transition_handler::<R, E>),
        )
        .route(
            "/api/v1/tenants/:tenant_id/leads/:lead_id/convert",
            post(convert_handler::<R, E>),
        )
        .route(
            "/api/v1/tenants/:tenant_id/leads/:lead_id/lost",
            post(lost_handler::<R, E>),
        )
        .route(
            "/api/v1/tenants/:tenant_id/leads/:lead_id/reactivate",
            post(reactivate_handler::<R, E>),
        )
        .with_state(service)
}

fn ids(tenant_id: String, lead_id: String) -> (TenantId, LeadId) {
    (TenantId(tenant_id), LeadId(lead_id))
}

fn error_response(error: LeadServiceError) -> Response {
    let status = lead_error_status(&error);
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, LeadServiceError>,
) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn capture_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    Path(tenant_id): Path<String>,
    axum::Json(capture): axum::Json<LeadCapture>,
) -> Response
where
    R: LeadRepository + 'static,
    E: EnrollmentWriter + 'static,
{
    let tenant_id = TenantId(tenant_id);
    let result = service
        .capture(&tenant_id, capture)
        .map(|lead| LeadStatusView::from_lead(&lead));
    respond(StatusCode::ACCEPTED, result)
}

pub(crate) async fn status_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    Path((tenant_id, lead_id)): Path<(String, String)>,
) -> Response
where
    R: LeadRepository + 'static,
    E: EnrollmentWriter + 'static,
{
    let (tenant_id, lead_id) = ids(tenant_id, lead_id);
    let result = service
        .get(&tenant_id, &lead_id)
        .map(|lead| LeadStatusView::from_lead(&lead));
    respond(StatusCode::OK, result)
}

pub(crate) async fn score_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    Path((tenant_id, lead_id)): Path<(String, String)>,
) -> Response
where
    R: LeadRepository + 'static,
    E: EnrollmentWriter + 'static,
{
    let (tenant_id, lead_id) = ids(tenant_id, lead_id);
    respond(StatusCode::OK, service.rescore(&tenant_id, &lead_id))
}

pub(crate) async fn eligibility_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    Path((tenant_id, lead_id)): Path<(String, String)>,
) -> Response
where
    R: LeadRepository + 'static,
    E: EnrollmentWriter + 'static,
{
    let (tenant_id, lead_id) = ids(tenant_id, lead_id);
    respond(StatusCode::OK, service.eligibility(&tenant_id, &lead_id))
}

pub(crate) async fn history_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    Path((tenant_id, lead_id)): Path<(String, String)>,
) -> Response
where
    R: LeadRepository + 'static,
    E: EnrollmentWriter + 'static,
{
    let (tenant_id, lead_id) = ids(tenant_id, lead_id);
    respond(StatusCode::OK, service.history(&tenant_id, &lead_id))
}

pub(crate) async fn transition_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    Path((tenant_id, lead_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<ManualTransition>,
) -> Response
where
    R: LeadRepository + 'static,
    E: EnrollmentWriter + 'static,
{
    let (tenant_id, lead_id) = ids(tenant_id, lead_id);
    respond(
        StatusCode::OK,
        service.transition(&tenant_id, &lead_id, request),
    )
}

pub(crate) async fn convert_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    Path((tenant_id, lead_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<ConvertLead>,
) -> Response
where
    R: LeadRepository + 'static,
    E: EnrollmentWriter + 'static,
{
    let (tenant_id, lead_id) = ids(tenant_id, lead_id);
    match service.convert(&tenant_id, &lead_id, request).await {
        Ok(outcome) if outcome.success => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Ok(outcome) => (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn lost_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    Path((tenant_id, lead_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<LoseLead>,
) -> Response
where
    R: LeadRepository + 'static,
    E: EnrollmentWriter + 'static,
{
    let (tenant_id, lead_id) = ids(tenant_id, lead_id);
    respond(
        StatusCode::OK,
        service.mark_as_lost(&tenant_id, &lead_id, request),
    )
}

pub(crate) async fn reactivate_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    Path((tenant_id, lead_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<ReactivateLead>,
) -> Response
where
    R: LeadRepository + 'static,
    E: EnrollmentWriter + 'static,
{
    let (tenant_id, lead_id) = ids(tenant_id, lead_id);
    respond(
        StatusCode::OK,
        service.reactivate(&tenant_id, &lead_id, request),
    )
}
