// src/api/manual.rs

use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::api::{engine_error_response, reviewer_authorized};
use crate::manual;
use crate::models::{ReviewOutcome, Tier};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitManualRequest {
    pub content_group_id: String,
    pub tier: Tier,
    /// The amount the student claims to have transferred; must equal the
    /// catalog price for the tier.
    #[schema(value_type = String, example = "100.00")]
    pub amount: Decimal,
    /// Opaque reference to the uploaded proof (receipt photo, transfer id).
    pub proof_ref: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecideRequest {
    pub outcome: ReviewOutcome,
    pub reviewer_note: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/manual-requests",
    tag = "payments",
    request_body = SubmitManualRequest,
    responses(
        (status = 200, description = "Request stored as pending"),
        (status = 400, description = "Amount mismatch, unknown group/tier or duplicate purchase"),
        (status = 401, description = "Missing or invalid student token")
    )
)]
#[post("/manual-requests")]
pub async fn submit_manual_request(
    state: web::Data<AppState>,
    student_id: web::ReqData<i32>,
    payload: web::Json<SubmitManualRequest>,
) -> impl Responder {
    let payload = payload.into_inner();

    match manual::submit(
        &state.pool,
        &state.config.catalog,
        *student_id,
        &payload.content_group_id,
        payload.tier,
        payload.amount,
        &payload.proof_ref,
    )
    .await
    {
        Ok(request) => HttpResponse::Ok().json(request),
        Err(e) => engine_error_response(&e),
    }
}

// /api/manual-requests
#[get("/manual-requests")]
pub async fn list_manual_requests(
    state: web::Data<AppState>,
    student_id: web::ReqData<i32>,
) -> impl Responder {
    match manual::list_for_student(&state.pool, *student_id).await {
        Ok(requests) => HttpResponse::Ok().json(requests),
        Err(e) => {
            eprintln!("list_manual_requests db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Reviewer decision. One shot: a request that is no longer pending answers
/// 409 and nothing changes.
#[utoipa::path(
    post,
    path = "/api/manual-requests/{id}/decide",
    tag = "review",
    request_body = DecideRequest,
    responses(
        (status = 200, description = "Decision recorded; approval also granted access"),
        (status = 401, description = "Missing student token"),
        (status = 403, description = "Missing or wrong reviewer token"),
        (status = 409, description = "Request already decided")
    )
)]
#[post("/manual-requests/{id}/decide")]
pub async fn decide_manual_request(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i32>,
    payload: web::Json<DecideRequest>,
) -> impl Responder {
    if !reviewer_authorized(&req, &state.config) {
        return HttpResponse::Forbidden().json(json!({ "error": "reviewer token required" }));
    }

    let payload = payload.into_inner();

    match manual::decide(
        &state.pool,
        &state.config.catalog,
        state.notifier.as_ref(),
        path.into_inner(),
        payload.outcome,
        payload.reviewer_note.as_deref(),
    )
    .await
    {
        Ok(request) => HttpResponse::Ok().json(request),
        Err(e) => engine_error_response(&e),
    }
}
