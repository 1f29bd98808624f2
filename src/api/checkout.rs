// src/api/checkout.rs

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::api::engine_error_response;
use crate::attempts;
use crate::models::{Provider, ProviderMethod, Tier};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub content_group_id: String,
    pub tier: Tier,
    pub provider: Provider,
    pub provider_method: ProviderMethod,
}

/// Prepares a gateway attempt and hands back the launch data. The price
/// comes from the catalog; any amount the client might send is ignored by
/// not being accepted at all.
#[utoipa::path(
    post,
    path = "/api/checkout",
    tag = "payments",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Attempt created, launch data returned"),
        (status = 400, description = "Unknown group/tier, method mismatch or duplicate purchase"),
        (status = 401, description = "Missing or invalid student token")
    )
)]
#[post("/checkout")]
pub async fn create_checkout(
    state: web::Data<AppState>,
    student_id: web::ReqData<i32>,
    payload: web::Json<CheckoutRequest>,
) -> impl Responder {
    let payload = payload.into_inner();

    let launch = match attempts::create_attempt(
        &state.pool,
        &state.config,
        *student_id,
        &payload.content_group_id,
        payload.tier,
        payload.provider,
        payload.provider_method,
    )
    .await
    {
        Ok(launch) => launch,
        Err(e) => return engine_error_response(&e),
    };

    HttpResponse::Ok().json(json!({
        "attempt_id": launch.attempt.id,
        "merchant_order_id": launch.attempt.merchant_order_id,
        "amount": launch.attempt.amount,
        "currency": launch.attempt.currency,
        "redirect_url": launch.redirect_url,
        "reference_code": launch.reference_code,
        "pay_by": launch.pay_by,
    }))
}

// /api/checkout
#[get("/checkout")]
pub async fn list_attempts(
    state: web::Data<AppState>,
    student_id: web::ReqData<i32>,
) -> impl Responder {
    match attempts::list_for_student(&state.pool, *student_id).await {
        Ok(attempts) => HttpResponse::Ok().json(attempts),
        Err(e) => {
            eprintln!("list_attempts db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

// /api/checkout/{id}/cancel — best-effort abort before the redirect finishes
#[post("/checkout/{id}/cancel")]
pub async fn cancel_checkout(
    state: web::Data<AppState>,
    student_id: web::ReqData<i32>,
    path: web::Path<i32>,
) -> impl Responder {
    match attempts::cancel_attempt(&state.pool, *student_id, path.into_inner()).await {
        Ok(attempt) => HttpResponse::Ok().json(attempt),
        Err(e) => engine_error_response(&e),
    }
}
