// src/api/entitlements.rs

use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

use crate::api::{engine_error_response, reviewer_authorized};
use crate::error::EngineError;
use crate::{access, entitlements, AppState};

// /api/entitlements — own ledger rows, newest first, with the derived
// "covers right now" flag
#[get("/entitlements")]
pub async fn list_entitlements(
    state: web::Data<AppState>,
    student_id: web::ReqData<i32>,
) -> impl Responder {
    let now = Utc::now();
    match entitlements::list_for_student(&state.pool, *student_id).await {
        Ok(rows) => {
            let body: Vec<_> = rows
                .into_iter()
                .map(|e| {
                    let current = e.is_current(now);
                    json!({
                        "id": e.id,
                        "content_group_id": e.content_group_id,
                        "tier": e.tier,
                        "start_at": e.start_at,
                        "end_at": e.end_at,
                        "active": e.active,
                        "current": current,
                    })
                })
                .collect();
            HttpResponse::Ok().json(body)
        }
        Err(e) => {
            eprintln!("list_entitlements db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

// /api/access/{content_group_id} — the one access-control read path
#[get("/access/{content_group_id}")]
pub async fn check_access(
    state: web::Data<AppState>,
    student_id: web::ReqData<i32>,
    path: web::Path<String>,
) -> impl Responder {
    let content_group_id = path.into_inner();
    match access::can_access(
        &state.pool,
        &state.config.catalog,
        *student_id,
        &content_group_id,
        Utc::now(),
    )
    .await
    {
        Ok(allowed) => HttpResponse::Ok().json(json!({
            "content_group_id": content_group_id,
            "can_access": allowed,
        })),
        Err(e) => {
            eprintln!("check_access db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

// /api/entitlements/{id}/revoke — refunds/bans, reviewer-side
#[post("/entitlements/{id}/revoke")]
pub async fn revoke_entitlement(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> impl Responder {
    if !reviewer_authorized(&req, &state.config) {
        return HttpResponse::Forbidden().json(json!({ "error": "reviewer token required" }));
    }

    let entitlement_id = path.into_inner();
    match entitlements::revoke(&state.pool, entitlement_id).await {
        Ok(true) => HttpResponse::Ok().json(json!({ "ok": true })),
        Ok(false) => engine_error_response(&EngineError::Validation(format!(
            "entitlement {entitlement_id} not found"
        ))),
        Err(e) => {
            eprintln!("revoke_entitlement db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

// /api/catalog — what is purchasable, straight from the injected catalog
#[get("/catalog")]
pub async fn list_catalog(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(&state.config.catalog)
}
