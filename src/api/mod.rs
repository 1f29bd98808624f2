// src/api/mod.rs

pub mod auth;
pub mod checkout;
pub mod entitlements;
pub mod manual;
pub mod webhooks;

use actix_web::{HttpRequest, HttpResponse};
use serde_json::json;

use crate::config::EngineConfig;
use crate::error::EngineError;

pub(crate) fn engine_error_response(err: &EngineError) -> HttpResponse {
    match err {
        EngineError::Validation(msg) => HttpResponse::BadRequest().json(json!({ "error": msg })),
        EngineError::InvalidState(msg) => HttpResponse::Conflict().json(json!({ "error": msg })),
        EngineError::Authenticity(msg) => {
            HttpResponse::Unauthorized().json(json!({ "error": msg }))
        }
        EngineError::ReconciliationMismatch { .. } | EngineError::Db(_) => {
            eprintln!("internal error: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// The reviewer surface sits behind a shared token the platform hands to its
/// review UI; who may hold that token is the platform's concern.
pub(crate) fn reviewer_authorized(req: &HttpRequest, config: &EngineConfig) -> bool {
    req.headers()
        .get("X-Reviewer-Token")
        .and_then(|h| h.to_str().ok())
        .map(|token| token == config.reviewer_token)
        .unwrap_or(false)
}
