// src/api/webhooks.rs

use actix_web::{post, web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::error::EngineError;
use crate::models::Provider;
use crate::reconcile::{self, WebhookDisposition};
use crate::AppState;

/// Shared path for both gateways: verify the signature over the raw body,
/// normalize, reconcile. 2xx is only sent once the transition (or its
/// idempotent no-op) is committed; database trouble answers 5xx so the
/// provider retries.
async fn handle_webhook(
    provider: Provider,
    secret: &str,
    signature_header: &str,
    req: &HttpRequest,
    body: &web::Bytes,
    state: &AppState,
) -> HttpResponse {
    let signature = req
        .headers()
        .get(signature_header)
        .and_then(|h| h.to_str().ok());

    let Some(signature) = signature else {
        log::warn!("{} webhook without {signature_header}", provider.as_str());
        return HttpResponse::Unauthorized().json(json!({ "error": "missing signature" }));
    };

    if !reconcile::verify_signature(secret, body, signature) {
        log::warn!("{} webhook signature rejected", provider.as_str());
        return HttpResponse::Unauthorized().json(json!({ "error": "invalid signature" }));
    }

    let report = match reconcile::normalize_payload(provider, body) {
        Ok(report) => report,
        Err(e) => {
            log::warn!("{} webhook payload rejected: {e}", provider.as_str());
            return HttpResponse::BadRequest().json(json!({ "error": "malformed payload" }));
        }
    };

    match reconcile::process_report(
        &state.pool,
        &state.config.catalog,
        state.notifier.as_ref(),
        report,
    )
    .await
    {
        Ok(WebhookDisposition::Settled(_)) => HttpResponse::Ok().json(json!({ "ok": true })),
        Ok(WebhookDisposition::Replayed) => {
            HttpResponse::Ok().json(json!({ "ok": true, "idempotent": true }))
        }
        Ok(WebhookDisposition::UnknownOrder) | Ok(WebhookDisposition::Ignored) => {
            HttpResponse::Ok().json(json!({ "ok": true, "ignored": true }))
        }
        Err(EngineError::Db(e)) => {
            eprintln!("{} webhook db error: {e}", provider.as_str());
            HttpResponse::InternalServerError().finish()
        }
        Err(e) => {
            // misconfiguration (e.g. catalog missing the attempt's plan):
            // stay non-2xx so the provider redelivers once it is fixed
            log::error!("{} webhook processing error: {e}", provider.as_str());
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[utoipa::path(
    post,
    path = "/webhook/card",
    tag = "webhooks",
    request_body = crate::reconcile::CardGatewayPayload,
    responses(
        (status = 200, description = "Delivery absorbed (settled or idempotent no-op)"),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Signature verification failed"),
        (status = 500, description = "Transient error, provider should retry")
    )
)]
#[post("/webhook/card")]
pub async fn card_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    handle_webhook(
        Provider::CardGateway,
        &state.config.card_webhook_secret,
        "X-Signature",
        &req,
        &body,
        &state,
    )
    .await
}

#[utoipa::path(
    post,
    path = "/webhook/voucher",
    tag = "webhooks",
    request_body = crate::reconcile::VoucherGatewayPayload,
    responses(
        (status = 200, description = "Delivery absorbed (settled or idempotent no-op)"),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Signature verification failed"),
        (status = 500, description = "Transient error, provider should retry")
    )
)]
#[post("/webhook/voucher")]
pub async fn voucher_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    handle_webhook(
        Provider::VoucherGateway,
        &state.config.voucher_webhook_secret,
        "X-Voucher-Signature",
        &req,
        &body,
        &state,
    )
    .await
}
