// src/reconcile.rs
//
// Webhook reconciliation. Each provider's payload is verified and normalized
// at the boundary into one ProviderReport; from there a pure planner decides
// the transition and the executor applies it with the optimistic pending
// guard. Duplicate and reordered deliveries all collapse into the replay
// path.

use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::attempts;
use crate::config::Catalog;
use crate::entitlements;
use crate::error::EngineError;
use crate::models::{AttemptStatus, GatewayPaymentAttempt, Provider, SourceKind};
use crate::notify::{NotificationEvent, NotificationKind, Notifier};

/// HMAC-SHA256 of the raw body, hex-encoded. Both gateways sign this way,
/// each with its own shared secret.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    match hex::decode(signature_hex.trim()) {
        Ok(signature) => mac.verify_slice(&signature).is_ok(),
        Err(_) => false,
    }
}

/// Test/tooling helper: the signature a provider would attach to `body`.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedOutcome {
    Succeeded,
    Failed,
    /// A status string we do not recognize; acknowledged and ignored so the
    /// provider does not retry it forever.
    Unrecognized,
}

/// The provider-agnostic shape the state machine consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReport {
    pub merchant_order_id: String,
    pub outcome: ReportedOutcome,
    pub amount: Decimal,
    pub currency: String,
    pub provider_reference: Option<String>,
}

/// Card gateway callback body (flat camelCase JSON).
#[derive(Debug, Deserialize, ToSchema)]
pub struct CardGatewayPayload {
    #[serde(alias = "merchantOrderId", alias = "orderId")]
    pub merchant_order_id: String,
    pub status: String,
    /// Decimal string, e.g. "100.00".
    pub amount: String,
    pub currency: String,
    #[serde(rename = "transactionId", default)]
    pub transaction_id: Option<String>,
}

/// Voucher gateway callback body (nested snake_case JSON).
#[derive(Debug, Deserialize, ToSchema)]
pub struct VoucherGatewayPayload {
    pub event: String,
    pub order: VoucherOrder,
    pub paid_amount: String,
    pub currency_code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VoucherOrder {
    pub merchant_ref: String,
    #[serde(default)]
    pub store_receipt: Option<String>,
}

fn parse_amount(raw: &str) -> Result<Decimal, EngineError> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|e| EngineError::Validation(format!("unparseable amount {raw:?}: {e}")))
}

pub fn normalize_card_payload(body: &[u8]) -> Result<ProviderReport, EngineError> {
    let payload: CardGatewayPayload = serde_json::from_slice(body)
        .map_err(|e| EngineError::Validation(format!("malformed card payload: {e}")))?;

    let outcome = match payload.status.as_str() {
        "succeeded" | "success" | "paid" => ReportedOutcome::Succeeded,
        "failed" | "declined" | "canceled" => ReportedOutcome::Failed,
        _ => ReportedOutcome::Unrecognized,
    };

    Ok(ProviderReport {
        merchant_order_id: payload.merchant_order_id,
        outcome,
        amount: parse_amount(&payload.amount)?,
        currency: payload.currency,
        provider_reference: payload.transaction_id,
    })
}

pub fn normalize_voucher_payload(body: &[u8]) -> Result<ProviderReport, EngineError> {
    let payload: VoucherGatewayPayload = serde_json::from_slice(body)
        .map_err(|e| EngineError::Validation(format!("malformed voucher payload: {e}")))?;

    let outcome = match payload.event.as_str() {
        "voucher.paid" => ReportedOutcome::Succeeded,
        // provider-side expiry reports arrive as failures; our own expiry is
        // the sweep's job
        "voucher.rejected" | "voucher.expired" => ReportedOutcome::Failed,
        _ => ReportedOutcome::Unrecognized,
    };

    Ok(ProviderReport {
        merchant_order_id: payload.order.merchant_ref,
        outcome,
        amount: parse_amount(&payload.paid_amount)?,
        currency: payload.currency_code,
        provider_reference: payload.order.store_receipt,
    })
}

pub fn normalize_payload(provider: Provider, body: &[u8]) -> Result<ProviderReport, EngineError> {
    match provider {
        Provider::CardGateway => normalize_card_payload(body),
        Provider::VoucherGateway => normalize_voucher_payload(body),
    }
}

/// What the state machine wants done with a report against an attempt
/// snapshot. Pure so the decision table is testable without a database.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileAction {
    /// Attempt already terminal: acknowledge, optionally keep a provider
    /// reference the first delivery lacked.
    ReplayTerminal { backfill_reference: Option<String> },
    MarkPaid,
    MarkFailed,
    /// Reported amount/currency differ from the recorded attempt: force
    /// `failed` and alert, never accept the reported numbers.
    MismatchFailed,
    /// Unrecognized status string: acknowledge without touching the row.
    Ignore,
}

pub fn plan_transition(
    attempt: &GatewayPaymentAttempt,
    report: &ProviderReport,
) -> ReconcileAction {
    if attempt.status.is_terminal() {
        let backfill = if attempt.provider_reference.is_none() {
            report.provider_reference.clone()
        } else {
            None
        };
        return ReconcileAction::ReplayTerminal {
            backfill_reference: backfill,
        };
    }

    let mismatched = report.amount != attempt.amount
        || !report.currency.eq_ignore_ascii_case(&attempt.currency);

    match report.outcome {
        ReportedOutcome::Unrecognized => ReconcileAction::Ignore,
        _ if mismatched => ReconcileAction::MismatchFailed,
        ReportedOutcome::Succeeded => ReconcileAction::MarkPaid,
        ReportedOutcome::Failed => ReconcileAction::MarkFailed,
    }
}

/// How a delivery was absorbed; the HTTP layer acknowledges all of these
/// with 2xx once committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// No attempt with that merchant order id; acknowledged, flagged for
    /// audit.
    UnknownOrder,
    /// Replay of an already-terminal attempt.
    Replayed,
    /// Unrecognized status string.
    Ignored,
    Settled(AttemptStatus),
}

/// Steps 3-8 of the reconciliation contract: correlate, plan, transition
/// atomically, grant on success. Signature verification (steps 1-2) happens
/// in the HTTP layer before the raw body is parsed.
pub async fn process_report(
    pool: &PgPool,
    catalog: &Catalog,
    notifier: &dyn Notifier,
    report: ProviderReport,
) -> Result<WebhookDisposition, EngineError> {
    let Some(attempt) = attempts::find_by_merchant_order_id(pool, &report.merchant_order_id)
        .await?
    else {
        // неизвестный orderId — отвечаем 200, чтобы провайдер не ретраил
        // бесконечно; warn остаётся как след для ручного аудита
        log::warn!(
            "webhook for unknown merchant_order_id={} amount={} {}",
            report.merchant_order_id,
            report.amount,
            report.currency
        );
        return Ok(WebhookDisposition::UnknownOrder);
    };

    match plan_transition(&attempt, &report) {
        // Идемпотентность: терминальный статус не трогаем
        ReconcileAction::ReplayTerminal { backfill_reference } => {
            if let Some(reference) = backfill_reference {
                attempts::backfill_provider_reference(pool, attempt.id, &reference)
                    .await?;
            }
            log::info!(
                "webhook replay on settled attempt id={} status={}",
                attempt.id,
                attempt.status.as_str()
            );
            Ok(WebhookDisposition::Replayed)
        }

        ReconcileAction::Ignore => {
            log::info!(
                "webhook with unrecognized status for attempt id={}, ignored",
                attempt.id
            );
            Ok(WebhookDisposition::Ignored)
        }

        ReconcileAction::MarkFailed => {
            let won = attempts::mark_failed(pool, attempt.id, report.provider_reference.as_deref())
                .await?;
            if !won {
                return settle_as_replay(pool, attempt.id, &report).await;
            }
            notifier.notify(NotificationEvent {
                student_id: attempt.student_id,
                kind: NotificationKind::PaymentFailed,
                message: format!("Your payment for {} did not go through.", attempt.content_group_id),
            });
            Ok(WebhookDisposition::Settled(AttemptStatus::Failed))
        }

        ReconcileAction::MismatchFailed => {
            let mismatch = EngineError::ReconciliationMismatch {
                attempt_id: attempt.id,
                recorded_amount: attempt.amount,
                recorded_currency: attempt.currency.clone(),
                reported_amount: report.amount,
                reported_currency: report.currency.clone(),
            };
            // fraud/config signal: force the attempt down and alert, never
            // accept the reported numbers
            log::error!("{mismatch}");
            let won = attempts::mark_failed(pool, attempt.id, report.provider_reference.as_deref())
                .await?;
            if !won {
                return settle_as_replay(pool, attempt.id, &report).await;
            }
            Ok(WebhookDisposition::Settled(AttemptStatus::Failed))
        }

        ReconcileAction::MarkPaid => {
            let mut tx = pool.begin().await?;
            let won = attempts::mark_paid(
                &mut tx,
                attempt.id,
                Utc::now(),
                report.provider_reference.as_deref(),
            )
            .await?;

            if !won {
                tx.rollback().await?;
                return settle_as_replay(pool, attempt.id, &report).await;
            }

            let (_, plan) = catalog.purchase_plan(&attempt.content_group_id, attempt.tier)?;
            entitlements::grant(
                &mut tx,
                attempt.student_id,
                &attempt.content_group_id,
                attempt.tier,
                plan.duration_days,
                SourceKind::Gateway,
                attempt.id,
            )
            .await?;

            tx.commit().await?;

            notifier.notify(NotificationEvent {
                student_id: attempt.student_id,
                kind: NotificationKind::AccessGranted,
                message: format!("Payment received, access to {} is active.", attempt.content_group_id),
            });
            Ok(WebhookDisposition::Settled(AttemptStatus::Paid))
        }
    }
}

/// The optimistic guard reported zero rows: a concurrent delivery or the
/// sweep settled the attempt first. Re-read and fall into the replay path.
async fn settle_as_replay(
    pool: &PgPool,
    attempt_id: i32,
    report: &ProviderReport,
) -> Result<WebhookDisposition, EngineError> {
    let attempt = attempts::find_by_id(pool, attempt_id)
        .await?
        .ok_or_else(|| {
            EngineError::InvalidState(format!("attempt {attempt_id} vanished mid-reconcile"))
        })?;

    if attempt.provider_reference.is_none() {
        if let Some(reference) = report.provider_reference.as_deref() {
            attempts::backfill_provider_reference(pool, attempt.id, reference)
                .await?;
        }
    }

    log::info!(
        "lost transition race on attempt id={}, now {}",
        attempt.id,
        attempt.status.as_str()
    );
    Ok(WebhookDisposition::Replayed)
}
