// src/attempts.rs
//
// Gateway payment tracker. One row per checkout attempt, keyed by a
// caller-generated merchant order id the provider echoes back in every
// webhook. After creation the row is mutated only by the reconciler and the
// expiry sweep, always through an optimistic `WHERE status = 'pending'`
// transition.

use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{
    decode_enum, AttemptStatus, GatewayPaymentAttempt, Provider, ProviderMethod, Tier,
};

const COLUMNS: &str = "id, student_id, content_group_id, tier, amount, currency, provider, \
                       provider_method, merchant_order_id, provider_reference, status, \
                       expires_at, webhook_received_at, created_at, updated_at";

pub(crate) fn attempt_from_row(row: &PgRow) -> Result<GatewayPaymentAttempt, sqlx::Error> {
    let tier_raw: String = row.try_get("tier")?;
    let provider_raw: String = row.try_get("provider")?;
    let method_raw: String = row.try_get("provider_method")?;
    let status_raw: String = row.try_get("status")?;
    Ok(GatewayPaymentAttempt {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        content_group_id: row.try_get("content_group_id")?,
        tier: decode_enum("tier", &tier_raw, Tier::parse(&tier_raw))?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        provider: decode_enum("provider", &provider_raw, Provider::parse(&provider_raw))?,
        provider_method: decode_enum(
            "provider_method",
            &method_raw,
            ProviderMethod::parse(&method_raw),
        )?,
        merchant_order_id: row.try_get("merchant_order_id")?,
        provider_reference: row.try_get("provider_reference")?,
        status: decode_enum("status", &status_raw, AttemptStatus::parse(&status_raw))?,
        expires_at: row.try_get("expires_at")?,
        webhook_received_at: row.try_get("webhook_received_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// What the student needs to continue the payment: a redirect to the card
/// gateway's hosted page, or a reference code to quote at the store.
#[derive(Debug, Clone)]
pub struct CheckoutLaunch {
    pub attempt: GatewayPaymentAttempt,
    pub redirect_url: Option<String>,
    pub reference_code: Option<String>,
    pub pay_by: Option<DateTime<Utc>>,
}

/// Prepares an attempt: resolves the price from the catalog (the client sends
/// no amount), mints a fresh merchant order id and persists the row as
/// `pending`. No entitlement is touched here.
pub async fn create_attempt(
    pool: &PgPool,
    config: &EngineConfig,
    student_id: i32,
    content_group_id: &str,
    tier: Tier,
    provider: Provider,
    provider_method: ProviderMethod,
) -> Result<CheckoutLaunch, EngineError> {
    if provider_method.provider() != provider {
        return Err(EngineError::Validation(format!(
            "method {} is not offered by {}",
            provider_method.as_str(),
            provider.as_str()
        )));
    }

    let (group, plan) = config.catalog.purchase_plan(content_group_id, tier)?;

    if crate::entitlements::is_entitled(pool, student_id, content_group_id, Utc::now()).await? {
        return Err(EngineError::Validation(format!(
            "student {student_id} already has active access to {content_group_id}"
        )));
    }

    let merchant_order_id = Uuid::new_v4().to_string();
    let expires_at = match provider {
        // voucher codes stay payable for a bounded window; the sweep expires
        // attempts past it
        Provider::VoucherGateway => Some(Utc::now() + Duration::hours(config.voucher_validity_hours)),
        Provider::CardGateway => None,
    };

    let row = sqlx::query(&format!(
        r#"INSERT INTO gateway_payment_attempts
               (student_id, content_group_id, tier, amount, currency, provider,
                provider_method, merchant_order_id, status, expires_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9)
           RETURNING {COLUMNS}"#
    ))
    .bind(student_id)
    .bind(content_group_id)
    .bind(tier.as_str())
    .bind(plan.price)
    .bind(&group.currency)
    .bind(provider.as_str())
    .bind(provider_method.as_str())
    .bind(&merchant_order_id)
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    let attempt = attempt_from_row(&row).map_err(EngineError::Db)?;

    let (redirect_url, reference_code) = match provider {
        Provider::CardGateway => (
            Some(format!(
                "{}/pay/{}",
                config.checkout_base_url.trim_end_matches('/'),
                attempt.merchant_order_id
            )),
            None,
        ),
        Provider::VoucherGateway => (None, Some(attempt.merchant_order_id.clone())),
    };

    Ok(CheckoutLaunch {
        pay_by: attempt.expires_at,
        attempt,
        redirect_url,
        reference_code,
    })
}

pub async fn find_by_merchant_order_id(
    pool: &PgPool,
    merchant_order_id: &str,
) -> Result<Option<GatewayPaymentAttempt>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM gateway_payment_attempts WHERE merchant_order_id = $1"
    ))
    .bind(merchant_order_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(attempt_from_row).transpose()
}

pub async fn find_by_id(
    pool: &PgPool,
    attempt_id: i32,
) -> Result<Option<GatewayPaymentAttempt>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM gateway_payment_attempts WHERE id = $1"
    ))
    .bind(attempt_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(attempt_from_row).transpose()
}

/// `pending -> paid`, inside the reconciler's transaction so the grant
/// commits with it. Returns false when another delivery already settled the
/// attempt; the caller then re-reads and treats the report as a replay.
pub async fn mark_paid(
    tx: &mut Transaction<'_, Postgres>,
    attempt_id: i32,
    webhook_received_at: DateTime<Utc>,
    provider_reference: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE gateway_payment_attempts
           SET status = 'paid',
               webhook_received_at = $2,
               provider_reference = COALESCE($3, provider_reference),
               updated_at = NOW()
           WHERE id = $1 AND status = 'pending'"#,
    )
    .bind(attempt_id)
    .bind(webhook_received_at)
    .bind(provider_reference)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// `pending -> failed`; single statement, no grant involved.
pub async fn mark_failed(
    pool: &PgPool,
    attempt_id: i32,
    provider_reference: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE gateway_payment_attempts
           SET status = 'failed',
               webhook_received_at = NOW(),
               provider_reference = COALESCE($2, provider_reference),
               updated_at = NOW()
           WHERE id = $1 AND status = 'pending'"#,
    )
    .bind(attempt_id)
    .bind(provider_reference)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Replays may carry the provider's transaction id the first delivery lacked;
/// keep it for audit without re-running any grant logic.
pub async fn backfill_provider_reference(
    pool: &PgPool,
    attempt_id: i32,
    provider_reference: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE gateway_payment_attempts
           SET provider_reference = $2, updated_at = NOW()
           WHERE id = $1 AND provider_reference IS NULL"#,
    )
    .bind(attempt_id)
    .bind(provider_reference)
    .execute(pool)
    .await?;
    Ok(())
}

/// Best-effort student abort before redirect completion.
pub async fn cancel_attempt(
    pool: &PgPool,
    student_id: i32,
    attempt_id: i32,
) -> Result<GatewayPaymentAttempt, EngineError> {
    let row = sqlx::query(&format!(
        r#"UPDATE gateway_payment_attempts
           SET status = 'cancelled', updated_at = NOW()
           WHERE id = $1 AND student_id = $2 AND status = 'pending'
           RETURNING {COLUMNS}"#
    ))
    .bind(attempt_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => attempt_from_row(&row).map_err(EngineError::Db),
        None => match find_by_id(pool, attempt_id).await? {
            Some(attempt) if attempt.student_id == student_id => {
                Err(EngineError::InvalidState(format!(
                    "attempt {attempt_id} is already {}",
                    attempt.status.as_str()
                )))
            }
            _ => Err(EngineError::Validation(format!(
                "attempt {attempt_id} not found"
            ))),
        },
    }
}

/// Sweep-only `pending -> expired` for voucher attempts past their validity
/// window. Uses the same pending guard as the webhook path, so whichever of
/// the two commits first wins and the other becomes a no-op.
pub async fn expire_overdue(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE gateway_payment_attempts
           SET status = 'expired', updated_at = NOW()
           WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= $1"#,
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list_for_student(
    pool: &PgPool,
    student_id: i32,
) -> Result<Vec<GatewayPaymentAttempt>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM gateway_payment_attempts WHERE student_id = $1 ORDER BY created_at DESC"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(attempt_from_row).collect()
}
