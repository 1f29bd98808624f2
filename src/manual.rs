// src/manual.rs
//
// Proof-of-payment flow: a student submits a pending request, a reviewer
// decides it exactly once. Approval and the resulting grant share one
// transaction.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::config::Catalog;
use crate::entitlements;
use crate::error::EngineError;
use crate::models::{
    decode_enum, ManualPaymentRequest, ManualStatus, ReviewOutcome, SourceKind, Tier,
};
use crate::notify::{NotificationEvent, NotificationKind, Notifier};

const COLUMNS: &str = "id, student_id, content_group_id, tier, amount, currency, proof_ref, \
                       status, reviewer_note, created_at, decided_at";

fn request_from_row(row: &PgRow) -> Result<ManualPaymentRequest, sqlx::Error> {
    let tier_raw: String = row.try_get("tier")?;
    let status_raw: String = row.try_get("status")?;
    Ok(ManualPaymentRequest {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        content_group_id: row.try_get("content_group_id")?,
        tier: decode_enum("tier", &tier_raw, Tier::parse(&tier_raw))?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        proof_ref: row.try_get("proof_ref")?,
        status: decode_enum("status", &status_raw, ManualStatus::parse(&status_raw))?,
        reviewer_note: row.try_get("reviewer_note")?,
        created_at: row.try_get("created_at")?,
        decided_at: row.try_get("decided_at")?,
    })
}

/// Creates a pending request. The claimed amount must equal the catalog price
/// for the tier, and a student who already holds an active entitlement for
/// the group cannot buy it again.
pub async fn submit(
    pool: &PgPool,
    catalog: &Catalog,
    student_id: i32,
    content_group_id: &str,
    tier: Tier,
    amount: Decimal,
    proof_ref: &str,
) -> Result<ManualPaymentRequest, EngineError> {
    let (group, plan) = catalog.purchase_plan(content_group_id, tier)?;

    if amount != plan.price {
        return Err(EngineError::Validation(format!(
            "amount {amount} does not match the {} price {} {}",
            tier.as_str(),
            plan.price,
            group.currency
        )));
    }

    if entitlements::is_entitled(pool, student_id, content_group_id, Utc::now()).await? {
        return Err(EngineError::Validation(format!(
            "student {student_id} already has active access to {content_group_id}"
        )));
    }

    let row = sqlx::query(&format!(
        r#"INSERT INTO manual_payment_requests
               (student_id, content_group_id, tier, amount, currency, proof_ref, status)
           VALUES ($1, $2, $3, $4, $5, $6, 'pending')
           RETURNING {COLUMNS}"#
    ))
    .bind(student_id)
    .bind(content_group_id)
    .bind(tier.as_str())
    .bind(plan.price)
    .bind(&group.currency)
    .bind(proof_ref)
    .fetch_one(pool)
    .await?;

    request_from_row(&row).map_err(EngineError::Db)
}

/// Reviewer decision, `pending -> approved | rejected`, exactly once. The
/// once-only flip is the same optimistic `WHERE status = 'pending'` guard the
/// webhook path uses, so two concurrent reviewers cannot both win.
pub async fn decide(
    pool: &PgPool,
    catalog: &Catalog,
    notifier: &dyn Notifier,
    request_id: i32,
    outcome: ReviewOutcome,
    reviewer_note: Option<&str>,
) -> Result<ManualPaymentRequest, EngineError> {
    let new_status = match outcome {
        ReviewOutcome::Approve => ManualStatus::Approved,
        ReviewOutcome::Reject => ManualStatus::Rejected,
    };

    let mut tx = pool.begin().await?;

    let flipped = sqlx::query(&format!(
        r#"UPDATE manual_payment_requests
           SET status = $2, decided_at = NOW(), reviewer_note = $3
           WHERE id = $1 AND status = 'pending'
           RETURNING {COLUMNS}"#
    ))
    .bind(request_id)
    .bind(new_status.as_str())
    .bind(reviewer_note)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = flipped else {
        // distinguish "never existed" from "already decided"
        let current = sqlx::query("SELECT status FROM manual_payment_requests WHERE id = $1")
            .bind(request_id)
            .fetch_optional(pool)
            .await?;
        return match current {
            None => Err(EngineError::Validation(format!(
                "manual request {request_id} not found"
            ))),
            Some(row) => {
                let status: String = row.try_get("status").map_err(EngineError::Db)?;
                Err(EngineError::InvalidState(format!(
                    "manual request {request_id} is already {status}"
                )))
            }
        };
    };

    let request = request_from_row(&row).map_err(EngineError::Db)?;

    if outcome == ReviewOutcome::Approve {
        let (_, plan) = catalog.purchase_plan(&request.content_group_id, request.tier)?;
        entitlements::grant(
            &mut tx,
            request.student_id,
            &request.content_group_id,
            request.tier,
            plan.duration_days,
            SourceKind::Manual,
            request.id,
        )
        .await?;
    }

    tx.commit().await?;

    match outcome {
        ReviewOutcome::Approve => notifier.notify(NotificationEvent {
            student_id: request.student_id,
            kind: NotificationKind::PaymentApproved,
            message: format!(
                "Your payment for {} was approved, access is active.",
                request.content_group_id
            ),
        }),
        ReviewOutcome::Reject => {
            let note = request.reviewer_note.as_deref().unwrap_or("no note");
            notifier.notify(NotificationEvent {
                student_id: request.student_id,
                kind: NotificationKind::PaymentRejected,
                message: format!(
                    "Your payment for {} was rejected: {note}",
                    request.content_group_id
                ),
            });
        }
    }

    Ok(request)
}

pub async fn list_for_student(
    pool: &PgPool,
    student_id: i32,
) -> Result<Vec<ManualPaymentRequest>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM manual_payment_requests WHERE student_id = $1 ORDER BY created_at DESC"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(request_from_row).collect()
}
