// src/entitlements.rs
//
// The entitlement ledger. Rows are appended by the grant operation and only
// ever lose their `active` flag afterwards (supersession, expiry, revocation),
// so "current access" is always a query over the latest active row rather
// than a mutable pointer.

use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::models::{decode_enum, Entitlement, SourceKind, Tier};

const COLUMNS: &str = "id, student_id, content_group_id, tier, start_at, end_at, \
                       active, source_kind, source_id, created_at";

pub(crate) fn entitlement_from_row(row: &PgRow) -> Result<Entitlement, sqlx::Error> {
    let tier_raw: String = row.try_get("tier")?;
    let source_raw: String = row.try_get("source_kind")?;
    Ok(Entitlement {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        content_group_id: row.try_get("content_group_id")?,
        tier: decode_enum("tier", &tier_raw, Tier::parse(&tier_raw))?,
        start_at: row.try_get("start_at")?,
        end_at: row.try_get("end_at")?,
        active: row.try_get("active")?,
        source_kind: decode_enum("source_kind", &source_raw, SourceKind::parse(&source_raw))?,
        source_id: row.try_get("source_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Creates the entitlement a payment source produced, inside the caller's
/// transaction (the status flip of the source and the grant must commit or
/// roll back together).
///
/// Idempotent on `(source_kind, source_id)`: a replayed source returns the
/// row the first call created. Any other active grant for the same
/// `(student_id, content_group_id)` is superseded; rows owned by the same
/// source key are excluded from supersession so a concurrent duplicate can
/// never deactivate the winner's row.
pub async fn grant(
    tx: &mut Transaction<'_, Postgres>,
    student_id: i32,
    content_group_id: &str,
    tier: Tier,
    duration_days: i64,
    source_kind: SourceKind,
    source_id: i32,
) -> Result<Entitlement, sqlx::Error> {
    let existing = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM entitlements WHERE source_kind = $1 AND source_id = $2"
    ))
    .bind(source_kind.as_str())
    .bind(source_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(row) = existing {
        return entitlement_from_row(&row);
    }

    let start_at = Utc::now();
    let end_at = start_at + Duration::days(duration_days);

    sqlx::query(
        r#"UPDATE entitlements
           SET active = FALSE
           WHERE student_id = $1 AND content_group_id = $2 AND active
             AND NOT (source_kind = $3 AND source_id = $4)"#,
    )
    .bind(student_id)
    .bind(content_group_id)
    .bind(source_kind.as_str())
    .bind(source_id)
    .execute(&mut **tx)
    .await?;

    let inserted = sqlx::query(&format!(
        r#"INSERT INTO entitlements
               (student_id, content_group_id, tier, start_at, end_at, active, source_kind, source_id)
           VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7)
           ON CONFLICT ON CONSTRAINT entitlements_source_key DO NOTHING
           RETURNING {COLUMNS}"#
    ))
    .bind(student_id)
    .bind(content_group_id)
    .bind(tier.as_str())
    .bind(start_at)
    .bind(end_at)
    .bind(source_kind.as_str())
    .bind(source_id)
    .fetch_optional(&mut **tx)
    .await?;

    match inserted {
        Some(row) => entitlement_from_row(&row),
        // lost a same-source race after our existence check; the committed
        // row is the grant
        None => {
            let row = sqlx::query(&format!(
                "SELECT {COLUMNS} FROM entitlements WHERE source_kind = $1 AND source_id = $2"
            ))
            .bind(source_kind.as_str())
            .bind(source_id)
            .fetch_one(&mut **tx)
            .await?;
            entitlement_from_row(&row)
        }
    }
}

/// True iff an active entitlement covers `now` (`start_at <= now < end_at`).
pub async fn is_entitled(
    pool: &PgPool,
    student_id: i32,
    content_group_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT EXISTS(
               SELECT 1 FROM entitlements
               WHERE student_id = $1 AND content_group_id = $2
                 AND active AND start_at <= $3 AND end_at > $3
           ) AS entitled"#,
    )
    .bind(student_id)
    .bind(content_group_id)
    .bind(now)
    .fetch_one(pool)
    .await?;

    row.try_get("entitled")
}

/// Refunds/bans land here (external trigger). Returns false when the id does
/// not exist.
pub async fn revoke(pool: &PgPool, entitlement_id: i32) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE entitlements SET active = FALSE WHERE id = $1")
        .bind(entitlement_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_for_student(
    pool: &PgPool,
    student_id: i32,
) -> Result<Vec<Entitlement>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM entitlements WHERE student_id = $1 ORDER BY created_at DESC"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(entitlement_from_row).collect()
}

/// Sweep half of lazy expiry: flips `active` off once `end_at` has passed.
/// The access check never needs this to have run.
pub async fn deactivate_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE entitlements SET active = FALSE WHERE active AND end_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
