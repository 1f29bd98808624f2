// src/error.rs

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input rejected synchronously: wrong amount, unknown content group,
    /// duplicate purchase. Never retried automatically.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A transition that the state machine forbids, e.g. deciding a request
    /// that is no longer pending. Rejected and logged, never silently fixed.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Webhook signature did not verify. No state is touched.
    #[error("webhook authenticity check failed: {0}")]
    Authenticity(String),

    /// A webhook reported a different amount/currency than the attempt was
    /// created with. The attempt is forced to `failed` and this is alerted;
    /// it is the one case automatic handling stops short of resolving.
    #[error(
        "reconciliation mismatch on attempt {attempt_id}: reported {reported_amount} \
         {reported_currency}, recorded {recorded_amount} {recorded_currency}"
    )]
    ReconciliationMismatch {
        attempt_id: i32,
        recorded_amount: Decimal,
        recorded_currency: String,
        reported_amount: Decimal,
        reported_currency: String,
    },

    /// Transient infrastructure failure; webhook handlers answer 5xx so the
    /// provider retries.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
