// src/models.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Trial,
    Standard,
    Extended,
    /// Granted by a reviewer without a configured price; never purchasable.
    Granted,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Trial => "trial",
            Tier::Standard => "standard",
            Tier::Extended => "extended",
            Tier::Granted => "granted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "trial" => Some(Tier::Trial),
            "standard" => Some(Tier::Standard),
            "extended" => Some(Tier::Extended),
            "granted" => Some(Tier::Granted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Manual,
    Gateway,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Manual => "manual",
            SourceKind::Gateway => "gateway",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "manual" => Some(SourceKind::Manual),
            "gateway" => Some(SourceKind::Gateway),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    CardGateway,
    VoucherGateway,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::CardGateway => "card_gateway",
            Provider::VoucherGateway => "voucher_gateway",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "card_gateway" => Some(Provider::CardGateway),
            "voucher_gateway" => Some(Provider::VoucherGateway),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMethod {
    Card,
    Wallet,
    PayAtStore,
}

impl ProviderMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderMethod::Card => "card",
            ProviderMethod::Wallet => "wallet",
            ProviderMethod::PayAtStore => "pay_at_store",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "card" => Some(ProviderMethod::Card),
            "wallet" => Some(ProviderMethod::Wallet),
            "pay_at_store" => Some(ProviderMethod::PayAtStore),
            _ => None,
        }
    }

    /// Which gateway understands this method.
    pub fn provider(&self) -> Provider {
        match self {
            ProviderMethod::Card | ProviderMethod::Wallet => Provider::CardGateway,
            ProviderMethod::PayAtStore => Provider::VoucherGateway,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Paid,
    Failed,
    Expired,
    Cancelled,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Paid => "paid",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Expired => "expired",
            AttemptStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(AttemptStatus::Pending),
            "paid" => Some(AttemptStatus::Paid),
            "failed" => Some(AttemptStatus::Failed),
            "expired" => Some(AttemptStatus::Expired),
            "cancelled" => Some(AttemptStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses accept no further transitions; a webhook landing on
    /// one is an idempotent replay, never an error.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualStatus {
    Pending,
    Approved,
    Rejected,
}

impl ManualStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManualStatus::Pending => "pending",
            ManualStatus::Approved => "approved",
            ManualStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(ManualStatus::Pending),
            "approved" => Some(ManualStatus::Approved),
            "rejected" => Some(ManualStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Approve,
    Reject,
}

/// One row of the entitlement ledger. Rows are never mutated except for the
/// `active` flag (supersession, expiry, revocation); history stays queryable.
#[derive(Debug, Clone, Serialize)]
pub struct Entitlement {
    pub id: i32,
    pub student_id: i32,
    pub content_group_id: String,
    pub tier: Tier,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub active: bool,
    pub source_kind: SourceKind,
    pub source_id: i32,
    pub created_at: DateTime<Utc>,
}

impl Entitlement {
    /// Active and inside its validity window: `start_at <= now < end_at`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.active && self.start_at <= now && now < self.end_at
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualPaymentRequest {
    pub id: i32,
    pub student_id: i32,
    pub content_group_id: String,
    pub tier: Tier,
    pub amount: Decimal,
    pub currency: String,
    pub proof_ref: String,
    pub status: ManualStatus,
    pub reviewer_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayPaymentAttempt {
    pub id: i32,
    pub student_id: i32,
    pub content_group_id: String,
    pub tier: Tier,
    pub amount: Decimal,
    pub currency: String,
    pub provider: Provider,
    pub provider_method: ProviderMethod,
    pub merchant_order_id: String,
    pub provider_reference: Option<String>,
    pub status: AttemptStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub webhook_received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maps a TEXT column back onto its enum, surfacing corrupt rows as a decode
/// error instead of a panic.
pub(crate) fn decode_enum<T>(
    column: &'static str,
    raw: &str,
    parsed: Option<T>,
) -> Result<T, sqlx::Error> {
    parsed.ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unrecognized {column} value: {raw}").into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!AttemptStatus::Pending.is_terminal());
        for status in [
            AttemptStatus::Paid,
            AttemptStatus::Failed,
            AttemptStatus::Expired,
            AttemptStatus::Cancelled,
        ] {
            assert!(status.is_terminal(), "{status:?} should be terminal");
        }
    }

    #[test]
    fn entitlement_window_is_half_open() {
        let start = Utc::now();
        let ent = Entitlement {
            id: 1,
            student_id: 7,
            content_group_id: "algebra-101".to_string(),
            tier: Tier::Standard,
            start_at: start,
            end_at: start + Duration::days(30),
            active: true,
            source_kind: SourceKind::Manual,
            source_id: 1,
            created_at: start,
        };

        assert!(ent.is_current(start));
        assert!(ent.is_current(start + Duration::days(29)));
        // expiry needs no mutation, the time check alone flips the answer
        assert!(!ent.is_current(start + Duration::days(30)));

        let revoked = Entitlement { active: false, ..ent };
        assert!(!revoked.is_current(start));
    }

    #[test]
    fn provider_method_routes_to_its_gateway() {
        assert_eq!(ProviderMethod::Card.provider(), Provider::CardGateway);
        assert_eq!(ProviderMethod::Wallet.provider(), Provider::CardGateway);
        assert_eq!(
            ProviderMethod::PayAtStore.provider(),
            Provider::VoucherGateway
        );
    }

    #[test]
    fn status_strings_round_trip() {
        assert_eq!(AttemptStatus::parse("paid"), Some(AttemptStatus::Paid));
        assert_eq!(AttemptStatus::parse("refunded"), None);
        assert_eq!(Tier::parse(Tier::Granted.as_str()), Some(Tier::Granted));
        assert_eq!(SourceKind::parse("webhook"), None);
    }
}
