// src/config.rs

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::Tier;

/// Price and duration of one purchasable tier inside a content group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierPlan {
    pub price: Decimal,
    pub duration_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentGroup {
    pub title: String,
    #[serde(default)]
    pub is_free: bool,
    pub currency: String,
    #[serde(default)]
    pub plans: HashMap<Tier, TierPlan>,
}

/// The content collaborator's catalog: free flags and per-tier prices.
/// Loaded once at startup and injected into every component; amounts coming
/// from clients are only ever validated against it, never trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub groups: HashMap<String, ContentGroup>,
}

impl Catalog {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("read catalog {}: {e}", path.as_ref().display()))?;
        serde_json::from_str(&raw).map_err(|e| format!("parse catalog: {e}"))
    }

    pub fn group(&self, content_group_id: &str) -> Option<&ContentGroup> {
        self.groups.get(content_group_id)
    }

    /// Resolves the plan a student is trying to buy. `granted` is reserved
    /// for reviewer-issued entitlements and is never purchasable.
    pub fn purchase_plan(
        &self,
        content_group_id: &str,
        tier: Tier,
    ) -> Result<(&ContentGroup, &TierPlan), EngineError> {
        let group = self.group(content_group_id).ok_or_else(|| {
            EngineError::Validation(format!("unknown content group: {content_group_id}"))
        })?;
        if tier == Tier::Granted {
            return Err(EngineError::Validation(
                "tier 'granted' cannot be purchased".to_string(),
            ));
        }
        let plan = group.plans.get(&tier).ok_or_else(|| {
            EngineError::Validation(format!(
                "tier {} is not offered for {content_group_id}",
                tier.as_str()
            ))
        })?;
        Ok((group, plan))
    }
}

/// Everything the engine needs from the environment, resolved once in `main`
/// and passed down explicitly. Components never read ambient globals.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub catalog: Catalog,
    pub card_webhook_secret: String,
    pub voucher_webhook_secret: String,
    pub jwt_secret: String,
    pub reviewer_token: String,
    /// How long a voucher reference code stays payable before the sweep
    /// expires the attempt.
    pub voucher_validity_hours: i64,
    pub sweep_interval_secs: u64,
    /// Base of the hosted payment page; the card redirect URL is derived
    /// from it plus the merchant order id.
    pub checkout_base_url: String,
}
