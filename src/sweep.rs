// src/sweep.rs

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use crate::{attempts, entitlements};

/// Background expiry sweep: voucher attempts whose validity window has passed
/// go `pending -> expired`, and entitlements past `end_at` lose their
/// `active` flag. Both statements use the same optimistic guards as the
/// online paths, so a tick racing a late webhook is harmless and the task
/// can run on every instance.
pub fn start_expiry_sweep(pool: PgPool, interval_secs: u64) {
    tokio::spawn(async move {
        loop {
            match attempts::expire_overdue(&pool, Utc::now()).await {
                Ok(0) => {}
                Ok(n) => log::info!("expired {n} overdue voucher attempts"),
                Err(e) => log::error!("attempt expiry sweep error: {e}"),
            }

            match entitlements::deactivate_expired(&pool, Utc::now()).await {
                Ok(0) => {}
                Ok(n) => log::info!("deactivated {n} expired entitlements"),
                Err(e) => log::error!("entitlement expiry sweep error: {e}"),
            }

            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        }
    });
}
