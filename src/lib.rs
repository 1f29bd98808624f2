pub mod access;
pub mod api;
pub mod attempts;
pub mod config;
pub mod docs;
pub mod entitlements;
pub mod error;
pub mod manual;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod sweep;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::EngineConfig;
use crate::notify::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<EngineConfig>,
    pub notifier: Arc<dyn Notifier>,
}
