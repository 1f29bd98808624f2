#![allow(dead_code)]

use std::env;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};

use coursepay::config::{Catalog, EngineConfig};
use coursepay::notify::{NotificationEvent, Notifier};
use coursepay::AppState;

pub const CARD_SECRET: &str = "card-test-secret";
pub const VOUCHER_SECRET: &str = "voucher-test-secret";
pub const JWT_SECRET: &str = "jwt-test-secret";
pub const REVIEWER_TOKEN: &str = "reviewer-test-token";

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

/// Provisions a disposable database from TEST_DATABASE_URL. Returns None
/// (and the test skips) when the variable is not set, so the suite stays
/// green on machines without Postgres.
pub async fn try_init_test_db() -> Option<TestDb> {
    dotenvy::dotenv().ok();
    let Ok(test_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping database test");
        return None;
    };
    let (admin_url, db_name) = split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url).await.expect("connect admin db");

    let _ = sqlx::query("SELECT pg_advisory_lock(727272)")
        .execute(&admin_pool)
        .await;

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    let create_result = sqlx::query(&create_sql).execute(&admin_pool).await;
    if let Err(e) = create_result {
        eprintln!("create test db error: {e}");
        let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
        sqlx::query(&create_sql)
            .execute(&admin_pool)
            .await
            .expect("create test db retry");
    }

    let _ = sqlx::query("SELECT pg_advisory_unlock(727272)")
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;

    let pool = PgPool::connect(&test_url).await.expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    Some(TestDb {
        pool,
        _guard: guard,
    })
}

pub fn test_catalog() -> Catalog {
    serde_json::from_value(serde_json::json!({
        "groups": {
            "algebra-101": {
                "title": "Algebra, first semester",
                "currency": "EGP",
                "plans": {
                    "trial": { "price": "0.00", "duration_days": 7 },
                    "standard": { "price": "100.00", "duration_days": 30 },
                    "extended": { "price": "250.00", "duration_days": 90 }
                }
            },
            "orientation": {
                "title": "Orientation week",
                "is_free": true,
                "currency": "EGP"
            }
        }
    }))
    .expect("test catalog json")
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        catalog: test_catalog(),
        card_webhook_secret: CARD_SECRET.to_string(),
        voucher_webhook_secret: VOUCHER_SECRET.to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        reviewer_token: REVIEWER_TOKEN.to_string(),
        voucher_validity_hours: 72,
        sweep_interval_secs: 60,
        checkout_base_url: "https://pay.test".to_string(),
    }
}

/// Collects events instead of delivering them.
#[derive(Default)]
pub struct RecordingNotifier {
    events: StdMutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn build_state(pool: PgPool, notifier: Arc<RecordingNotifier>) -> AppState {
    AppState {
        pool,
        config: Arc::new(test_config()),
        notifier,
    }
}
