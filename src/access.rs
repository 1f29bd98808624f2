// src/access.rs
//
// The only access-control read path in the system. It reads the catalog's
// free flag and the entitlement ledger; it never looks at payment records,
// which keeps the answer cheap and independent of any provider.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::config::Catalog;
use crate::entitlements;

/// Free content is open to everyone; paid content needs an active,
/// unexpired entitlement. Unknown content groups are closed.
pub async fn can_access(
    pool: &PgPool,
    catalog: &Catalog,
    student_id: i32,
    content_group_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let Some(group) = catalog.group(content_group_id) else {
        return Ok(false);
    };
    if group.is_free {
        return Ok(true);
    }
    entitlements::is_entitled(pool, student_id, content_group_id, now).await
}
