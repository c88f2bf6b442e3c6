//! Badge criterion model.

use reader_badge_core::types::DbId;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `badge_criteria` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BadgeCriterion {
    pub id: DbId,
    pub badgeid: DbId,
    pub criteriatype: i64,
    /// Stored aggregation code: `1` = ALL, `2` = ANY.
    pub method: i64,
}
