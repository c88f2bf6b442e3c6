use reader_badge_core::types::DbId;
use serde::Serialize;
use sqlx::FromRow;

/// One row of a rendered criteria query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct QualifyingUser {
    pub userid: DbId,
    /// Total words over the user's eligible attempts.
    pub sumwords: i64,
}
