//! Stored criterion parameter model.

use reader_badge_core::types::DbId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `badge_criteria_param` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CriteriaParam {
    pub id: DbId,
    pub critid: DbId,
    pub name: String,
    pub value: String,
}

/// DTO for inserting one parameter row.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCriteriaParam {
    pub name: String,
    pub value: String,
}
