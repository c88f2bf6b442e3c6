//! Row structs for the host's badge and reading tables.
//!
//! Each submodule contains a `FromRow` + `Serialize` struct matching the
//! database row, plus a `Deserialize` DTO where rows are written.

pub mod badge_criterion;
pub mod criteria_param;
pub mod qualifying_user;
