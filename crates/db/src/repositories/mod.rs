//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument and the configured [`Tables`]
//! as the second.
//!
//! [`Tables`]: crate::sql::Tables

pub mod criteria_param_repo;
pub mod reader_criteria_repo;

pub use criteria_param_repo::CriteriaParamRepo;
pub use reader_criteria_repo::ReaderCriteriaRepo;
