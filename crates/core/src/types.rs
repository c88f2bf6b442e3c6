/// Host primary keys are BIGINT.
pub type DbId = i64;

/// Host timestamps are stored as unix seconds.
pub type UnixTime = i64;
