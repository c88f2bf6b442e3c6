//! Reading-goal badge criteria.
//!
//! The `core` crate holds the parameter model, the field registry, the
//! predicate tree that the query builder emits, and a pure evaluator that
//! applies it to pre-loaded attempt rows. It has no database dependency;
//! SQL rendering and execution live in `reader-badge-db`.

pub mod criteria;
pub mod error;
pub mod types;
