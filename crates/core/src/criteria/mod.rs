//! Reading-goal criteria engine.
//!
//! Stored `<field>_<subtype>` strings are loaded into a [`CriterionSet`],
//! translated into a [`CriteriaQuery`] predicate tree, and either rendered
//! to SQL by the `db` crate or evaluated here against pre-loaded rows.

pub mod evaluator;
pub mod params;
pub mod query;
pub mod registry;

pub use evaluator::AttemptRow;
pub use params::{
    validate_raw_params, AggregationMethod, CriterionParameter, CriterionSet, EnrolmentType,
    ListValues, ParamValue,
};
pub use query::{CompareOp, CriteriaQuery, Join, Operand, Predicate};
pub use registry::{ElementType, Field, FieldKind, FieldSpec, TimeBase, REGISTRY};
