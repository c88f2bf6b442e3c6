//! Query builder: criterion parameters to a predicate tree.
//!
//! The tree mirrors one aggregate query over reading attempts:
//! row predicates form the WHERE clause, aggregate predicates the HAVING
//! clause, and each list is combined with the set's single
//! [`AggregationMethod`]. Under ANY with both kinds present the row
//! predicates move into HAVING as per-user "any row matched" tests, so one
//! matching predicate of either kind is enough. Joins are recorded only for
//! operands that an emitted predicate actually references.

use std::collections::BTreeSet;

use serde::Serialize;

use super::params::{AggregationMethod, CriterionSet, EnrolmentType, ListValues, ParamValue};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Operands and joins
// ---------------------------------------------------------------------------

/// A value a predicate compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// Total words of the user's eligible attempts.
    SumWords,
    BookWords,
    BookPublisher,
    BookGenre,
    BookDifficulty,
    BookName,
    /// When the attempt finished.
    TimeFinish,
    /// Seconds between the enrolment reference point and the attempt finish.
    SinceEnrolment(EnrolmentType),
    Username,
    ActivityName,
    CourseName,
    CategoryName,
}

impl Operand {
    /// Aggregate operands belong in HAVING, everything else in WHERE.
    pub fn is_aggregate(self) -> bool {
        matches!(self, Self::SumWords)
    }

    /// Joins needed beyond attempts and books, prerequisites first.
    pub fn joins(self) -> &'static [Join] {
        match self {
            Self::Username | Self::SinceEnrolment(EnrolmentType::Site) => &[Join::User],
            Self::ActivityName => &[Join::Activity],
            Self::CourseName => &[Join::Activity, Join::Course],
            Self::CategoryName => &[Join::Activity, Join::Course, Join::Category],
            Self::SinceEnrolment(EnrolmentType::Course) => {
                &[Join::Activity, Join::CourseEnrolment]
            }
            Self::SumWords
            | Self::BookWords
            | Self::BookPublisher
            | Self::BookGenre
            | Self::BookDifficulty
            | Self::BookName
            | Self::TimeFinish => &[],
        }
    }

    fn with_enrolment(self, enrolment: EnrolmentType) -> Self {
        match self {
            Self::SinceEnrolment(_) => Self::SinceEnrolment(enrolment),
            other => other,
        }
    }
}

/// Optional joins. Declaration order is dependency order.
///
/// Every join is on a key that yields at most one row per attempt, so
/// adding one never duplicates the words being summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Join {
    User,
    Activity,
    Course,
    Category,
    /// Earliest enrolment per (user, course), pre-aggregated.
    CourseEnrolment,
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Ge,
    Le,
}

impl CompareOp {
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::Ge => lhs >= rhs,
            Self::Le => lhs <= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Predicate {
    Compare {
        operand: Operand,
        op: CompareOp,
        value: i64,
    },
    /// Case-insensitive substring match; `negated` for exclude filters.
    Contains {
        operand: Operand,
        pattern: String,
        negated: bool,
    },
    InList {
        operand: Operand,
        values: ListValues,
    },
}

impl Predicate {
    pub fn operand(&self) -> Operand {
        match self {
            Self::Compare { operand, .. }
            | Self::Contains { operand, .. }
            | Self::InList { operand, .. } => *operand,
        }
    }
}

/// Predicates contributed by one parameter value.
fn predicates_for(operand: Operand, value: &ParamValue) -> Vec<Predicate> {
    let compare = |op: CompareOp, value: i64| Predicate::Compare { operand, op, value };
    let contains = |pattern: &str, negated: bool| Predicate::Contains {
        operand,
        pattern: pattern.to_string(),
        negated,
    };

    match value {
        ParamValue::Range { min, max } => [
            min.map(|v| compare(CompareOp::Ge, v)),
            max.map(|v| compare(CompareOp::Le, v)),
        ]
        .into_iter()
        .flatten()
        .collect(),
        ParamValue::DateRange { start, end } => [
            start.map(|v| compare(CompareOp::Ge, v)),
            end.map(|v| compare(CompareOp::Le, v)),
        ]
        .into_iter()
        .flatten()
        .collect(),
        ParamValue::Enrolment(_) => Vec::new(),
        ParamValue::List(values) if values.is_empty() => Vec::new(),
        ParamValue::List(values) => vec![Predicate::InList {
            operand,
            values: values.clone(),
        }],
        ParamValue::IncludeExclude { include, exclude } => [
            include
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| contains(s, false)),
            exclude
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| contains(s, true)),
        ]
        .into_iter()
        .flatten()
        .collect(),
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// The logical aggregate query for one criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriteriaQuery {
    pub method: AggregationMethod,
    /// Restrict to a single user when set.
    pub user_id: Option<DbId>,
    pub row_predicates: Vec<Predicate>,
    pub aggregate_predicates: Vec<Predicate>,
    pub joins: BTreeSet<Join>,
}

impl CriteriaQuery {
    /// Build the query for a criterion set.
    ///
    /// Returns `None` when no parameter emits a predicate: an incomplete
    /// criterion is never satisfied.
    pub fn build(set: &CriterionSet) -> Option<Self> {
        let enrolment = set.enrolment();
        let mut query = Self {
            method: set.method,
            user_id: None,
            row_predicates: Vec::new(),
            aggregate_predicates: Vec::new(),
            joins: BTreeSet::new(),
        };

        for param in &set.params {
            let operand = param.field.spec().operand.with_enrolment(enrolment);
            for predicate in predicates_for(operand, &param.value) {
                query.push(predicate);
            }
        }

        if query.row_predicates.is_empty() && query.aggregate_predicates.is_empty() {
            tracing::debug!("Criterion has no configured predicates");
            return None;
        }
        Some(query)
    }

    /// Whether row predicates are tested per user alongside the aggregates
    /// rather than filtering rows before summing.
    pub fn merges_clauses(&self) -> bool {
        self.method == AggregationMethod::Any
            && !self.row_predicates.is_empty()
            && !self.aggregate_predicates.is_empty()
    }

    /// Restrict the query to one user.
    pub fn for_user(mut self, user_id: DbId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    fn push(&mut self, predicate: Predicate) {
        let operand = predicate.operand();
        self.joins.extend(operand.joins().iter().copied());
        if operand.is_aggregate() {
            self.aggregate_predicates.push(predicate);
        } else {
            self.row_predicates.push(predicate);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
