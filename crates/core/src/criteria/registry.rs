//! Field registry.
//!
//! Every filter a reading criterion understands is declared once in
//! [`REGISTRY`]: its stored name, the kind of value it carries and the
//! operand its predicates target. Loading, serializing, validating and
//! query building all dispatch on these entries rather than on names.

use serde::{Deserialize, Serialize};

use super::query::Operand;
use super::params::EnrolmentType;

// ---------------------------------------------------------------------------
// Subtypes
// ---------------------------------------------------------------------------

pub const SUBTYPE_MIN: &str = "min";
pub const SUBTYPE_MAX: &str = "max";
pub const SUBTYPE_START: &str = "start";
pub const SUBTYPE_END: &str = "end";
pub const SUBTYPE_TYPE: &str = "type";
pub const SUBTYPE_LIST: &str = "list";
pub const SUBTYPE_INCLUDE: &str = "include";
pub const SUBTYPE_EXCLUDE: &str = "exclude";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// A semantic criterion field.
///
/// Variant order is the order parameters appear in a loaded
/// [`CriterionSet`](super::CriterionSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    ReadingGoal,
    WordCount,
    FixedTime,
    RelativeTime,
    Enrolment,
    Publishers,
    Difficulties,
    Genres,
    Book,
    Username,
    Activity,
    Course,
    Category,
}

impl Field {
    /// Look up a field by its stored name.
    pub fn from_name(name: &str) -> Option<Self> {
        REGISTRY.iter().find(|spec| spec.name == name).map(|spec| spec.field)
    }

    /// The registry entry for this field.
    pub fn spec(self) -> &'static FieldSpec {
        // REGISTRY holds exactly one row per variant, in variant order.
        &REGISTRY[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn kind(self) -> FieldKind {
        self.spec().kind
    }
}

/// Whether a time range is absolute or measured from enrolment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBase {
    /// Bounds are points in time (unix seconds).
    Absolute,
    /// Bounds are durations (seconds) after the enrolment reference point.
    Relative,
}

/// Element type of a set-membership list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Int,
    Text,
}

/// The shape of a field's value and the raw subtypes it is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    NumericRange,
    DateRange(TimeBase),
    EnumSingle,
    SetMembership(ElementType),
    TextIncludeExclude,
}

impl FieldKind {
    /// Raw subtypes accepted for this kind.
    pub fn subtypes(self) -> &'static [&'static str] {
        match self {
            Self::NumericRange => &[SUBTYPE_MIN, SUBTYPE_MAX],
            Self::DateRange(_) => &[SUBTYPE_START, SUBTYPE_END],
            Self::EnumSingle => &[SUBTYPE_TYPE],
            Self::SetMembership(_) => &[SUBTYPE_LIST],
            Self::TextIncludeExclude => &[SUBTYPE_INCLUDE, SUBTYPE_EXCLUDE],
        }
    }

    pub fn accepts_subtype(self, subtype: &str) -> bool {
        self.subtypes().contains(&subtype)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Declarative description of one criterion field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: Field,
    /// Stored name, the first segment of `<name>_<subtype>`.
    pub name: &'static str,
    pub kind: FieldKind,
    /// What this field's predicates compare against.
    pub operand: Operand,
    /// List token meaning "any value"; a list containing it is unfiltered.
    pub any_token: Option<&'static str>,
}

const fn entry(field: Field, name: &'static str, kind: FieldKind, operand: Operand) -> FieldSpec {
    FieldSpec {
        field,
        name,
        kind,
        operand,
        any_token: None,
    }
}

pub const REGISTRY: &[FieldSpec] = &[
    entry(Field::ReadingGoal, "readinggoal", FieldKind::NumericRange, Operand::SumWords),
    entry(Field::WordCount, "wordcount", FieldKind::NumericRange, Operand::BookWords),
    entry(
        Field::FixedTime,
        "fixedtime",
        FieldKind::DateRange(TimeBase::Absolute),
        Operand::TimeFinish,
    ),
    entry(
        Field::RelativeTime,
        "relativetime",
        FieldKind::DateRange(TimeBase::Relative),
        Operand::SinceEnrolment(EnrolmentType::Site),
    ),
    entry(
        Field::Enrolment,
        "enrolment",
        FieldKind::EnumSingle,
        Operand::SinceEnrolment(EnrolmentType::Site),
    ),
    entry(
        Field::Publishers,
        "publishers",
        FieldKind::SetMembership(ElementType::Text),
        Operand::BookPublisher,
    ),
    FieldSpec {
        any_token: Some("0"),
        ..entry(
            Field::Difficulties,
            "difficulties",
            FieldKind::SetMembership(ElementType::Int),
            Operand::BookDifficulty,
        )
    },
    entry(
        Field::Genres,
        "genres",
        FieldKind::SetMembership(ElementType::Text),
        Operand::BookGenre,
    ),
    entry(Field::Book, "book", FieldKind::TextIncludeExclude, Operand::BookName),
    entry(Field::Username, "username", FieldKind::TextIncludeExclude, Operand::Username),
    entry(Field::Activity, "activity", FieldKind::TextIncludeExclude, Operand::ActivityName),
    entry(Field::Course, "course", FieldKind::TextIncludeExclude, Operand::CourseName),
    entry(Field::Category, "category", FieldKind::TextIncludeExclude, Operand::CategoryName),
];

/// Split a raw key into its field and subtype.
///
/// Returns `None` for unknown fields, subtypes the field does not accept,
/// and keys without a `_` separator.
pub fn parse_key(key: &str) -> Option<(Field, &str)> {
    let (name, subtype) = key.split_once('_')?;
    let field = Field::from_name(name)?;
    if field.kind().accepts_subtype(subtype) {
        Some((field, subtype))
    } else {
        None
    }
}

/// Build the raw key for a field and subtype.
pub fn raw_key(field: Field, subtype: &str) -> String {
    format!("{}_{subtype}", field.name())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
