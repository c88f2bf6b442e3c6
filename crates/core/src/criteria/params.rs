//! Criteria parameter model.
//!
//! Converts the flat `<field>_<subtype>` strings a host stores for a badge
//! criterion into a [`CriterionSet`], and back. Loading is lenient: unknown
//! keys, falsy values and unparseable bounds contribute nothing. Use
//! [`validate_raw_params`] where a strict check is wanted.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use super::registry::{
    parse_key, raw_key, ElementType, Field, FieldKind, TimeBase, SUBTYPE_END, SUBTYPE_EXCLUDE,
    SUBTYPE_INCLUDE, SUBTYPE_LIST, SUBTYPE_MAX, SUBTYPE_MIN, SUBTYPE_START, SUBTYPE_TYPE,
};
use crate::error::CoreError;
use crate::types::UnixTime;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Stored code for "every parameter must hold".
pub const METHOD_ALL: i64 = 1;

/// Stored code for "at least one parameter must hold".
pub const METHOD_ANY: i64 = 2;

/// Stored code for enrolment relative to the site account.
pub const ENROLMENT_SITE: i64 = 0;

/// Stored code for enrolment relative to the activity's course.
pub const ENROLMENT_COURSE: i64 = 1;

/// Separator used when a list is collapsed back to text.
pub const LIST_SEPARATOR: &str = ", ";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How the predicates of a criterion are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    #[default]
    All,
    Any,
}

impl AggregationMethod {
    /// Convert from the host's stored method code.
    pub fn from_code(code: i64) -> Result<Self, CoreError> {
        match code {
            METHOD_ALL => Ok(Self::All),
            METHOD_ANY => Ok(Self::Any),
            _ => Err(CoreError::Validation(format!(
                "Invalid aggregation method {code}. Must be {METHOD_ALL} (all) or {METHOD_ANY} (any)"
            ))),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::All => METHOD_ALL,
            Self::Any => METHOD_ANY,
        }
    }

    /// Combine predicate outcomes. An empty input never reaches this; callers
    /// treat "no predicates" as an absent clause.
    pub fn combine(self, mut outcomes: impl Iterator<Item = bool>) -> bool {
        match self {
            Self::All => outcomes.all(|b| b),
            Self::Any => outcomes.any(|b| b),
        }
    }
}

/// Reference point for relative time windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrolmentType {
    /// The user's site account creation time.
    #[default]
    Site,
    /// The user's earliest enrolment in the reading activity's course.
    Course,
}

impl EnrolmentType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            ENROLMENT_SITE => Some(Self::Site),
            ENROLMENT_COURSE => Some(Self::Course),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Site => ENROLMENT_SITE,
            Self::Course => ENROLMENT_COURSE,
        }
    }
}

/// Tokens of a set-membership parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListValues {
    Int(Vec<i64>),
    Text(Vec<String>),
}

impl ListValues {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Int(v) => v.is_empty(),
            Self::Text(v) => v.is_empty(),
        }
    }

    fn empty(element: ElementType) -> Self {
        match element {
            ElementType::Int => Self::Int(Vec::new()),
            ElementType::Text => Self::Text(Vec::new()),
        }
    }

    /// Collapse to the stored text form, dropping empty entries.
    pub fn join(&self) -> String {
        match self {
            Self::Int(v) => v
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
            Self::Text(v) => v
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
        }
    }
}

/// The value of one configured parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Range {
        min: Option<i64>,
        max: Option<i64>,
    },
    DateRange {
        start: Option<UnixTime>,
        end: Option<UnixTime>,
    },
    Enrolment(EnrolmentType),
    List(ListValues),
    IncludeExclude {
        include: Option<String>,
        exclude: Option<String>,
    },
}

impl ParamValue {
    /// The unset value for a field kind.
    fn unset(kind: FieldKind) -> Option<Self> {
        match kind {
            FieldKind::NumericRange => Some(Self::Range {
                min: None,
                max: None,
            }),
            FieldKind::DateRange(_) => Some(Self::DateRange {
                start: None,
                end: None,
            }),
            FieldKind::EnumSingle => None,
            FieldKind::SetMembership(element) => Some(Self::List(ListValues::empty(element))),
            FieldKind::TextIncludeExclude => Some(Self::IncludeExclude {
                include: None,
                exclude: None,
            }),
        }
    }

    /// Whether nothing survived loading.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Range { min, max } => min.is_none() && max.is_none(),
            Self::DateRange { start, end } => start.is_none() && end.is_none(),
            Self::Enrolment(_) => false,
            Self::List(values) => values.is_empty(),
            Self::IncludeExclude { include, exclude } => include.is_none() && exclude.is_none(),
        }
    }

    /// Enrolment only selects the reference point of relative time.
    pub fn emits_predicate(&self) -> bool {
        !matches!(self, Self::Enrolment(_)) && !self.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

/// One configured filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionParameter {
    pub field: Field,
    pub value: ParamValue,
}

/// The parameters of a single badge criterion plus its aggregation method.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CriterionSet {
    pub method: AggregationMethod,
    /// Ordered by [`Field`]; at most one entry per field.
    pub params: Vec<CriterionParameter>,
}

impl CriterionSet {
    /// Load a set from raw stored parameters.
    pub fn load<I, K, V>(raw: I, method: AggregationMethod) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut fields: BTreeMap<Field, ParamValue> = BTreeMap::new();

        for (key, value) in raw {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            let parsed = parse_key(key);
            // "0" is a valid enrolment code (site), not an unset value.
            let enrolment = matches!(parsed, Some((field, _)) if field.kind() == FieldKind::EnumSingle);
            if value.is_empty() || (!enrolment && is_falsy(value)) {
                continue;
            }
            let Some((field, subtype)) = parsed else {
                tracing::debug!(key, "Ignoring unrecognised criterion parameter");
                continue;
            };
            apply(&mut fields, field, subtype, value);
        }

        let params = fields
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(field, value)| CriterionParameter { field, value })
            .collect();

        Self { method, params }
    }

    /// Collapse back to raw stored parameters.
    pub fn serialize(&self) -> BTreeMap<String, String> {
        let mut raw = BTreeMap::new();
        for param in &self.params {
            let field = param.field;
            let mut put = |subtype: &str, value: String| {
                if !value.is_empty() {
                    raw.insert(raw_key(field, subtype), value);
                }
            };
            match &param.value {
                ParamValue::Range { min, max } => {
                    if let Some(min) = min {
                        put(SUBTYPE_MIN, min.to_string());
                    }
                    if let Some(max) = max {
                        put(SUBTYPE_MAX, max.to_string());
                    }
                }
                ParamValue::DateRange { start, end } => {
                    if let Some(start) = start {
                        put(SUBTYPE_START, start.to_string());
                    }
                    if let Some(end) = end {
                        put(SUBTYPE_END, end.to_string());
                    }
                }
                ParamValue::Enrolment(enrolment) => put(SUBTYPE_TYPE, enrolment.code().to_string()),
                ParamValue::List(values) => put(SUBTYPE_LIST, values.join()),
                ParamValue::IncludeExclude { include, exclude } => {
                    if let Some(include) = include {
                        put(SUBTYPE_INCLUDE, include.trim().to_string());
                    }
                    if let Some(exclude) = exclude {
                        put(SUBTYPE_EXCLUDE, exclude.trim().to_string());
                    }
                }
            }
        }
        raw
    }

    pub fn get(&self, field: Field) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|p| p.field == field)
            .map(|p| &p.value)
    }

    /// The configured enrolment reference point, site by default.
    pub fn enrolment(&self) -> EnrolmentType {
        match self.get(Field::Enrolment) {
            Some(ParamValue::Enrolment(enrolment)) => *enrolment,
            _ => EnrolmentType::default(),
        }
    }

    /// Whether at least one parameter contributes a predicate.
    pub fn is_configured(&self) -> bool {
        self.params.iter().any(|p| p.value.emits_predicate())
    }
}

// ---------------------------------------------------------------------------
// Loading helpers
// ---------------------------------------------------------------------------

/// Empty, whitespace-only and `"0"` values count as "not configured".
pub fn is_falsy(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == "0"
}

fn apply(fields: &mut BTreeMap<Field, ParamValue>, field: Field, subtype: &str, value: &str) {
    let kind = field.kind();

    if kind == FieldKind::EnumSingle {
        match value.parse().ok().and_then(EnrolmentType::from_code) {
            Some(enrolment) => {
                fields.insert(field, ParamValue::Enrolment(enrolment));
            }
            None => tracing::debug!(field = field.name(), value, "Ignoring invalid enrolment type"),
        }
        return;
    }

    let Some(entry) = fields.get(&field).cloned().or_else(|| ParamValue::unset(kind)) else {
        return;
    };

    let updated = match (entry, kind) {
        (ParamValue::Range { mut min, mut max }, _) => {
            let bound = parse_int(field, value);
            if subtype == SUBTYPE_MIN {
                min = bound.or(min);
            } else {
                max = bound.or(max);
            }
            ParamValue::Range { min, max }
        }
        (ParamValue::DateRange { mut start, mut end }, FieldKind::DateRange(base)) => {
            let bound = match base {
                TimeBase::Absolute => parse_timestamp(value),
                TimeBase::Relative => parse_int(field, value),
            };
            if bound.is_none() {
                tracing::debug!(field = field.name(), value, "Ignoring unparseable time bound");
            }
            if subtype == SUBTYPE_START {
                start = bound.or(start);
            } else {
                end = bound.or(end);
            }
            ParamValue::DateRange { start, end }
        }
        (ParamValue::List(_), FieldKind::SetMembership(element)) => {
            ParamValue::List(split_list(value, element, field.spec().any_token))
        }
        (
            ParamValue::IncludeExclude {
                mut include,
                mut exclude,
            },
            _,
        ) => {
            if subtype == SUBTYPE_INCLUDE {
                include = Some(value.to_string());
            } else {
                exclude = Some(value.to_string());
            }
            ParamValue::IncludeExclude { include, exclude }
        }
        (other, _) => other,
    };

    fields.insert(field, updated);
}

fn parse_int(field: Field, value: &str) -> Option<i64> {
    let parsed = value.parse::<i64>().ok();
    if parsed.is_none() {
        tracing::debug!(field = field.name(), value, "Ignoring non-numeric bound");
    }
    parsed
}

/// Parse a fixed time bound: unix seconds, RFC 3339, or `YYYY-MM-DD`
/// (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<UnixTime> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Split a comma-joined list into trimmed, non-empty, de-duplicated tokens.
///
/// A list containing `any_token` is returned empty (unfiltered). Int tokens
/// that fail to parse are dropped.
fn split_list(value: &str, element: ElementType, any_token: Option<&str>) -> ListValues {
    let tokens: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if any_token.is_some_and(|any| tokens.contains(&any)) {
        return ListValues::empty(element);
    }

    match element {
        ElementType::Int => {
            let mut out: Vec<i64> = Vec::new();
            for token in tokens {
                match token.parse::<i64>() {
                    Ok(n) if !out.contains(&n) => out.push(n),
                    Ok(_) => {}
                    Err(_) => tracing::debug!(token, "Ignoring non-numeric list token"),
                }
            }
            ListValues::Int(out)
        }
        ElementType::Text => {
            let mut out: Vec<String> = Vec::new();
            for token in tokens {
                if !out.iter().any(|t| t == token) {
                    out.push(token.to_string());
                }
            }
            ListValues::Text(out)
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Strictly validate raw parameters before they are stored.
///
/// Rejects unknown keys, unparseable bounds, invalid enrolment types,
/// non-numeric difficulty tokens, and ranges whose minimum exceeds their
/// maximum. Falsy values are accepted as "not configured".
pub fn validate_raw_params<I, K, V>(raw: I) -> Result<(), CoreError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut kept: Vec<(String, String)> = Vec::new();

    for (key, value) in raw {
        let key = key.as_ref();
        let value = value.as_ref().trim();
        if is_falsy(value) {
            continue;
        }
        let (field, _) = parse_key(key)
            .ok_or_else(|| CoreError::Validation(format!("Unknown criterion parameter '{key}'")))?;

        match field.kind() {
            FieldKind::NumericRange | FieldKind::DateRange(TimeBase::Relative) => {
                if value.parse::<i64>().is_err() {
                    return Err(CoreError::Validation(format!("'{key}' must be an integer")));
                }
            }
            FieldKind::DateRange(TimeBase::Absolute) => {
                if parse_timestamp(value).is_none() {
                    return Err(CoreError::Validation(format!(
                        "'{key}' must be a unix timestamp, RFC 3339 time or YYYY-MM-DD date"
                    )));
                }
            }
            FieldKind::EnumSingle => {
                if value.parse().ok().and_then(EnrolmentType::from_code).is_none() {
                    return Err(CoreError::Validation(format!(
                        "'{key}' must be {ENROLMENT_SITE} (site) or {ENROLMENT_COURSE} (course)"
                    )));
                }
            }
            FieldKind::SetMembership(ElementType::Int) => {
                if let Some(bad) = value
                    .split(',')
                    .map(str::trim)
                    .find(|t| !t.is_empty() && t.parse::<i64>().is_err())
                {
                    return Err(CoreError::Validation(format!(
                        "'{key}' contains non-numeric value '{bad}'"
                    )));
                }
            }
            FieldKind::SetMembership(ElementType::Text) | FieldKind::TextIncludeExclude => {}
        }
        kept.push((key.to_string(), value.to_string()));
    }

    let set = CriterionSet::load(kept, AggregationMethod::All);
    for param in &set.params {
        let inverted = match param.value {
            ParamValue::Range {
                min: Some(min),
                max: Some(max),
            } => min > max,
            ParamValue::DateRange {
                start: Some(start),
                end: Some(end),
            } => start > end,
            _ => false,
        };
        if inverted {
            return Err(CoreError::Validation(format!(
                "'{}' lower bound exceeds its upper bound",
                param.field.name()
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
