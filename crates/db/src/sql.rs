//! PostgreSQL rendering of criteria queries.
//!
//! Turns a [`CriteriaQuery`] into one aggregate `SELECT` with positional
//! binds. Table names carry the host's prefix.

use reader_badge_core::criteria::{
    AggregationMethod, CompareOp, CriteriaQuery, EnrolmentType, Join, ListValues, Operand,
    Predicate,
};
use reader_badge_core::error::CoreError;
use sqlx::postgres::PgArguments;
use sqlx::Arguments;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Prefix of the host's tables when none is configured.
pub const DEFAULT_TABLE_PREFIX: &str = "mdl_";

pub const TABLE_ATTEMPTS: &str = "reader_attempts";
pub const TABLE_BOOKS: &str = "reader_books";
pub const TABLE_USERS: &str = "user";
pub const TABLE_ACTIVITIES: &str = "reader";
pub const TABLE_COURSES: &str = "course";
pub const TABLE_CATEGORIES: &str = "course_categories";
pub const TABLE_USER_ENROLMENTS: &str = "user_enrolments";
pub const TABLE_ENROL: &str = "enrol";
pub const TABLE_BADGE_CRITERIA: &str = "badge_criteria";
pub const TABLE_BADGE_CRITERIA_PARAM: &str = "badge_criteria_param";

/// Host table naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    prefix: String,
}

impl Tables {
    /// Create with a prefix of lowercase ASCII letters, digits and `_`.
    pub fn new(prefix: &str) -> Result<Self, CoreError> {
        let valid = prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(CoreError::Config(format!(
                "Invalid table prefix '{prefix}'. Only [a-z0-9_] is allowed"
            )));
        }
        Ok(Self {
            prefix: prefix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full name of a host table.
    pub fn name(&self, table: &str) -> String {
        format!("{}{table}", self.prefix)
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Fragments
// ---------------------------------------------------------------------------

/// A bind value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
    IntList(Vec<i64>),
    TextList(Vec<String>),
}

/// Rendered SQL plus its binds, numbered from `first_param`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFragment {
    /// A `SELECT userid, sumwords` statement.
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub first_param: usize,
}

impl QueryFragment {
    /// A fragment selecting no users, for incomplete criteria.
    pub fn unsatisfiable(first_param: usize) -> Self {
        Self {
            sql: "SELECT NULL::BIGINT AS userid, NULL::BIGINT AS sumwords WHERE FALSE".to_string(),
            params: Vec::new(),
            first_param,
        }
    }

    /// The first placeholder number after this fragment's binds.
    pub fn next_param(&self) -> usize {
        self.first_param + self.params.len()
    }

    /// `(join, where)` clauses for filtering a wider user listing.
    ///
    /// Append `join` after the caller's `FROM` and AND `where` into its
    /// `WHERE`; `user_column` is the caller's user id column.
    pub fn left_join(&self, alias: &str, user_column: &str) -> (String, String) {
        (
            format!(
                "LEFT JOIN ({}) {alias} ON {alias}.userid = {user_column}",
                self.sql
            ),
            format!("{alias}.userid IS NOT NULL"),
        )
    }

    /// Bind values as sqlx arguments.
    pub fn arguments(&self) -> Result<PgArguments, sqlx::Error> {
        let mut args = PgArguments::default();
        for param in &self.params {
            let added = match param {
                SqlValue::Int(v) => args.add(*v),
                SqlValue::Text(v) => args.add(v.clone()),
                SqlValue::IntList(v) => args.add(v.clone()),
                SqlValue::TextList(v) => args.add(v.clone()),
            };
            added.map_err(sqlx::Error::Encode)?;
        }
        Ok(args)
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Word total of a user's eligible attempts.
const SUM_WORDS: &str = "COALESCE(SUM(rb.words), 0)::BIGINT";

struct Binder {
    first_param: usize,
    params: Vec<SqlValue>,
}

impl Binder {
    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("${}", self.first_param + self.params.len() - 1)
    }
}

fn operand_sql(operand: Operand) -> &'static str {
    match operand {
        Operand::SumWords => SUM_WORDS,
        Operand::BookWords => "rb.words",
        Operand::BookPublisher => "rb.publisher",
        Operand::BookGenre => "rb.genre",
        Operand::BookDifficulty => "rb.difficulty",
        Operand::BookName => "rb.name",
        Operand::TimeFinish => "ra.timefinish",
        Operand::SinceEnrolment(EnrolmentType::Site) => "(ra.timefinish - u.timecreated)",
        Operand::SinceEnrolment(EnrolmentType::Course) => "(ra.timefinish - ce.enrolled_at)",
        Operand::Username => "u.username",
        Operand::ActivityName => "r.name",
        Operand::CourseName => "c.fullname",
        Operand::CategoryName => "cc.name",
    }
}

fn join_sql(join: Join, tables: &Tables) -> String {
    match join {
        Join::User => format!("LEFT JOIN {} u ON u.id = ra.userid", tables.name(TABLE_USERS)),
        Join::Activity => format!(
            "LEFT JOIN {} r ON r.id = ra.readerid",
            tables.name(TABLE_ACTIVITIES)
        ),
        Join::Course => format!("LEFT JOIN {} c ON c.id = r.course", tables.name(TABLE_COURSES)),
        Join::Category => format!(
            "LEFT JOIN {} cc ON cc.id = c.category",
            tables.name(TABLE_CATEGORIES)
        ),
        Join::CourseEnrolment => format!(
            "LEFT JOIN (\
                SELECT ue.userid, e.courseid, \
                       MIN(CASE WHEN ue.timestart > 0 THEN ue.timestart ELSE ue.timecreated END) AS enrolled_at \
                FROM {} ue \
                JOIN {} e ON e.id = ue.enrolid \
                GROUP BY ue.userid, e.courseid\
             ) ce ON ce.userid = ra.userid AND ce.courseid = r.course",
            tables.name(TABLE_USER_ENROLMENTS),
            tables.name(TABLE_ENROL),
        ),
    }
}

/// Escape `ILIKE` wildcards so a pattern matches literally.
pub fn escape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn predicate_sql(predicate: &Predicate, binder: &mut Binder) -> String {
    let column = operand_sql(predicate.operand());
    match predicate {
        Predicate::Compare { op, value, .. } => {
            let op = match op {
                CompareOp::Ge => ">=",
                CompareOp::Le => "<=",
            };
            format!("{column} {op} {}", binder.bind(SqlValue::Int(*value)))
        }
        Predicate::Contains {
            pattern, negated, ..
        } => {
            let op = if *negated { "NOT ILIKE" } else { "ILIKE" };
            let param = binder.bind(SqlValue::Text(format!("%{}%", escape_like(pattern))));
            format!("{column} {op} {param}")
        }
        Predicate::InList { values, .. } => {
            let value = match values {
                ListValues::Int(v) => SqlValue::IntList(v.clone()),
                ListValues::Text(v) => SqlValue::TextList(v.clone()),
            };
            format!("{column} = ANY({})", binder.bind(value))
        }
    }
}

/// Render a criteria query, numbering binds from `first_param`.
pub fn render(query: &CriteriaQuery, tables: &Tables, first_param: usize) -> QueryFragment {
    let mut binder = Binder {
        first_param,
        params: Vec::new(),
    };
    let rule = match query.method {
        AggregationMethod::All => " AND ",
        AggregationMethod::Any => " OR ",
    };

    let mut conditions = vec!["ra.passed = 1".to_string(), "ra.deleted = 0".to_string()];
    if let Some(user_id) = query.user_id {
        conditions.push(format!("ra.userid = {}", binder.bind(SqlValue::Int(user_id))));
    }
    let merged = query.merges_clauses();
    let mut having_parts: Vec<String> = Vec::new();
    if merged {
        having_parts.extend(
            query
                .row_predicates
                .iter()
                .map(|p| format!("BOOL_OR({})", predicate_sql(p, &mut binder))),
        );
    } else if !query.row_predicates.is_empty() {
        let parts: Vec<String> = query
            .row_predicates
            .iter()
            .map(|p| predicate_sql(p, &mut binder))
            .collect();
        conditions.push(format!("({})", parts.join(rule)));
    }
    having_parts.extend(
        query
            .aggregate_predicates
            .iter()
            .map(|p| predicate_sql(p, &mut binder)),
    );

    let having = if having_parts.is_empty() {
        String::new()
    } else {
        format!(" HAVING ({})", having_parts.join(rule))
    };

    let joins: String = query
        .joins
        .iter()
        .map(|join| format!(" {}", join_sql(*join, tables)))
        .collect();

    let sql = format!(
        "SELECT ra.userid AS userid, {SUM_WORDS} AS sumwords \
         FROM {attempts} ra \
         JOIN {books} rb ON rb.id = ra.bookid\
         {joins} \
         WHERE {where_clause} \
         GROUP BY ra.userid\
         {having}",
        attempts = tables.name(TABLE_ATTEMPTS),
        books = tables.name(TABLE_BOOKS),
        where_clause = conditions.join(" AND "),
    );

    QueryFragment {
        sql,
        params: binder.params,
        first_param,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
