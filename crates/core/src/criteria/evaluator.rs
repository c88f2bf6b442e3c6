//! Criteria evaluator: pure logic, no database access.
//!
//! Applies a [`CriteriaQuery`] to pre-joined attempt rows with the same
//! semantics as the SQL the `db` crate renders: rows are filtered, summed
//! per user, then the aggregate predicates are checked. A missing value
//! (no enrolment, no course) never satisfies a predicate, mirroring SQL
//! `NULL` comparisons.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::params::{AggregationMethod, CriterionSet, EnrolmentType, ListValues};
use super::query::{CriteriaQuery, Operand, Predicate};
use crate::types::{DbId, UnixTime};

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Book attributes relevant to reading criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: DbId,
    pub name: String,
    pub words: i64,
    pub publisher: String,
    pub genre: String,
    pub difficulty: i64,
}

/// One reading attempt joined with its book and optional context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRow {
    pub user_id: DbId,
    pub book: Book,
    pub passed: bool,
    pub deleted: bool,
    pub time_finish: UnixTime,
    pub username: Option<String>,
    pub activity_name: Option<String>,
    pub course_name: Option<String>,
    pub category_name: Option<String>,
    /// Site account creation time.
    pub site_enrolled_at: Option<UnixTime>,
    /// Earliest enrolment in the activity's course.
    pub course_enrolled_at: Option<UnixTime>,
}

enum Value<'a> {
    Int(i64),
    Text(&'a str),
}

fn row_value(row: &AttemptRow, operand: Operand) -> Option<Value<'_>> {
    match operand {
        // Only meaningful after aggregation.
        Operand::SumWords => None,
        Operand::BookWords => Some(Value::Int(row.book.words)),
        Operand::BookPublisher => Some(Value::Text(&row.book.publisher)),
        Operand::BookGenre => Some(Value::Text(&row.book.genre)),
        Operand::BookDifficulty => Some(Value::Int(row.book.difficulty)),
        Operand::BookName => Some(Value::Text(&row.book.name)),
        Operand::TimeFinish => Some(Value::Int(row.time_finish)),
        Operand::SinceEnrolment(enrolment) => {
            let enrolled_at = match enrolment {
                EnrolmentType::Site => row.site_enrolled_at,
                EnrolmentType::Course => row.course_enrolled_at,
            }?;
            row.time_finish.checked_sub(enrolled_at).map(Value::Int)
        }
        Operand::Username => row.username.as_deref().map(Value::Text),
        Operand::ActivityName => row.activity_name.as_deref().map(Value::Text),
        Operand::CourseName => row.course_name.as_deref().map(Value::Text),
        Operand::CategoryName => row.category_name.as_deref().map(Value::Text),
    }
}

fn holds(predicate: &Predicate, value: Option<Value<'_>>) -> bool {
    let Some(value) = value else {
        return false;
    };
    match (predicate, value) {
        (Predicate::Compare { op, value: rhs, .. }, Value::Int(lhs)) => op.holds(lhs, *rhs),
        (
            Predicate::Contains {
                pattern, negated, ..
            },
            Value::Text(text),
        ) => text.to_lowercase().contains(&pattern.to_lowercase()) != *negated,
        (Predicate::InList { values, .. }, value) => match (values, value) {
            (ListValues::Int(list), Value::Int(n)) => list.contains(&n),
            (ListValues::Text(list), Value::Text(s)) => list.iter().any(|t| t == s),
            _ => false,
        },
        _ => false,
    }
}

/// Combine a clause; an empty clause is absent and always passes.
fn clause(
    method: AggregationMethod,
    predicates: &[Predicate],
    test: impl Fn(&Predicate) -> bool,
) -> bool {
    predicates.is_empty() || method.combine(predicates.iter().map(test))
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Users satisfying the query, with their eligible word totals.
pub fn qualifying_users(query: &CriteriaQuery, rows: &[AttemptRow]) -> BTreeMap<DbId, i64> {
    let merged = query.merges_clauses();
    // (word sum, whether any row matched the row predicates)
    let mut groups: BTreeMap<DbId, (i64, bool)> = BTreeMap::new();

    for row in rows {
        if !row.passed || row.deleted {
            continue;
        }
        if query.user_id.is_some_and(|id| id != row.user_id) {
            continue;
        }
        let matched = clause(query.method, &query.row_predicates, |p| {
            holds(p, row_value(row, p.operand()))
        });
        if merged || matched {
            let group = groups.entry(row.user_id).or_default();
            group.0 = group.0.saturating_add(row.book.words);
            group.1 |= matched;
        }
    }

    groups
        .into_iter()
        .filter(|(_, (sum, row_matched))| {
            (merged && *row_matched)
                || clause(query.method, &query.aggregate_predicates, |p| {
                    holds(p, Some(Value::Int(*sum)))
                })
        })
        .map(|(user_id, (sum, _))| (user_id, sum))
        .collect()
}

/// Whether one user satisfies a criterion set.
pub fn evaluate(set: &CriterionSet, user_id: DbId, rows: &[AttemptRow]) -> bool {
    match CriteriaQuery::build(set) {
        Some(query) => !qualifying_users(&query.for_user(user_id), rows).is_empty(),
        None => false,
    }
}

/// Every user satisfying a criterion set.
pub fn users_satisfying(set: &CriterionSet, rows: &[AttemptRow]) -> BTreeSet<DbId> {
    match CriteriaQuery::build(set) {
        Some(query) => qualifying_users(&query, rows).into_keys().collect(),
        None => BTreeSet::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: DbId = 1;
    const BOB: DbId = 2;

    fn set(pairs: &[(&str, &str)], method: AggregationMethod) -> CriterionSet {
        CriterionSet::load(pairs.iter().copied(), method)
    }

    fn attempt(user_id: DbId, name: &str, words: i64) -> AttemptRow {
        AttemptRow {
            user_id,
            book: Book {
                id: words,
                name: name.to_string(),
                words,
                publisher: "Oxford".to_string(),
                genre: "fa".to_string(),
                difficulty: 3,
            },
            passed: true,
            deleted: false,
            time_finish: 1_700_000_000,
            username: Some(format!("user{user_id}")),
            ..AttemptRow::default()
        }
    }

    // -- incomplete criteria --------------------------------------------------

    #[test]
    fn empty_set_never_satisfied() {
        let rows = vec![attempt(ALICE, "Dune", 100_000)];
        let empty = set(&[], AggregationMethod::All);
        assert!(!evaluate(&empty, ALICE, &rows));
        assert!(users_satisfying(&empty, &rows).is_empty());

        let any = set(&[("readinggoal_min", "")], AggregationMethod::Any);
        assert!(!evaluate(&any, ALICE, &rows));
        assert!(users_satisfying(&any, &rows).is_empty());
    }

    // -- reading goal ---------------------------------------------------------

    #[test]
    fn reading_goal_sums_across_attempts() {
        let goal = set(&[("readinggoal_min", "50000")], AggregationMethod::All);
        let rows = vec![
            attempt(ALICE, "First", 30_000),
            attempt(ALICE, "Second", 25_000),
            attempt(BOB, "Only", 40_000),
        ];
        assert!(evaluate(&goal, ALICE, &rows));
        assert!(!evaluate(&goal, BOB, &rows));
        assert_eq!(users_satisfying(&goal, &rows), BTreeSet::from([ALICE]));
    }

    #[test]
    fn failed_and_deleted_attempts_do_not_count() {
        let goal = set(&[("readinggoal_min", "50000")], AggregationMethod::All);
        let mut failed = attempt(ALICE, "Failed", 30_000);
        failed.passed = false;
        let mut deleted = attempt(ALICE, "Deleted", 30_000);
        deleted.deleted = true;
        let rows = vec![attempt(ALICE, "Kept", 25_000), failed, deleted];
        assert!(!evaluate(&goal, ALICE, &rows));
    }

    #[test]
    fn reading_goal_max_only() {
        let goal = set(&[("readinggoal_max", "10000")], AggregationMethod::All);
        let rows = vec![attempt(ALICE, "Short", 8_000), attempt(BOB, "Long", 12_000)];
        assert!(evaluate(&goal, ALICE, &rows));
        assert!(!evaluate(&goal, BOB, &rows));
    }

    #[test]
    fn qualifying_users_reports_sums() {
        let query = CriteriaQuery::build(&set(&[("readinggoal_min", "1")], AggregationMethod::All))
            .unwrap();
        let rows = vec![attempt(ALICE, "A", 10), attempt(ALICE, "B", 15), attempt(BOB, "C", 7)];
        let sums = qualifying_users(&query, &rows);
        assert_eq!(sums.get(&ALICE), Some(&25));
        assert_eq!(sums.get(&BOB), Some(&7));
    }

    // -- name filters ---------------------------------------------------------

    #[test]
    fn book_include_exclude_with_goal() {
        let criterion = set(
            &[
                ("book_include", "Harry"),
                ("book_exclude", "Potter"),
                ("readinggoal_min", "1000"),
            ],
            AggregationMethod::All,
        );

        assert!(!evaluate(&criterion, ALICE, &[attempt(ALICE, "Harry's Adventure", 900)]));
        assert!(evaluate(&criterion, ALICE, &[attempt(ALICE, "Harry's Adventure", 1200)]));
        assert!(!evaluate(&criterion, ALICE, &[attempt(ALICE, "Harry Potter", 2000)]));
    }

    #[test]
    fn name_matching_is_case_insensitive() {
        let criterion = set(&[("book_include", "harry")], AggregationMethod::All);
        assert!(evaluate(&criterion, ALICE, &[attempt(ALICE, "HARRY'S ADVENTURE", 10)]));
    }

    #[test]
    fn missing_context_never_matches() {
        let include = set(&[("course_include", "English")], AggregationMethod::All);
        let exclude = set(&[("course_exclude", "English")], AggregationMethod::All);
        let rows = vec![attempt(ALICE, "Dune", 10)];
        assert!(!evaluate(&include, ALICE, &rows));
        assert!(!evaluate(&exclude, ALICE, &rows));
    }

    #[test]
    fn username_filter() {
        let criterion = set(&[("username_exclude", "user2")], AggregationMethod::All);
        let rows = vec![attempt(ALICE, "Dune", 10), attempt(BOB, "Dune", 10)];
        assert_eq!(users_satisfying(&criterion, &rows), BTreeSet::from([ALICE]));
    }

    // -- list filters ---------------------------------------------------------

    #[test]
    fn difficulty_list_filters_rows_before_summing() {
        let mut hard = attempt(ALICE, "Hard", 60_000);
        hard.book.difficulty = 5;
        let rows = vec![hard];

        let with_goal = set(
            &[("difficulties_list", "3, 4"), ("readinggoal_min", "1")],
            AggregationMethod::All,
        );
        assert!(!evaluate(&with_goal, ALICE, &rows));

        // No eligible rows means no aggregate row at all.
        let without_goal = set(
            &[("difficulties_list", "3, 4"), ("readinggoal_min", "0")],
            AggregationMethod::All,
        );
        assert!(!evaluate(&without_goal, ALICE, &rows));

        let mut easy = attempt(ALICE, "Easy", 500);
        easy.book.difficulty = 4;
        assert!(evaluate(&without_goal, ALICE, &[rows[0].clone(), easy]));
    }

    #[test]
    fn publisher_list_is_exact_match() {
        let criterion = set(&[("publishers_list", "Penguin, Oxford")], AggregationMethod::All);
        let mut other = attempt(BOB, "Dune", 10);
        other.book.publisher = "oxford".to_string();
        let rows = vec![attempt(ALICE, "Dune", 10), other];
        assert_eq!(users_satisfying(&criterion, &rows), BTreeSet::from([ALICE]));
    }

    // -- time windows ---------------------------------------------------------

    #[test]
    fn fixed_time_window() {
        let criterion = set(
            &[("fixedtime_start", "1000"), ("fixedtime_end", "2000")],
            AggregationMethod::All,
        );
        let mut early = attempt(ALICE, "Early", 10);
        early.time_finish = 999;
        let mut inside = attempt(BOB, "Inside", 10);
        inside.time_finish = 2000;
        let rows = vec![early, inside];
        assert_eq!(users_satisfying(&criterion, &rows), BTreeSet::from([BOB]));
    }

    #[test]
    fn relative_time_uses_enrolment_reference() {
        let mut row = attempt(ALICE, "Dune", 10);
        row.time_finish = 10_000;
        row.site_enrolled_at = Some(9_000);
        row.course_enrolled_at = Some(5_000);
        let rows = vec![row];

        let site = set(&[("relativetime_end", "2000")], AggregationMethod::All);
        assert!(evaluate(&site, ALICE, &rows));

        let course = set(
            &[("relativetime_end", "2000"), ("enrolment_type", "1")],
            AggregationMethod::All,
        );
        assert!(!evaluate(&course, ALICE, &rows));
    }

    #[test]
    fn relative_time_without_enrolment_never_matches() {
        let criterion = set(&[("relativetime_start", "1")], AggregationMethod::All);
        assert!(!evaluate(&criterion, ALICE, &[attempt(ALICE, "Dune", 10)]));
    }

    // -- aggregation mode -----------------------------------------------------

    #[test]
    fn any_and_all_over_disjoint_predicates() {
        let mut penguin = attempt(BOB, "Emma", 10);
        penguin.book.publisher = "Penguin".to_string();
        let rows = vec![attempt(ALICE, "The Hobbit", 10), penguin];
        let pairs = [("book_include", "Hobbit"), ("publishers_list", "Penguin")];

        let any = set(&pairs, AggregationMethod::Any);
        assert!(evaluate(&any, ALICE, &rows));
        assert!(evaluate(&any, BOB, &rows));

        let all = set(&pairs, AggregationMethod::All);
        assert!(!evaluate(&all, ALICE, &rows));
        assert!(!evaluate(&all, BOB, &rows));
    }

    #[test]
    fn any_mode_combines_include_and_exclude_disjunctively() {
        let criterion = set(
            &[("book_include", "Harry"), ("book_exclude", "Potter")],
            AggregationMethod::Any,
        );
        // "Dune" fails the include but passes the exclude.
        assert!(evaluate(&criterion, ALICE, &[attempt(ALICE, "Dune", 10)]));
        assert!(evaluate(&criterion, ALICE, &[attempt(ALICE, "Harry Potter", 10)]));
    }

    #[test]
    fn any_mode_combines_reading_goal_bounds_disjunctively() {
        let criterion = set(
            &[("readinggoal_min", "50000"), ("readinggoal_max", "10000")],
            AggregationMethod::Any,
        );
        assert!(evaluate(&criterion, ALICE, &[attempt(ALICE, "Short", 5_000)]));
        assert!(!evaluate(&criterion, ALICE, &[attempt(ALICE, "Medium", 20_000)]));
        assert!(evaluate(&criterion, ALICE, &[attempt(ALICE, "Long", 60_000)]));
    }

    #[test]
    fn any_mode_row_match_can_pass_with_zero_words() {
        let criterion = set(
            &[("book_include", "Extra"), ("readinggoal_min", "100")],
            AggregationMethod::Any,
        );
        let rows = vec![attempt(ALICE, "Extra points", 0)];
        let query = CriteriaQuery::build(&criterion).unwrap();
        assert_eq!(qualifying_users(&query, &rows).get(&ALICE), Some(&0));
    }

    #[test]
    fn any_mode_row_filter_or_reading_goal() {
        let pairs = [("book_include", "Hobbit"), ("readinggoal_min", "50000")];
        let rows = vec![attempt(ALICE, "The Hobbit", 10), attempt(BOB, "Dune", 60_000)];

        let any = set(&pairs, AggregationMethod::Any);
        assert!(evaluate(&any, ALICE, &rows));
        assert!(evaluate(&any, BOB, &rows));
        assert_eq!(users_satisfying(&any, &rows), BTreeSet::from([ALICE, BOB]));

        let all = set(&pairs, AggregationMethod::All);
        assert!(!evaluate(&all, ALICE, &rows));
        assert!(!evaluate(&all, BOB, &rows));
    }

    #[test]
    fn any_mode_goal_counts_every_eligible_row() {
        // The goal is met by the sum over all passed attempts, not only rows
        // matching the book filter.
        let criterion = set(
            &[("book_include", "Hobbit"), ("readinggoal_min", "50000")],
            AggregationMethod::Any,
        );
        let rows = vec![attempt(BOB, "Dune", 30_000), attempt(BOB, "Emma", 30_000)];
        let query = CriteriaQuery::build(&criterion).unwrap();
        assert_eq!(qualifying_users(&query, &rows).get(&BOB), Some(&60_000));
    }

    #[test]
    fn any_mode_with_both_kinds_failing() {
        let criterion = set(
            &[("book_include", "Hobbit"), ("readinggoal_min", "50000")],
            AggregationMethod::Any,
        );
        assert!(!evaluate(&criterion, ALICE, &[attempt(ALICE, "Dune", 10)]));
    }

    // -- overflow -------------------------------------------------------------

    #[test]
    fn extreme_values_do_not_overflow() {
        let goal = set(&[("readinggoal_min", "1")], AggregationMethod::All);
        let rows = vec![attempt(ALICE, "Huge", i64::MAX), attempt(ALICE, "More", i64::MAX)];
        let query = CriteriaQuery::build(&goal).unwrap();
        assert_eq!(qualifying_users(&query, &rows).get(&ALICE), Some(&i64::MAX));

        let mut row = attempt(ALICE, "Dune", 10);
        row.time_finish = i64::MIN;
        row.site_enrolled_at = Some(1);
        let window = set(&[("relativetime_end", "3600")], AggregationMethod::All);
        assert!(!evaluate(&window, ALICE, &[row]));
    }

    #[test]
    fn evaluation_is_per_user() {
        let goal = set(&[("readinggoal_min", "10")], AggregationMethod::All);
        let rows = vec![attempt(BOB, "Dune", 100)];
        assert!(!evaluate(&goal, ALICE, &rows));
        assert!(evaluate(&goal, BOB, &rows));
    }
}
