//! Integration tests for stored criterion parameters.

use reader_badge_core::criteria::{AggregationMethod, CriterionSet, Field, ParamValue};
use reader_badge_db::repositories::CriteriaParamRepo;
use reader_badge_db::sql::Tables;
use sqlx::PgPool;

async fn insert_criterion(pool: &PgPool, method: i64) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO mdl_badge_criteria (badgeid, criteriatype, method) VALUES (1, 14, $1)
         RETURNING id",
    )
    .bind(method)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_param(pool: &PgPool, critid: i64, name: &str, value: &str) {
    sqlx::query("INSERT INTO mdl_badge_criteria_param (critid, name, value) VALUES ($1, $2, $3)")
        .bind(critid)
        .bind(name)
        .bind(value)
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn test_load_reads_method_and_params(pool: PgPool) {
    let critid = insert_criterion(&pool, 2).await;
    insert_param(&pool, critid, "readinggoal_min", "40000").await;
    insert_param(&pool, critid, "genres_list", "fantasy, horror").await;
    insert_param(&pool, critid, "wordcount_max", "0").await;
    insert_param(&pool, critid, "shoesize_min", "9").await;

    let set = CriteriaParamRepo::load(&pool, &Tables::default(), critid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(set.method, AggregationMethod::Any);
    assert_eq!(set.params.len(), 2);
    assert_eq!(
        set.get(Field::ReadingGoal),
        Some(&ParamValue::Range {
            min: Some(40000),
            max: None
        })
    );
    assert!(set.get(Field::WordCount).is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_load_missing_criterion(pool: PgPool) {
    let set = CriteriaParamRepo::load(&pool, &Tables::default(), 999).await.unwrap();
    assert!(set.is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_unknown_method_falls_back_to_all(pool: PgPool) {
    let critid = insert_criterion(&pool, 7).await;
    insert_param(&pool, critid, "book_include", "Harry").await;

    let set = CriteriaParamRepo::load(&pool, &Tables::default(), critid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(set.method, AggregationMethod::All);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_save_replaces_params(pool: PgPool) {
    let tables = Tables::default();
    let critid = insert_criterion(&pool, 1).await;
    insert_param(&pool, critid, "book_include", "Harry").await;

    let set = CriterionSet::load(
        [
            ("readinggoal_min", "20000"),
            ("publishers_list", "Oxford, Penguin"),
            ("enrolment_type", "1"),
        ],
        AggregationMethod::Any,
    );
    let written = CriteriaParamRepo::save(&pool, &tables, critid, &set)
        .await
        .unwrap();
    assert_eq!(written, Some(3));

    let rows = CriteriaParamRepo::list_params(&pool, &tables, critid)
        .await
        .unwrap();
    let mut names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["enrolment_type", "publishers_list", "readinggoal_min"]);

    let reloaded = CriteriaParamRepo::load(&pool, &tables, critid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded, set);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_save_missing_criterion_writes_nothing(pool: PgPool) {
    let tables = Tables::default();
    let set = CriterionSet::load([("readinggoal_min", "100")], AggregationMethod::All);

    let written = CriteriaParamRepo::save(&pool, &tables, 999, &set).await.unwrap();
    assert_eq!(written, None);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mdl_badge_criteria_param")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
