//! Repository for stored criterion configuration.
//!
//! The method lives on `badge_criteria`; each raw `<field>_<subtype>`
//! parameter is one `badge_criteria_param` row.

use reader_badge_core::criteria::{AggregationMethod, CriterionSet};
use reader_badge_core::types::DbId;
use sqlx::PgPool;

use crate::models::badge_criterion::BadgeCriterion;
use crate::models::criteria_param::{CreateCriteriaParam, CriteriaParam};
use crate::sql::{Tables, TABLE_BADGE_CRITERIA, TABLE_BADGE_CRITERIA_PARAM};

/// Column list for badge_criteria queries.
const CRITERION_COLUMNS: &str = "id, badgeid, criteriatype, method";

/// Column list for badge_criteria_param queries.
const PARAM_COLUMNS: &str = "id, critid, name, value";

/// Provides data access for criterion parameters.
pub struct CriteriaParamRepo;

impl CriteriaParamRepo {
    /// Find a criterion row by id.
    pub async fn find_criterion(
        pool: &PgPool,
        tables: &Tables,
        critid: DbId,
    ) -> Result<Option<BadgeCriterion>, sqlx::Error> {
        let query = format!(
            "SELECT {CRITERION_COLUMNS} FROM {} WHERE id = $1",
            tables.name(TABLE_BADGE_CRITERIA)
        );
        sqlx::query_as::<_, BadgeCriterion>(&query)
            .bind(critid)
            .fetch_optional(pool)
            .await
    }

    /// List the raw parameter rows of a criterion, in insertion order.
    pub async fn list_params(
        pool: &PgPool,
        tables: &Tables,
        critid: DbId,
    ) -> Result<Vec<CriteriaParam>, sqlx::Error> {
        let query = format!(
            "SELECT {PARAM_COLUMNS} FROM {} WHERE critid = $1 ORDER BY id",
            tables.name(TABLE_BADGE_CRITERIA_PARAM)
        );
        sqlx::query_as::<_, CriteriaParam>(&query)
            .bind(critid)
            .fetch_all(pool)
            .await
    }

    /// Load a criterion's parameter set. Returns `None` if the criterion
    /// does not exist.
    ///
    /// An unknown method code falls back to ALL.
    pub async fn load(
        pool: &PgPool,
        tables: &Tables,
        critid: DbId,
    ) -> Result<Option<CriterionSet>, sqlx::Error> {
        let Some(criterion) = Self::find_criterion(pool, tables, critid).await? else {
            return Ok(None);
        };
        let method = AggregationMethod::from_code(criterion.method).unwrap_or_else(|e| {
            tracing::warn!(critid, error = %e, "Falling back to ALL aggregation");
            AggregationMethod::All
        });

        let params = Self::list_params(pool, tables, critid).await?;
        let set = CriterionSet::load(
            params.iter().map(|p| (p.name.as_str(), p.value.as_str())),
            method,
        );
        tracing::debug!(critid, params = set.params.len(), "Loaded criterion parameters");
        Ok(Some(set))
    }

    /// Replace a criterion's stored method and parameters.
    ///
    /// Runs in one transaction. Returns the number of parameter rows written,
    /// or `None` if the criterion does not exist.
    pub async fn save(
        pool: &PgPool,
        tables: &Tables,
        critid: DbId,
        set: &CriterionSet,
    ) -> Result<Option<u64>, sqlx::Error> {
        let rows: Vec<CreateCriteriaParam> = set
            .serialize()
            .into_iter()
            .map(|(name, value)| CreateCriteriaParam { name, value })
            .collect();

        let mut tx = pool.begin().await?;

        let updated = sqlx::query(&format!(
            "UPDATE {} SET method = $1 WHERE id = $2",
            tables.name(TABLE_BADGE_CRITERIA)
        ))
        .bind(set.method.code())
        .bind(critid)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let param_table = tables.name(TABLE_BADGE_CRITERIA_PARAM);
        sqlx::query(&format!("DELETE FROM {param_table} WHERE critid = $1"))
            .bind(critid)
            .execute(&mut *tx)
            .await?;

        let insert = format!("INSERT INTO {param_table} (critid, name, value) VALUES ($1, $2, $3)");
        let mut written = 0;
        for row in &rows {
            written += sqlx::query(&insert)
                .bind(critid)
                .bind(&row.name)
                .bind(&row.value)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        tracing::debug!(critid, written, "Saved criterion parameters");
        Ok(Some(written))
    }
}
