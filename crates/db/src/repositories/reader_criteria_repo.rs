//! Evaluation of reading-goal criteria against the reading tables.

use reader_badge_core::criteria::{CriteriaQuery, CriterionSet};
use reader_badge_core::types::DbId;
use sqlx::PgPool;

use crate::models::qualifying_user::QualifyingUser;
use crate::sql::{self, QueryFragment, Tables};

/// Runs rendered criteria queries.
pub struct ReaderCriteriaRepo;

impl ReaderCriteriaRepo {
    /// Whether `user_id` currently satisfies the criterion set.
    ///
    /// An incomplete set is never satisfied and issues no query.
    pub async fn evaluate(
        pool: &PgPool,
        tables: &Tables,
        set: &CriterionSet,
        user_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let Some(query) = CriteriaQuery::build(set) else {
            tracing::debug!(user_id, "Criterion incomplete, not satisfied");
            return Ok(false);
        };
        let fragment = sql::render(&query.for_user(user_id), tables, 1);
        tracing::debug!(user_id, sql = %fragment.sql, "Evaluating reading criterion");

        let row = sqlx::query_with(&fragment.sql, fragment.arguments()?)
            .fetch_optional(pool)
            .await?;
        let satisfied = row.is_some();
        tracing::debug!(user_id, satisfied, "Reading criterion evaluated");
        Ok(satisfied)
    }

    /// Review hook for the host's badge engine.
    ///
    /// A user already selected by [`Self::users_satisfying`] (`filtered`)
    /// is accepted without a second query.
    pub async fn review(
        pool: &PgPool,
        tables: &Tables,
        set: &CriterionSet,
        user_id: DbId,
        filtered: bool,
    ) -> Result<bool, sqlx::Error> {
        if filtered {
            return Ok(true);
        }
        Self::evaluate(pool, tables, set, user_id).await
    }

    /// Fragment selecting every satisfying user, numbered from `first_param`.
    pub fn users_satisfying(
        tables: &Tables,
        set: &CriterionSet,
        first_param: usize,
    ) -> QueryFragment {
        match CriteriaQuery::build(set) {
            Some(query) => sql::render(&query, tables, first_param),
            None => QueryFragment::unsatisfiable(first_param),
        }
    }

    /// Every satisfying user with their eligible word total, by user id.
    pub async fn qualifying_users(
        pool: &PgPool,
        tables: &Tables,
        set: &CriterionSet,
    ) -> Result<Vec<QualifyingUser>, sqlx::Error> {
        let Some(query) = CriteriaQuery::build(set) else {
            return Ok(Vec::new());
        };
        let fragment = sql::render(&query, tables, 1);
        let statement = format!("{} ORDER BY userid", fragment.sql);
        sqlx::query_as_with::<_, QualifyingUser, _>(&statement, fragment.arguments()?)
            .fetch_all(pool)
            .await
    }

    /// Ids of every satisfying user, ascending.
    pub async fn qualifying_user_ids(
        pool: &PgPool,
        tables: &Tables,
        set: &CriterionSet,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let users = Self::qualifying_users(pool, tables, set).await?;
        Ok(users.into_iter().map(|u| u.userid).collect())
    }
}
