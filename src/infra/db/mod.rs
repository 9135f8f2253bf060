//! Postgres-backed repository implementations.

mod categories;
mod contacts;
mod courses;
mod enrollments;
mod intakes;
mod payments;
mod refunds;
mod sessions;
mod users;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::listing::{BindValue, FilterOp, Predicate, ValidatedListQuery};
use crate::application::repos::RepoError;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    /// Translate validated predicates into `AND <column> <op> <bind>`
    /// clauses. Columns arrive from the allow-list resolution only, never
    /// from raw request input; values are always bound parameters.
    fn apply_predicates<'q>(qb: &mut QueryBuilder<'q, Postgres>, predicates: &[Predicate]) {
        for predicate in predicates {
            qb.push(" AND ");
            qb.push(predicate.column);
            match predicate.op {
                FilterOp::Equals => {
                    qb.push(" = ");
                    Self::push_bind_value(qb, &predicate.value);
                }
                FilterOp::Contains => {
                    qb.push(" ILIKE ");
                    let pattern = match &predicate.value {
                        BindValue::Text(text) => format!("%{text}%"),
                        other => format!("%{other:?}%"),
                    };
                    qb.push_bind(pattern);
                }
                FilterOp::Gte => {
                    qb.push(" >= ");
                    Self::push_bind_value(qb, &predicate.value);
                }
                FilterOp::Lte => {
                    qb.push(" <= ");
                    Self::push_bind_value(qb, &predicate.value);
                }
            }
            qb.push(" ");
        }
    }

    fn push_bind_value<'q>(qb: &mut QueryBuilder<'q, Postgres>, value: &BindValue) {
        match value {
            BindValue::Text(text) => qb.push_bind(text.clone()),
            BindValue::Integer(value) => qb.push_bind(*value),
            BindValue::Boolean(value) => qb.push_bind(*value),
            BindValue::Uuid(value) => qb.push_bind(*value),
            BindValue::Timestamp(value) => qb.push_bind(*value),
            BindValue::Date(value) => qb.push_bind(*value),
        };
    }

    /// Append `ORDER BY <allow-listed column> <order>, <tiebreak> DESC`
    /// plus bound LIMIT/OFFSET derived from the page math.
    fn apply_order_and_page<'q>(
        qb: &mut QueryBuilder<'q, Postgres>,
        query: &ValidatedListQuery,
        tiebreak: &str,
    ) {
        qb.push(" ORDER BY ");
        qb.push(query.sort_column);
        qb.push(" ");
        qb.push(query.order.as_sql());
        qb.push(", ");
        qb.push(tiebreak);
        qb.push(" DESC ");
        qb.push(" LIMIT ");
        qb.push_bind(query.limit());
        qb.push(" OFFSET ");
        qb.push_bind(query.offset());
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}
