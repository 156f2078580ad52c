use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use reengage_core::clock::Clock;
use reengage_core::errors::ApplicationError;
use reengage_core::ports::RecommendationOracle;
use reengage_core::workflow::Collaborators;

use crate::connection::DbPool;

pub mod customer;
pub mod order;
pub mod product;
pub mod recommendation;

pub use customer::SqlCustomerRepository;
pub use order::SqlOrderRepository;
pub use product::{CatalogProduct, SqlProductRepository};
pub use recommendation::SqlRecommendationStore;

/// Wires every SQL-backed port onto one pool.
pub fn sql_collaborators(
    pool: &DbPool,
    oracle: Arc<dyn RecommendationOracle>,
    clock: Arc<dyn Clock>,
) -> Collaborators {
    Collaborators {
        orders: Arc::new(SqlOrderRepository::new(pool.clone())),
        categories: Arc::new(SqlProductRepository::new(pool.clone())),
        directory: Arc::new(SqlCustomerRepository::new(pool.clone())),
        oracle,
        store: Arc::new(SqlRecommendationStore::new(pool.clone())),
        clock,
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Fixed-width UTC timestamps so string comparison in SQL matches time order.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|error| RepositoryError::Decode(error.to_string()))
}
