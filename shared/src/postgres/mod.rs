mod identity;
mod reports;
mod storage;

pub use identity::PostgresIdentity;
pub use reports::PostgresReports;
pub use storage::BucketBlobStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DataError;

const SCHEMA: &str = include_str!("schema.sql");

/// Connect once at startup and make sure the schema exists.
pub async fn connect(database_url: &str) -> Result<PgPool, DataError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|e| DataError::transport(format!("Failed to connect to database: {}", e)))?;

    sqlx::raw_sql(SCHEMA).execute(&pool).await?;

    Ok(pool)
}
