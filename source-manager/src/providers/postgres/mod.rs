//! PostgreSQL "new table" provider.
//!
//! Lists the base tables of one schema; every table that was not there on
//! the previous poll becomes an event.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pulse::{ProviderClient, ProviderError, ResourceFilter, ResourceRecord};
use serde_json::json;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use super::filter_value;

pub const NAME: &str = "postgres";

pub const SCHEMA_FILTER: &str = "schema";

const LIST_TABLES: &str = "SELECT table_name::text
     FROM information_schema.tables
     WHERE table_schema = $1 AND table_type = 'BASE TABLE'
     ORDER BY table_name";

/// PostgreSQL configuration.
///
/// Loads the connection string from `POSTGRES_URL`.
#[derive(Debug)]
pub struct PostgresConfig {
    pub url: String,
}

impl PostgresConfig {
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("POSTGRES_URL").context("POSTGRES_URL not set")?;
        Ok(Self { url })
    }
}

pub struct PostgresProvider {
    pool: PgPool,
}

impl PostgresProvider {
    /// Builds a lazily connecting pool; nothing is dialled until the first poll.
    pub fn new(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(&config.url)
            .context("Invalid POSTGRES_URL")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ProviderClient for PostgresProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn required_filters(&self) -> &[&'static str] {
        &[SCHEMA_FILTER]
    }

    async fn list_resources(
        &self,
        filter: &ResourceFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let schema = filter_value(filter, SCHEMA_FILTER)?;
        let tables = sqlx::query_scalar::<_, String>(LIST_TABLES)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error)?;

        Ok(tables
            .into_iter()
            .map(|table| table_to_record(schema, table))
            .collect())
    }
}

fn table_to_record(schema: &str, table: String) -> ResourceRecord {
    ResourceRecord {
        summary: format!("New table: {}", table),
        data: json!({ "schema": schema, "table": table }),
        id: table,
        timestamp: None,
    }
}

/// Server-side errors (permissions, bad schema) are not worth retrying;
/// connectivity problems are.
fn sqlx_error(e: sqlx::Error) -> ProviderError {
    match e {
        sqlx::Error::Database(db) => ProviderError::Rejected(db.message().to_string()),
        sqlx::Error::Configuration(e) => ProviderError::Rejected(e.to_string()),
        other => ProviderError::Transient(other.to_string()),
    }
}
