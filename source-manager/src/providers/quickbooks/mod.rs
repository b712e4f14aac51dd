pub mod api;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use pulse::{ProviderClient, ProviderError, ResourceFilter, ResourceRecord};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use self::api::{QuickBooksClient, MAX_RESULTS, PRODUCTION_BASE_URL, SANDBOX_BASE_URL};

pub const NAME: &str = "quickbooks";

/// Filter key choosing the entity to watch; defaults to `Invoice`.
pub const ENTITY_FILTER: &str = "entity";
pub const DEFAULT_ENTITY: &str = "Invoice";

/// Entities that can be polled. The name is interpolated into the query, so
/// only these are accepted.
pub const ENTITIES: &[&str] = &[
    "Bill", "Customer", "Estimate", "Invoice", "Item", "Payment", "Vendor",
];

/// QuickBooks configuration.
///
/// - `QUICKBOOKS_ACCESS_TOKEN` (required)
/// - `QUICKBOOKS_REALM_ID` (required, the company id)
/// - `QUICKBOOKS_ENVIRONMENT`: `sandbox` (default) or `production`
#[derive(Debug)]
pub struct QuickBooksConfig {
    pub access_token: String,
    pub realm_id: String,
    pub base_url: String,
}

impl QuickBooksConfig {
    pub fn from_env() -> Result<Self> {
        let access_token = std::env::var("QUICKBOOKS_ACCESS_TOKEN")
            .context("QUICKBOOKS_ACCESS_TOKEN not set")?;
        let realm_id =
            std::env::var("QUICKBOOKS_REALM_ID").context("QUICKBOOKS_REALM_ID not set")?;
        let environment =
            std::env::var("QUICKBOOKS_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string());
        Ok(Self {
            access_token,
            realm_id,
            base_url: base_url_for(&environment)?.to_string(),
        })
    }
}

pub fn base_url_for(environment: &str) -> Result<&'static str> {
    match environment {
        "sandbox" => Ok(SANDBOX_BASE_URL),
        "production" => Ok(PRODUCTION_BASE_URL),
        other => bail!(
            "QUICKBOOKS_ENVIRONMENT must be 'sandbox' or 'production', got '{}'",
            other
        ),
    }
}

/// QuickBooks Online provider - polls the most recent records of one entity.
///
/// Listings are capped at [`MAX_RESULTS`] rows, newest first. Once a listing
/// fills the window, the oldest `CreateTime` in it becomes a floor for that
/// entity and older rows are dropped from later listings, so a row that slides
/// back into the window after a delete is not reported as new. Floors live in
/// memory and start over when the process restarts.
pub struct QuickBooksProvider {
    client: QuickBooksClient,
    window_floor: Mutex<HashMap<String, i64>>,
}

impl QuickBooksProvider {
    pub fn new(config: QuickBooksConfig) -> Self {
        Self::with_base_url(config.access_token, config.realm_id, config.base_url)
    }

    pub fn with_base_url(access_token: String, realm_id: String, base_url: String) -> Self {
        Self {
            client: QuickBooksClient::with_base_url(access_token, realm_id, base_url),
            window_floor: Mutex::new(HashMap::new()),
        }
    }

    /// Raises the entity's floor when `full` and drops records created before it.
    /// Records without a creation time are kept.
    fn apply_window_floor(
        &self,
        entity: &str,
        records: Vec<ResourceRecord>,
        full: bool,
    ) -> Vec<ResourceRecord> {
        let mut floors = self
            .window_floor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if full {
            if let Some(oldest) = records.iter().filter_map(|r| r.timestamp).min() {
                let floor = floors.entry(entity.to_string()).or_insert(oldest);
                *floor = (*floor).max(oldest);
            }
        }

        let Some(floor) = floors.get(entity).copied() else {
            return records;
        };
        let before = records.len();
        let kept: Vec<ResourceRecord> = records
            .into_iter()
            .filter(|r| r.timestamp.map_or(true, |ts| ts >= floor))
            .collect();
        if kept.len() < before {
            debug!(
                entity = %entity,
                floor,
                dropped = before - kept.len(),
                "Dropped rows older than the listing window"
            );
        }
        kept
    }
}

#[async_trait]
impl ProviderClient for QuickBooksProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_resources(
        &self,
        filter: &ResourceFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let entity = filter
            .get(ENTITY_FILTER)
            .map(String::as_str)
            .unwrap_or(DEFAULT_ENTITY);
        if !ENTITIES.contains(&entity) {
            return Err(ProviderError::Rejected(format!(
                "unsupported QuickBooks entity '{}'",
                entity
            )));
        }

        let rows = self.client.query_recent(entity).await?;
        let full = rows.len() >= MAX_RESULTS as usize;
        let records = rows
            .into_iter()
            .filter_map(|row| row_to_record(entity, row))
            .collect();
        Ok(self.apply_window_floor(entity, records, full))
    }
}

/// Rows without an `Id` are dropped.
fn row_to_record(entity: &str, row: Value) -> Option<ResourceRecord> {
    let id = row.get("Id")?.as_str()?.to_string();
    let label = ["DocNumber", "DisplayName", "Name"]
        .iter()
        .find_map(|key| row.get(*key).and_then(Value::as_str))
        .unwrap_or(id.as_str())
        .to_string();
    let timestamp = row
        .pointer("/MetaData/CreateTime")
        .and_then(Value::as_str)
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|dt| dt.timestamp_millis());

    Some(ResourceRecord {
        id,
        summary: format!("New {}: {}", entity, label),
        timestamp,
        data: row,
    })
}
