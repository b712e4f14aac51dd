use pulse::ProviderError;
use reqwest::{Client, Url};
use serde_json::Value;

use crate::providers::{check_status, request_error};

pub const SANDBOX_BASE_URL: &str = "https://sandbox-quickbooks.api.intuit.com";
pub const PRODUCTION_BASE_URL: &str = "https://quickbooks.api.intuit.com";
pub const MINOR_VERSION: &str = "65";

/// Most recent records fetched per poll.
pub const MAX_RESULTS: u32 = 100;

/// HTTP client for the QuickBooks Online accounting API.
pub struct QuickBooksClient {
    access_token: String,
    realm_id: String,
    http_client: Client,
    base_url: String,
}

impl QuickBooksClient {
    pub fn with_base_url(access_token: String, realm_id: String, base_url: String) -> Self {
        Self {
            access_token,
            realm_id,
            http_client: Client::new(),
            base_url,
        }
    }

    /// Runs `select * from {entity}` newest first and returns the raw rows.
    pub async fn query_recent(&self, entity: &str) -> Result<Vec<Value>, ProviderError> {
        let statement = format!(
            "select * from {} orderby MetaData.CreateTime desc maxresults {}",
            entity, MAX_RESULTS
        );

        let response = self
            .http_client
            .get(self.query_url()?)
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .query(&[("query", statement.as_str()), ("minorversion", MINOR_VERSION)])
            .send()
            .await
            .map_err(request_error)?;
        check_status(response.status(), "query")?;

        let body: Value = response.json().await.map_err(|e| {
            ProviderError::Transient(format!("failed to parse query response: {}", e))
        })?;

        // An empty result omits the entity key entirely
        Ok(body
            .get("QueryResponse")
            .and_then(|r| r.get(entity))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    fn query_url(&self) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Rejected(format!("invalid base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Rejected(format!("invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(&["v3", "company", self.realm_id.as_str(), "query"]);
        Ok(url)
    }
}
