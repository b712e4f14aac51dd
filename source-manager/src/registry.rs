//! Provider registry - builds the providers whose credentials are configured.
//!
//! A provider without credentials in the environment is skipped with a log
//! line; sources that reference it fail activation with a configuration error.

use crate::providers::google_calendar::{config::GoogleCalendarConfig, GoogleCalendarProvider};
use crate::providers::postgres::{PostgresConfig, PostgresProvider};
use crate::providers::quickbooks::{QuickBooksConfig, QuickBooksProvider};
use crate::providers::Provider;
use anyhow::Result;
use pulse::ProviderClient;
use std::sync::Arc;
use tracing::{info, warn};

/// Returns every provider that could be configured from the environment.
pub fn get_configured_providers() -> Result<Vec<Arc<Provider>>> {
    let mut providers = Vec::new();

    match GoogleCalendarConfig::from_env() {
        Ok(config) => providers.push(Provider::GoogleCalendar(GoogleCalendarProvider::new(config))),
        Err(e) => info!(reason = %e, "Google Calendar provider disabled"),
    }

    match QuickBooksConfig::from_env() {
        Ok(config) => providers.push(Provider::QuickBooks(QuickBooksProvider::new(config))),
        Err(e) => info!(reason = %e, "QuickBooks provider disabled"),
    }

    match PostgresConfig::from_env() {
        Ok(config) => providers.push(Provider::Postgres(PostgresProvider::new(&config)?)),
        Err(e) => info!(reason = %e, "PostgreSQL provider disabled"),
    }

    if providers.is_empty() {
        warn!("No providers configured; every activation will be rejected");
    }

    for provider in &providers {
        info!(provider = %provider.name(), "Provider enabled");
    }

    Ok(providers.into_iter().map(Arc::new).collect())
}
