use anyhow::{Context, Result};
use pulse::config::{apply_env_overrides, load_config, PulseConfig};
use pulse::{EmitSink, EventSourceEngine, SqliteStateStore};
use source_manager::api::{create_router, ApiState};
use source_manager::registry::get_configured_providers;
use source_manager::{HttpEmitSink, LogSink, SourceManager};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "source_manager=info,pulse=info".into()),
        )
        .init();

    info!("Source Manager starting...");

    // Load configuration: optional TOML file, then PULSE_* overrides
    let mut config = match std::env::var("PULSE_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => PulseConfig::default(),
    };
    apply_env_overrides(&mut config);
    config.validate()?;

    let policy = config.subscription.renewal_policy()?;
    info!(
        state_db = %config.state.path.display(),
        api_port = config.api.port,
        public_url = %config.api.public_url,
        renew_margin_millis = policy.renew_margin_millis,
        "Configuration loaded"
    );

    let store = Arc::new(
        SqliteStateStore::new(&config.state.path).context("Failed to initialize state store")?,
    );
    info!("State store initialized");

    let sink: Arc<dyn EmitSink> = match &config.sink.url {
        Some(url) => {
            info!(url = %url, "Emitting events over HTTP");
            Arc::new(HttpEmitSink::new(url.clone(), config.sink.token.clone()))
        }
        None => {
            info!("No sink URL configured, events will only be logged");
            Arc::new(LogSink)
        }
    };

    let mut engine = EventSourceEngine::new(store, sink)
        .with_policy(policy)
        .with_provider_timeout(config.engine.provider_timeout());
    for provider in get_configured_providers()? {
        engine = engine.with_provider(provider);
    }
    let engine = Arc::new(engine);

    // Resume persisted sources and start the renewal runner
    let manager = Arc::new(SourceManager::new(
        Arc::clone(&engine),
        config.api.clone(),
        config.subscription.renewal_check_interval(),
    ));
    let resumed = manager.start().await?;
    info!(sources = resumed, "Source manager started");

    // Start HTTP API server
    let router = create_router(ApiState {
        manager: Arc::clone(&manager),
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.api.port))
        .await
        .context("Failed to bind source manager API port")?;
    info!(port = config.api.port, "Source manager API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Source manager API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    // Graceful shutdown
    server_handle.abort();
    manager.shutdown().await;
    info!("Source manager stopped");

    Ok(())
}
