// Configuration (TOML + environment)
pub mod config;

// Per-source orchestration
pub mod engine;

// Error taxonomy
pub mod error;

// Event model, validation and sinks
pub mod event;

// Provider capability interface
pub mod provider;

// Baselines and change detection
pub mod snapshot;

// Durable per-source state
pub mod state;

// Webhook subscription lifecycle
pub mod subscription;

pub use config::{PulseConfig, SourceConfig, SourceMode};
pub use engine::{DeliveryOutcome, DiscardReason, EventSourceEngine, RenewalOutcome, TickOutcome};
pub use error::{EmitError, EngineError, ProviderError, StoreError};
pub use event::{EmitSink, Event, MemorySink};
pub use provider::{ProviderClient, ResourceFilter, ResourceRecord, WebhookDelivery};
pub use snapshot::Snapshot;
pub use state::{MemoryStateStore, SqliteStateStore, StateStore, StoredState};
pub use subscription::{
    RenewalDecision, RenewalPolicy, Subscription, SubscriptionPhase, SubscriptionScheduler,
    SubscriptionState,
};
