//! Pulse Source Manager - hosts event sources on top of the `pulse` engine.
//!
//! The engine decides *what* is new and *when* a webhook channel must be
//! renewed; this crate supplies everything around it: concrete providers,
//! timers, the webhook endpoint and the downstream sink.
//!
//! # Architecture
//!
//! ```text
//! Google Calendar / QuickBooks / PostgreSQL
//!          ↓                     ↑
//!   POST /webhooks/:id     list / watch / stop
//!          ↓                     │
//! ┌─────────────────────────────────────────┐
//! │       Source Manager                     │
//! │  - Poll runner per poll source           │
//! │  - Renewal runner for webhook sources    │
//! │  - Management API (/api/sources)         │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       pulse::EventSourceEngine           │
//! │  - Snapshot diff, dedup                  │
//! │  - Subscription lifecycle                │
//! │  - Durable per-source state (SQLite)     │
//! └─────────────────────────────────────────┘
//!          ↓
//!     EmitSink (HTTP POST / log)
//! ```

pub mod api;
pub mod manager;
pub mod providers;
pub mod registry;
pub mod runners;
pub mod sink;

#[cfg(test)]
mod testing;

pub use manager::{SourceInfo, SourceManager};
pub use providers::Provider;
pub use runners::RunnerStatus;
pub use sink::{HttpEmitSink, LogSink};

// Serialize env-var-mutating tests across modules; the process env is shared.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
