//! # Tidewatch Engine
//!
//! The synchronization layer: it owns one session per monitored account and
//! decides, per request, whether the derived values can be served from cache
//! or must be recomputed from the ledger.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Orchestrator:** Wires the event source, the analytics
//!   calculators and the snapshot store together. It holds no SQL and no HTTP.
//! - **Per-Account Sessions:** Peaks, the sync cursor and both cache gates live
//!   in an `AccountSession` kept in the `AccountRegistry`. Nothing is global.
//! - **Single-Flight, Serve-Stale:** At most one recompute runs per account;
//!   stale or degraded payloads are served instead of blocking or failing.
//!
//! ## Public API
//!
//! - `AccountMonitor`: every operation exposed to callers.
//! - `CacheGate`, `SyncCursor`: the staleness policy and change detection.
//! - `AlertSink` (re-exported from `alerter`): where triggered alerts go.
//! - `MonitorOptions`: TTLs, source timeout and the local calendar offset.
//! - `EngineError`: The error type returned by monitor operations.

pub mod cache;
pub mod cursor;
pub mod error;
pub mod monitor;
pub mod options;
pub mod pipeline;
pub mod session;

pub use alerter::{AlertRule, AlertSink, AlertTrigger, NewAlert};
pub use cache::{CacheGate, CacheState, Cached};
pub use cursor::SyncCursor;
pub use error::EngineError;
pub use monitor::{AccountMonitor, AccountSync, Served, SyncOutcome};
pub use options::MonitorOptions;
pub use pipeline::RecomputeMode;
pub use session::{AccountRegistry, AccountSession, AccountSnapshot, SessionState};
