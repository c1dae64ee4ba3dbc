//! # Tidewatch Core Types
//!
//! The shared vocabulary of the workspace: ledger events as the upstream source
//! delivers them, the equity points derived from them, and the per-account peak
//! state that drawdown tracking is built on.
//!
//! This is a Layer 0 crate. It depends on nothing else in the workspace.

pub mod buckets;
pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use buckets::{daily_bucket, intraday_bucket, local_date, month_start};
pub use enums::{AlertCondition, AlertKind, AlertStatus, EventKind, FillEntry, OrderSide};
pub use error::CoreError;
pub use structs::{
    AccountId, EquityPoint, LedgerEvent, PeakState, TradeFill, annotate_running_peak, drawdown,
};
