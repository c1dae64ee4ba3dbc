//! # Tidewatch Alerter
//!
//! Threshold alerts on account figures. Each account owns an `AlertBook`: its
//! rules and the history of every time one fired. The engine evaluates the
//! book against each freshly computed `AccountStats` and hands the triggers
//! to an `AlertSink`.
//!
//! - `AlertBook`: rule management and evaluation.
//! - `AlertSink`: where triggers go; `TelegramAlerter` posts them to a chat.
//! - `AlerterError`: delivery failures.

pub mod book;
pub mod error;
pub mod telegram;

pub use book::{AlertBook, AlertRule, AlertTrigger, HISTORY_LIMIT, NewAlert};
pub use error::AlerterError;
pub use telegram::TelegramAlerter;

use async_trait::async_trait;

/// A destination for triggered alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, trigger: &AlertTrigger) -> Result<(), AlerterError>;
}
