use crate::error::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::{AccountSettings, SourceKind, SourceSettings};
use core_types::{AccountId, LedgerEvent};
use std::sync::Arc;

pub mod bridge;
pub mod error;
pub mod file;
pub mod responses;

// --- Public API ---
pub use bridge::BridgeClient;
pub use file::JsonFileSource;
pub use responses::BridgeDeal;

/// The abstract interface to wherever account ledgers live.
///
/// This trait is the contract the monitor uses, allowing the underlying
/// implementation (bridge, file or a test double) to be swapped out. Callers
/// bound every call with their own timeout.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events of one account inside `[from, to]`. Order is not guaranteed.
    async fn list_events(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEvent>, SourceError>;

    /// The highest event id known for the account, `None` for an empty ledger.
    async fn latest_event_id(&self, account_id: AccountId) -> Result<Option<i64>, SourceError>;
}

/// Builds the source selected in the settings.
pub fn from_settings(
    settings: &SourceSettings,
    accounts: &[AccountSettings],
) -> Result<Arc<dyn EventSource>, SourceError> {
    match settings.kind {
        SourceKind::Bridge => Ok(Arc::new(BridgeClient::new(settings, accounts)?)),
        SourceKind::File => {
            let path = settings.ledger_path.as_deref().ok_or_else(|| {
                SourceError::Unavailable("no ledger_path configured for the file source".to_string())
            })?;
            Ok(Arc::new(JsonFileSource::new(path)))
        }
    }
}
