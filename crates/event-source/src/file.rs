use crate::EventSource;
use crate::error::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{AccountId, LedgerEvent};
use std::path::PathBuf;

/// Serves ledgers from a JSON file holding an array of `LedgerEvent`s for any
/// number of accounts.
///
/// The file is re-read on every call, so appending events to it is picked up
/// by the next sync. Order inside the file does not matter.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_all(&self) -> Result<Vec<LedgerEvent>, SourceError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::Unavailable(format!(
                    "ledger file {} does not exist",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|e| SourceError::Deserialization(e.to_string()))
    }
}

#[async_trait]
impl EventSource for JsonFileSource {
    async fn list_events(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEvent>, SourceError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| e.account_id == account_id && e.timestamp >= from && e.timestamp <= to)
            .collect())
    }

    async fn latest_event_id(&self, account_id: AccountId) -> Result<Option<i64>, SourceError> {
        Ok(self
            .read_all()
            .await?
            .iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.id)
            .max())
    }
}
