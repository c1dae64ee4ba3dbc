use core_types::AccountId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Account {0} is not configured.")]
    AccountNotFound(AccountId),

    #[error("Alert rule {1} does not exist for account {0}.")]
    AlertNotFound(AccountId, u32),

    #[error("Invalid alert rule: {0}")]
    InvalidAlert(String),

    #[error("Event source error: {0}")]
    Source(#[from] event_source::error::SourceError),

    #[error("Database error: {0}")]
    Database(#[from] database::DbError),

    #[error("Analytics error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Calendar error: {0}")]
    Calendar(#[from] core_types::CoreError),

    #[error("Serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl EngineError {
    /// Errors for which a cached payload is served instead.
    pub fn is_source_failure(&self) -> bool {
        matches!(self, EngineError::Source(_))
    }
}
