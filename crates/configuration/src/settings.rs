use crate::error::ConfigError;
use chrono::{FixedOffset, NaiveDate};
use core_types::{AccountId, AlertCondition, AlertKind};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// The monitored accounts. The registry is built from this list.
    #[serde(default)]
    pub accounts: Vec<AccountSettings>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub source: SourceSettings,
    #[serde(default)]
    pub store: StoreSettings,
    /// Fixed offset from UTC, in minutes, that defines the local calendar
    /// used for day, week, month and year boundaries.
    #[serde(default)]
    pub timezone_offset_minutes: i32,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
}

/// One monitored trading account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSettings {
    /// The broker login number.
    pub id: AccountId,
    pub name: String,
    #[serde(default)]
    pub currency: Option<String>,
    /// Credentials used by the bridge source to switch to this account.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    /// Threshold rules installed for this account when its alert book is
    /// first loaded. Rules already in the book are left as they are.
    #[serde(default)]
    pub alerts: Vec<AlertRuleSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertRuleSettings {
    pub kind: AlertKind,
    pub condition: AlertCondition,
    pub threshold: Decimal,
    #[serde(default)]
    pub message: Option<String>,
}

/// Where triggered alerts are delivered, beyond the log.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertSettings {
    #[serde(default)]
    pub telegram: Option<TelegramSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSettings {
    pub token: String,
    pub chat_id: String,
}

/// Staleness thresholds of the derived-value cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_summary_ttl_secs")]
    pub summary_ttl_secs: u64,
    #[serde(default = "default_growth_ttl_secs")]
    pub growth_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            summary_ttl_secs: default_summary_ttl_secs(),
            growth_ttl_secs: default_growth_ttl_secs(),
        }
    }
}

impl CacheSettings {
    pub fn summary_ttl(&self) -> Duration {
        Duration::from_secs(self.summary_ttl_secs)
    }

    pub fn growth_ttl(&self) -> Duration {
        Duration::from_secs(self.growth_ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// The HTTP bridge in front of the trading terminal.
    Bridge,
    /// A JSON ledger file on disk.
    File,
}

/// Where ledger events come from.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    #[serde(default = "default_source_kind")]
    pub kind: SourceKind,
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    #[serde(default)]
    pub ledger_path: Option<String>,
    /// Upper bound on every ledger read.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// The earliest date history is requested from.
    #[serde(default = "default_history_from")]
    pub history_from: NaiveDate,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            bridge_url: default_bridge_url(),
            ledger_path: None,
            timeout_ms: default_timeout_ms(),
            history_from: default_history_from(),
        }
    }
}

impl SourceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    Memory,
}

/// The snapshot store backing persisted points and statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_kind")]
    pub kind: StoreKind,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// When set, logs are also written to a daily-rolling file at this path.
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

impl Settings {
    /// The fixed offset of the local calendar.
    pub fn timezone(&self) -> Result<FixedOffset, ConfigError> {
        self.timezone_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "timezone_offset_minutes out of range: {}",
                    self.timezone_offset_minutes
                ))
            })
    }

    pub fn account(&self, id: AccountId) -> Option<&AccountSettings> {
        self.accounts.iter().find(|a| a.id == id)
    }

    /// Rejects settings the rest of the system cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.id) {
                return Err(ConfigError::Validation(format!(
                    "account {} is configured more than once",
                    account.id
                )));
            }
        }

        if self.cache.summary_ttl_secs == 0 || self.cache.growth_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "cache TTLs must be greater than zero".to_string(),
            ));
        }
        if self.source.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "source.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.source.kind == SourceKind::File && self.source.ledger_path.is_none() {
            return Err(ConfigError::Validation(
                "source.kind = \"file\" requires source.ledger_path".to_string(),
            ));
        }
        for account in &self.accounts {
            for rule in &account.alerts {
                if rule.kind.is_percentage()
                    && !(Decimal::ZERO..=Decimal::ONE_HUNDRED).contains(&rule.threshold)
                {
                    return Err(ConfigError::Validation(format!(
                        "account {}: a {} threshold must be between 0 and 100",
                        account.id, rule.kind
                    )));
                }
            }
        }

        self.timezone()?;
        Ok(())
    }
}

fn default_summary_ttl_secs() -> u64 {
    60
}

fn default_growth_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_source_kind() -> SourceKind {
    SourceKind::Bridge
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_history_from() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_store_kind() -> StoreKind {
    StoreKind::Memory
}

fn default_max_connections() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}
