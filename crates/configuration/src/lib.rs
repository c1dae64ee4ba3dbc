use crate::error::ConfigError;
use crate::settings::Settings;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    AccountSettings, AlertRuleSettings, AlertSettings, CacheSettings, LogFormat, LoggingSettings,
    SourceKind, SourceSettings, StoreKind, StoreSettings, TelegramSettings,
};

/// File name looked up when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "tidewatch";

/// Prefix of environment overrides, e.g. `TIDEWATCH__SOURCE__TIMEOUT_MS=2000`.
pub const ENV_PREFIX: &str = "TIDEWATCH";

/// Loads the application settings.
///
/// Reads `path` (or `tidewatch.toml` in the working directory; the file is
/// optional), layers `TIDEWATCH__`-prefixed environment variables over it,
/// deserializes the result into `Settings` and validates it.
pub fn load_settings(path: Option<&str>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => config::File::with_name(path),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let builder = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let settings = builder.try_deserialize::<Settings>()?;
    settings.validate()?;

    tracing::debug!(
        accounts = settings.accounts.len(),
        source = ?settings.source.kind,
        store = ?settings.store.kind,
        "Settings loaded."
    );
    Ok(settings)
}

/// Parses settings from a TOML string. Used by tests and embedded defaults.
pub fn settings_from_toml(toml: &str) -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?
        .try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_apply_to_an_empty_file() {
        let settings = settings_from_toml("").unwrap();
        assert!(settings.accounts.is_empty());
        assert_eq!(settings.cache.summary_ttl(), Duration::from_secs(60));
        assert_eq!(settings.cache.growth_ttl(), Duration::from_secs(86_400));
        assert_eq!(settings.source.timeout(), Duration::from_millis(5_000));
        assert_eq!(settings.source.kind, SourceKind::Bridge);
        assert_eq!(settings.store.kind, StoreKind::Memory);
        assert_eq!(settings.store.max_connections, 10);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.logging.format, LogFormat::Console);
        assert_eq!(settings.timezone().unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn accounts_and_sections_are_read() {
        let settings = settings_from_toml(
            r#"
            timezone_offset_minutes = 120

            [[accounts]]
            id = 5001
            name = "Main"
            currency = "USD"
            server = "Broker-Live"

            [[accounts]]
            id = 5002
            name = "Swing"

            [cache]
            summary_ttl_secs = 30

            [source]
            kind = "file"
            ledger_path = "ledger.json"
            timeout_ms = 250

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.accounts.len(), 2);
        assert_eq!(settings.account(5001).map(|a| a.name.as_str()), Some("Main"));
        assert!(settings.account(9).is_none());
        assert_eq!(settings.cache.summary_ttl_secs, 30);
        assert_eq!(settings.cache.growth_ttl_secs, 86_400);
        assert_eq!(settings.source.kind, SourceKind::File);
        assert_eq!(settings.source.timeout(), Duration::from_millis(250));
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.timezone().unwrap().local_minus_utc(), 7_200);
    }

    #[test]
    fn duplicate_account_ids_are_rejected() {
        let result = settings_from_toml(
            r#"
            [[accounts]]
            id = 1
            name = "a"

            [[accounts]]
            id = 1
            name = "b"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let result = settings_from_toml("[cache]\nsummary_ttl_secs = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn file_source_needs_a_path() {
        let result = settings_from_toml("[source]\nkind = \"file\"\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn postgres_without_a_url_defers_to_the_environment() {
        let settings = settings_from_toml("[store]\nkind = \"postgres\"\n").unwrap();
        assert_eq!(settings.store.kind, StoreKind::Postgres);
        assert!(settings.store.database_url.is_none());
    }

    #[test]
    fn alert_rules_and_telegram_are_read() {
        use core_types::{AlertCondition, AlertKind};
        use rust_decimal::Decimal;

        let settings = settings_from_toml(
            r#"
            [[accounts]]
            id = 5001
            name = "Main"

            [[accounts.alerts]]
            kind = "drawdown"
            condition = "above"
            threshold = 12.5

            [[accounts.alerts]]
            kind = "balance"
            condition = "below"
            threshold = 800
            message = "Top up"

            [alerts.telegram]
            token = "abc"
            chat_id = "42"
            "#,
        )
        .unwrap();

        let rules = &settings.accounts[0].alerts;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].kind, AlertKind::Drawdown);
        assert_eq!(rules[0].condition, AlertCondition::Above);
        assert_eq!(rules[0].threshold, Decimal::new(125, 1));
        assert_eq!(rules[1].message.as_deref(), Some("Top up"));
        assert_eq!(settings.alerts.telegram.map(|t| t.chat_id), Some("42".to_string()));
    }

    #[test]
    fn drawdown_thresholds_above_one_hundred_are_rejected() {
        let result = settings_from_toml(
            r#"
            [[accounts]]
            id = 1
            name = "a"

            [[accounts.alerts]]
            kind = "drawdown"
            condition = "above"
            threshold = 150
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
