use crate::error::EngineError;
use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Utc};
use configuration::settings::Settings;
use std::time::Duration;

/// Runtime knobs of an `AccountMonitor`.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Age after which an account summary is served stale.
    pub summary_ttl: Duration,
    /// Age after which the monthly-growth table is served stale.
    pub growth_ttl: Duration,
    /// Upper bound on every call into the event source.
    pub source_timeout: Duration,
    /// Start of the ledger window fetched on every recompute.
    pub history_from: DateTime<Utc>,
    /// Offset that defines event-local calendar dates.
    pub offset: FixedOffset,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            summary_ttl: Duration::from_secs(60),
            growth_ttl: Duration::from_secs(24 * 60 * 60),
            source_timeout: Duration::from_secs(5),
            history_from: DateTime::from_timestamp(946_684_800, 0).unwrap_or_default(),
            offset: Utc.fix(),
        }
    }
}

impl MonitorOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        let offset = settings
            .timezone()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        Ok(Self {
            summary_ttl: settings.cache.summary_ttl(),
            growth_ttl: settings.cache.growth_ttl(),
            source_timeout: settings.source.timeout(),
            history_from: settings.source.history_from.and_time(NaiveTime::MIN).and_utc(),
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};

    #[test]
    fn defaults_cover_the_whole_history_in_utc() {
        let options = MonitorOptions::default();
        assert_eq!(options.history_from.year(), 2000);
        assert_eq!(options.offset.local_minus_utc(), 0);
        assert_eq!(options.summary_ttl, Duration::from_secs(60));
    }

    #[test]
    fn settings_map_onto_options() {
        let settings = configuration::settings_from_toml(
            r#"
            timezone_offset_minutes = 120

            [source]
            timeout_ms = 750
            history_from = "2021-06-01"
            "#,
        )
        .unwrap();

        let options = MonitorOptions::from_settings(&settings).unwrap();
        assert_eq!(options.offset.local_minus_utc(), 7200);
        assert_eq!(options.source_timeout, Duration::from_millis(750));
        assert_eq!(options.history_from.date_naive(), NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());
    }
}
