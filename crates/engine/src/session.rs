use crate::cache::CacheGate;
use crate::cursor::SyncCursor;
use crate::error::EngineError;
use alerter::{AlertBook, NewAlert};
use analytics::{AccountStats, DrawdownReport, MonthlyGrowth, TradeStats};
use configuration::AccountSettings;
use chrono::{DateTime, Utc};
use core_types::{AccountId, EquityPoint, PeakState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// The summary payload cached per account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub stats: AccountStats,
    pub drawdowns: DrawdownReport,
    pub trade_stats: TradeStats,
    /// End-of-day points of the replay, kept so a failed write can be retried.
    #[serde(default)]
    pub points: Vec<EquityPoint>,
}

/// Mutable per-account state. Only the owning session (or an operator action
/// routed through it) changes it.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Live peaks. `None` until the first computation seeds them from the replay.
    pub peaks: Option<PeakState>,
    pub cursor: SyncCursor,
    /// False until the store holds everything the cache holds.
    pub persisted: bool,
    pub month_start_override: Option<Decimal>,
    /// Balance of the latest recompute.
    pub balance: Option<Decimal>,
    /// Daily bucket of the last point the store is known to hold.
    pub persisted_through: Option<DateTime<Utc>>,
    /// `None` until loaded from the store and seeded from settings.
    pub alerts: Option<AlertBook>,
}

/// Everything the monitor keeps for one account.
pub struct AccountSession {
    pub account_id: AccountId,
    pub name: String,
    pub currency: Option<String>,
    /// Rules from the settings file, installed into the book on first load.
    pub configured_alerts: Vec<NewAlert>,
    pub state: Mutex<SessionState>,
    pub summary: CacheGate<Arc<AccountSnapshot>>,
    pub growth: CacheGate<Arc<Vec<MonthlyGrowth>>>,
    removed: AtomicBool,
}

impl AccountSession {
    pub fn new(account: &AccountSettings, summary_ttl: Duration, growth_ttl: Duration) -> Self {
        Self {
            account_id: account.id,
            name: account.name.clone(),
            currency: account.currency.clone(),
            configured_alerts: account.alerts.iter().map(NewAlert::from).collect(),
            state: Mutex::new(SessionState::default()),
            summary: CacheGate::new(summary_ttl),
            growth: CacheGate::new(growth_ttl),
            removed: AtomicBool::new(false),
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }
}

/// Sessions keyed by account id.
#[derive(Default)]
pub struct AccountRegistry {
    sessions: RwLock<HashMap<AccountId, Arc<AccountSession>>>,
}

impl AccountRegistry {
    pub fn from_accounts(accounts: &[AccountSettings], summary_ttl: Duration, growth_ttl: Duration) -> Self {
        let sessions = accounts
            .iter()
            .map(|account| {
                (
                    account.id,
                    Arc::new(AccountSession::new(account, summary_ttl, growth_ttl)),
                )
            })
            .collect();
        Self {
            sessions: RwLock::new(sessions),
        }
    }

    pub async fn get(&self, account_id: AccountId) -> Result<Arc<AccountSession>, EngineError> {
        self.sessions
            .read()
            .await
            .get(&account_id)
            .cloned()
            .ok_or(EngineError::AccountNotFound(account_id))
    }

    /// Drops the session. A background refresh still holding it sees the
    /// removal and abandons its work.
    pub async fn remove(&self, account_id: AccountId) -> Option<Arc<AccountSession>> {
        let removed = self.sessions.write().await.remove(&account_id);
        if let Some(session) = &removed {
            session.mark_removed();
        }
        removed
    }

    /// All sessions, ordered by account id.
    pub async fn all(&self) -> Vec<Arc<AccountSession>> {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.account_id);
        sessions
    }

    pub async fn ids(&self) -> Vec<AccountId> {
        self.all().await.iter().map(|s| s.account_id).collect()
    }
}
