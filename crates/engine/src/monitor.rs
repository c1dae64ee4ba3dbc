use crate::cache::{CacheState, Cached};
use crate::error::EngineError;
use crate::options::MonitorOptions;
use crate::pipeline::{Pipeline, RecomputeMode};
use crate::session::{AccountRegistry, AccountSession, AccountSnapshot};
use alerter::{AlertBook, AlertRule, AlertSink, AlertTrigger, NewAlert};
use analytics::{
    AccountStats, DailyDrawdown, DrawdownReport, MonthPreview, MonthlyDrawdown, MonthlyGrowth,
    TradeStats, WeeklyDrawdown, YearlyDrawdown, resolve_starting_balance,
};
use chrono::{DateTime, Datelike, Utc};
use configuration::AccountSettings;
use configuration::settings::Settings;
use core_types::{AccountId, AlertKind, AlertStatus, EquityPoint, PeakState, local_date, month_start};
use database::{BlobKind, SnapshotStore};
use event_source::EventSource;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// How far back the month-start snapshot lookup reaches.
const SNAPSHOT_LOOKBACK_DAYS: i64 = 31;

/// A payload as served to a caller, with how it was obtained.
#[derive(Debug, Clone, Serialize)]
pub struct Served<T> {
    pub payload: T,
    pub state: CacheState,
    /// The event source failed and this is the last good payload.
    pub degraded: bool,
    pub computed_at: DateTime<Utc>,
}

impl<T> Served<T> {
    fn from_cache(cached: Cached<T>, degraded: bool) -> Self {
        Self {
            payload: cached.payload,
            state: cached.state,
            degraded,
            computed_at: cached.computed_at,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Served<U> {
        Served {
            payload: f(self.payload),
            state: self.state,
            degraded: self.degraded,
            computed_at: self.computed_at,
        }
    }
}

/// Result of syncing one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SyncOutcome {
    /// New events were found (or a refresh was forced) and everything was recomputed.
    Synced { last_event_id: Option<i64> },
    NoChange,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSync {
    pub account_id: AccountId,
    pub outcome: SyncOutcome,
}

/// The operations exposed to callers, over every configured account.
///
/// Holds one `AccountSession` per account. All state that changes at runtime
/// lives in those sessions; the monitor itself is shared behind an `Arc`.
pub struct AccountMonitor {
    registry: AccountRegistry,
    pipeline: Pipeline,
}

impl AccountMonitor {
    pub fn new(
        accounts: &[AccountSettings],
        source: Arc<dyn EventSource>,
        store: Arc<dyn SnapshotStore>,
        options: MonitorOptions,
    ) -> Self {
        let registry =
            AccountRegistry::from_accounts(accounts, options.summary_ttl, options.growth_ttl);
        Self {
            registry,
            pipeline: Pipeline::new(source, store, options),
        }
    }

    pub fn from_settings(
        settings: &Settings,
        source: Arc<dyn EventSource>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self, EngineError> {
        let options = MonitorOptions::from_settings(settings)?;
        Ok(Self::new(&settings.accounts, source, store, options))
    }

    /// Sends every alert trigger to `sink` as well as to the log.
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.pipeline = self.pipeline.with_alert_sink(sink);
        self
    }

    pub fn options(&self) -> &MonitorOptions {
        self.pipeline.options()
    }

    pub async fn account_ids(&self) -> Vec<AccountId> {
        self.registry.ids().await
    }

    /// Seeds every session from the store so the first reads after a restart
    /// are served (stale) without touching the event source. Returns how many
    /// accounts had a persisted summary.
    pub async fn warm_start(&self) -> usize {
        let mut seeded = 0;
        for session in self.registry.all().await {
            match self.load_persisted(&session).await {
                Ok(true) => seeded += 1,
                Ok(false) => debug!(account_id = session.account_id, "Nothing persisted yet."),
                Err(e) => warn!(
                    account_id = session.account_id,
                    error = %e,
                    "Could not load persisted state; starting cold."
                ),
            }
        }
        info!(seeded, "Warm start complete.");
        seeded
    }

    async fn load_blob<T: DeserializeOwned>(
        &self,
        account_id: AccountId,
        kind: BlobKind,
    ) -> Result<Option<T>, EngineError> {
        match self.pipeline.store().load_stats_blob(account_id, kind).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn load_persisted(&self, session: &AccountSession) -> Result<bool, EngineError> {
        let account_id = session.account_id;
        let mut state = session.state.lock().await;

        if let Some(peaks) = self.load_blob::<PeakState>(account_id, BlobKind::PeakState).await? {
            state.peaks = Some(peaks);
        }
        if let Some(cursor) = self.load_blob(account_id, BlobKind::SyncCursor).await? {
            state.cursor = cursor;
        }
        if let Some(value) = self
            .load_blob::<Option<Decimal>>(account_id, BlobKind::MonthStartOverride)
            .await?
        {
            state.month_start_override = value;
        }

        let stats: Option<AccountStats> = self.load_blob(account_id, BlobKind::AccountStats).await?;
        let drawdowns: Option<DrawdownReport> =
            self.load_blob(account_id, BlobKind::Drawdowns).await?;
        let trade_stats: Option<TradeStats> =
            self.load_blob(account_id, BlobKind::TradeStats).await?;
        let (Some(stats), Some(drawdowns), Some(trade_stats)) = (stats, drawdowns, trade_stats)
        else {
            return Ok(false);
        };

        let computed_at = stats.as_of;
        state.balance = Some(stats.balance);
        session.summary.seed_stale(
            Arc::new(AccountSnapshot {
                stats,
                drawdowns,
                trade_stats,
                points: Vec::new(),
            }),
            computed_at,
        );
        if let Some(growth) = self
            .load_blob::<Vec<MonthlyGrowth>>(account_id, BlobKind::MonthlyGrowth)
            .await?
        {
            session.growth.seed_stale(Arc::new(growth), computed_at);
        }
        state.persisted = true;
        Ok(true)
    }

    async fn refresh_summary(
        &self,
        session: &AccountSession,
        force: bool,
    ) -> Result<Cached<Arc<AccountSnapshot>>, EngineError> {
        session
            .summary
            .refresh(force, || async {
                self.pipeline
                    .recompute(session, RecomputeMode::Refresh)
                    .await
                    .map(|(snapshot, _)| snapshot)
            })
            .await
    }

    /// The summary of one session, following the gate's serve-stale policy.
    async fn summary(
        &self,
        session: &Arc<AccountSession>,
        force: bool,
    ) -> Result<Served<Arc<AccountSnapshot>>, EngineError> {
        if !force {
            if let Some(cached) = session.summary.peek() {
                match cached.state {
                    CacheState::Fresh => return Ok(Served::from_cache(cached, false)),
                    CacheState::Stale => {
                        self.pipeline.spawn_background_refresh(session.clone());
                        let degraded = session.summary.last_refresh_failed();
                        if degraded {
                            warn!(
                                account_id = session.account_id,
                                "Serving stale summary; the last refresh failed."
                            );
                        }
                        return Ok(Served::from_cache(cached, degraded));
                    }
                    CacheState::Empty => {}
                }
            }
        }

        match self.refresh_summary(session, force).await {
            Ok(cached) => Ok(Served::from_cache(cached, false)),
            Err(e) if e.is_source_failure() => match session.summary.peek() {
                Some(cached) => {
                    warn!(
                        account_id = session.account_id,
                        error = %e,
                        "Event source failed; serving the cached summary."
                    );
                    Ok(Served::from_cache(cached, true))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn snapshot(
        &self,
        account_id: AccountId,
        force: bool,
    ) -> Result<Served<Arc<AccountSnapshot>>, EngineError> {
        let session = self.registry.get(account_id).await?;
        self.summary(&session, force).await
    }

    /// Balance, peaks, drawdown and headline ratios. `force_live` blocks on a
    /// recompute instead of serving a stale payload.
    pub async fn get_account_stats(
        &self,
        account_id: AccountId,
        force_live: bool,
    ) -> Result<Served<AccountStats>, EngineError> {
        Ok(self
            .snapshot(account_id, force_live)
            .await?
            .map(|snapshot| snapshot.stats.clone()))
    }

    pub async fn get_drawdowns(
        &self,
        account_id: AccountId,
    ) -> Result<Served<DrawdownReport>, EngineError> {
        Ok(self
            .snapshot(account_id, false)
            .await?
            .map(|snapshot| snapshot.drawdowns.clone()))
    }

    pub async fn get_daily_drawdown(
        &self,
        account_id: AccountId,
    ) -> Result<Served<Vec<DailyDrawdown>>, EngineError> {
        Ok(self.get_drawdowns(account_id).await?.map(|report| report.daily))
    }

    pub async fn get_weekly_drawdown(
        &self,
        account_id: AccountId,
    ) -> Result<Served<Vec<WeeklyDrawdown>>, EngineError> {
        Ok(self.get_drawdowns(account_id).await?.map(|report| report.weekly))
    }

    pub async fn get_monthly_drawdown(
        &self,
        account_id: AccountId,
    ) -> Result<Served<Vec<MonthlyDrawdown>>, EngineError> {
        Ok(self.get_drawdowns(account_id).await?.map(|report| report.monthly))
    }

    pub async fn get_yearly_drawdown(
        &self,
        account_id: AccountId,
    ) -> Result<Served<Vec<YearlyDrawdown>>, EngineError> {
        Ok(self.get_drawdowns(account_id).await?.map(|report| report.yearly))
    }

    pub async fn get_trade_stats(
        &self,
        account_id: AccountId,
    ) -> Result<Served<TradeStats>, EngineError> {
        Ok(self
            .snapshot(account_id, false)
            .await?
            .map(|snapshot| snapshot.trade_stats.clone()))
    }

    /// The monthly growth table. It has its own, longer TTL but is recomputed
    /// together with the summary.
    pub async fn get_monthly_growth(
        &self,
        account_id: AccountId,
    ) -> Result<Served<Vec<MonthlyGrowth>>, EngineError> {
        let session = self.registry.get(account_id).await?;
        if session.growth.state() == CacheState::Empty {
            self.refresh_summary(&session, true).await?;
        }

        let cached = session.growth.peek().ok_or_else(|| {
            EngineError::Configuration(format!("no growth data for account {account_id}"))
        })?;
        if cached.state == CacheState::Stale {
            self.pipeline.spawn_background_refresh(session.clone());
        }
        let degraded = session.summary.last_refresh_failed();
        Ok(Served::from_cache(cached, degraded).map(|growth| (*growth).clone()))
    }

    /// Growth of the month in progress, from the best available opening balance.
    ///
    /// When the event source fails, the month's row of the cached growth table
    /// is served instead, marked degraded.
    pub async fn get_current_month_preview(
        &self,
        account_id: AccountId,
    ) -> Result<Served<MonthPreview>, EngineError> {
        let session = self.registry.get(account_id).await?;
        let live_balance = self.summary(&session, false).await?.payload.stats.balance;

        let offset = self.options().offset;
        let now = Utc::now();
        let today = local_date(now, offset);
        let (year, month) = (today.year(), today.month());
        let start = month_start(year, month, offset)?;

        let manual = session.state.lock().await.month_start_override;
        let snapshot = match manual {
            Some(_) => None,
            None => self.balance_before(account_id, start).await,
        };
        let starting_balance = resolve_starting_balance(manual, snapshot, live_balance);
        debug!(account_id, source = ?starting_balance.source, "Month opening balance resolved.");

        match self.pipeline.fetch_events(account_id, start, now).await {
            Ok(events) => {
                let preview = self.pipeline.analytics().growth_calculator().month_preview(
                    &events,
                    year,
                    month,
                    starting_balance,
                )?;
                Ok(Served {
                    payload: preview,
                    state: CacheState::Fresh,
                    degraded: false,
                    computed_at: now,
                })
            }
            Err(e) if e.is_source_failure() => {
                let Some(cached) = session.growth.peek() else {
                    return Err(e);
                };
                warn!(account_id, error = %e, "Event source failed; serving the cached month growth.");
                let row = cached.payload.iter().find(|row| row.year == year);
                let trading_pnl = row.and_then(|r| r.value(month)).unwrap_or(Decimal::ZERO);
                let preview = MonthPreview {
                    year,
                    month,
                    starting_balance,
                    capital_flows: live_balance - starting_balance.value - trading_pnl,
                    trading_pnl,
                    growth_pct: row.and_then(|r| r.growth(month)),
                };
                Ok(Served::from_cache(cached, true).map(|_| preview))
            }
            Err(e) => Err(e),
        }
    }

    /// Balance of the last stored point before `start`.
    async fn balance_before(&self, account_id: AccountId, start: DateTime<Utc>) -> Option<Decimal> {
        let since = start - chrono::Duration::days(SNAPSHOT_LOOKBACK_DAYS);
        match self.pipeline.store().load_points(account_id, since).await {
            Ok(points) => points
                .iter()
                .rev()
                .find(|p| p.timestamp < start)
                .map(|p| p.balance),
            Err(e) => {
                warn!(account_id, error = %e, "Could not load the month-start snapshot.");
                None
            }
        }
    }

    /// Sets (or with `None` clears) the manual opening balance of the current month.
    pub async fn set_month_start_override(
        &self,
        account_id: AccountId,
        balance: Option<Decimal>,
    ) -> Result<(), EngineError> {
        let session = self.registry.get(account_id).await?;
        session.state.lock().await.month_start_override = balance;
        self.pipeline
            .put_blob(account_id, BlobKind::MonthStartOverride, &balance)
            .await?;
        info!(account_id, ?balance, "Month opening balance override updated.");
        Ok(())
    }

    /// Stored snapshot rows of the last `days` days.
    pub async fn get_balance_history(
        &self,
        account_id: AccountId,
        days: u32,
    ) -> Result<Vec<EquityPoint>, EngineError> {
        self.registry.get(account_id).await?;
        let since = Utc::now() - chrono::Duration::days(i64::from(days));
        Ok(self.pipeline.store().load_points(account_id, since).await?)
    }

    /// Restarts the peaks from the current balance. The worst drawdown on
    /// record is kept.
    pub async fn reset_peaks(&self, account_id: AccountId) -> Result<PeakState, EngineError> {
        let session = self.registry.get(account_id).await?;
        let served = self.summary(&session, false).await?;

        let mut state = session.state.lock().await;
        let balance = state.balance.unwrap_or(served.payload.stats.balance);
        let mut peaks = state.peaks.clone().unwrap_or_default();
        peaks.reset(balance, balance);
        state.peaks = Some(peaks.clone());

        session.summary.update(|snapshot| {
            let snapshot = Arc::make_mut(snapshot);
            let (drawdown_abs, drawdown_pct) = peaks.current_drawdown(snapshot.stats.equity);
            snapshot.stats.peak_balance = peaks.peak_balance;
            snapshot.stats.peak_equity = peaks.peak_equity;
            snapshot.stats.drawdown_abs = drawdown_abs;
            snapshot.stats.drawdown_pct = drawdown_pct;
        });

        let write = async {
            self.pipeline
                .put_blob(account_id, BlobKind::PeakState, &peaks)
                .await?;
            if let Some(cached) = session.summary.peek() {
                self.pipeline
                    .put_blob(account_id, BlobKind::AccountStats, &cached.payload.stats)
                    .await?;
            }
            Ok::<_, database::DbError>(())
        };
        if let Err(e) = write.await {
            state.persisted = false;
            error!(account_id, error = ?e, "Failed to persist reset peaks; will retry next cycle.");
        }

        info!(account_id, peak = %peaks.peak_balance, "Peaks reset.");
        Ok(peaks)
    }

    /// Replays the whole ledger, replaces the peaks with the replayed ones and
    /// rewrites every daily snapshot. Returns the number of points written.
    pub async fn rebuild_from_ledger(&self, account_id: AccountId) -> Result<usize, EngineError> {
        let session = self.registry.get(account_id).await?;
        let pipeline = &self.pipeline;
        let target: &AccountSession = &session;

        let mut written = Ok(0);
        let outcome = &mut written;
        session
            .summary
            .recompute(move || async move {
                let (snapshot, result) = pipeline.recompute(target, RecomputeMode::Rebuild).await?;
                *outcome = result;
                Ok::<_, EngineError>(snapshot)
            })
            .await?;

        let points = written?;
        info!(account_id, points, "Rebuilt from ledger.");
        Ok(points)
    }

    async fn alert_book(&self, account_id: AccountId) -> Result<AlertBook, EngineError> {
        let session = self.registry.get(account_id).await?;
        let mut state = session.state.lock().await;
        self.pipeline.load_alert_book(&session, &mut state).await?;
        Ok(state.alerts.clone().unwrap_or_default())
    }

    /// Applies `edit` to a copy of the alert book and keeps it once stored.
    async fn edit_alerts<T>(
        &self,
        account_id: AccountId,
        edit: impl FnOnce(&mut AlertBook) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let session = self.registry.get(account_id).await?;
        let mut state = session.state.lock().await;
        self.pipeline.load_alert_book(&session, &mut state).await?;

        let mut book = state.alerts.clone().unwrap_or_default();
        let result = edit(&mut book)?;
        self.pipeline
            .put_blob(account_id, BlobKind::Alerts, &book)
            .await?;
        state.alerts = Some(book);
        Ok(result)
    }

    pub async fn list_alerts(&self, account_id: AccountId) -> Result<Vec<AlertRule>, EngineError> {
        Ok(self.alert_book(account_id).await?.rules)
    }

    /// Adds a rule, or re-arms and relabels the identical one already present.
    /// Rules are evaluated after the next recompute.
    pub async fn add_alert(
        &self,
        account_id: AccountId,
        alert: NewAlert,
    ) -> Result<AlertRule, EngineError> {
        if alert.kind == AlertKind::Drawdown
            && (alert.threshold < Decimal::ZERO || alert.threshold > Decimal::ONE_HUNDRED)
        {
            return Err(EngineError::InvalidAlert(format!(
                "drawdown threshold {} is outside 0..=100",
                alert.threshold
            )));
        }
        let rule = self
            .edit_alerts(account_id, |book| Ok(book.add(alert, Utc::now())))
            .await?;
        info!(account_id, rule_id = rule.id, kind = %rule.kind, "Alert rule saved.");
        Ok(rule)
    }

    pub async fn remove_alert(&self, account_id: AccountId, rule_id: u32) -> Result<(), EngineError> {
        self.edit_alerts(account_id, |book| {
            book.remove(rule_id)
                .then_some(())
                .ok_or(EngineError::AlertNotFound(account_id, rule_id))
        })
        .await?;
        info!(account_id, rule_id, "Alert rule removed.");
        Ok(())
    }

    /// `Active` re-arms a triggered rule; `Disabled` silences it.
    pub async fn set_alert_status(
        &self,
        account_id: AccountId,
        rule_id: u32,
        status: AlertStatus,
    ) -> Result<AlertRule, EngineError> {
        let rule = self
            .edit_alerts(account_id, |book| {
                book.set_status(rule_id, status)
                    .ok_or(EngineError::AlertNotFound(account_id, rule_id))
            })
            .await?;
        info!(account_id, rule_id, %status, "Alert rule status changed.");
        Ok(rule)
    }

    /// The `limit` most recent triggers, newest first.
    pub async fn get_alert_history(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<AlertTrigger>, EngineError> {
        Ok(self.alert_book(account_id).await?.recent(limit))
    }

    /// Checks every account and recomputes the ones whose ledger moved (all of
    /// them with `force`). Accounts are synced concurrently.
    pub async fn sync_all(&self, force: bool) -> Vec<AccountSync> {
        let sessions = self.registry.all().await;
        let outcomes = join_all(sessions.iter().map(|s| self.sync_one(s, force))).await;
        sessions
            .iter()
            .zip(outcomes)
            .map(|(session, outcome)| AccountSync {
                account_id: session.account_id,
                outcome,
            })
            .collect()
    }

    async fn sync_one(&self, session: &AccountSession, force: bool) -> SyncOutcome {
        match self.try_sync(session, force).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(account_id = session.account_id, error = %e, "Sync failed.");
                SyncOutcome::Error(e.to_string())
            }
        }
    }

    async fn try_sync(&self, session: &AccountSession, force: bool) -> Result<SyncOutcome, EngineError> {
        let latest = match self.pipeline.latest_event_id(session.account_id).await {
            Ok(latest) => latest,
            Err(e) => {
                session.summary.record_failure();
                return Err(e);
            }
        };
        let changed = session.state.lock().await.cursor.has_changes(latest);

        if changed || force || session.summary.state() == CacheState::Empty {
            session.summary.invalidate();
            session.growth.invalidate();
            let cached = self.refresh_summary(session, true).await?;
            return Ok(SyncOutcome::Synced {
                last_event_id: cached.payload.stats.last_event_id,
            });
        }

        session.summary.touch();
        session.growth.touch();
        self.pipeline.retry_persist(session).await;
        Ok(SyncOutcome::NoChange)
    }

    /// Drops an account. A background refresh still running for it is abandoned.
    pub async fn remove_account(&self, account_id: AccountId) -> bool {
        let removed = self.registry.remove(account_id).await.is_some();
        if removed {
            info!(account_id, "Account removed.");
        }
        removed
    }

    /// Runs `sync_all(false)` every `period` until the returned task is aborted.
    /// The first cycle starts immediately.
    pub fn spawn_sync_loop(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(period = ?period, "Starting periodic sync.");
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                let results = self.sync_all(false).await;
                let synced = results
                    .iter()
                    .filter(|r| matches!(r.outcome, SyncOutcome::Synced { .. }))
                    .count();
                let failed = results
                    .iter()
                    .filter(|r| matches!(r.outcome, SyncOutcome::Error(_)))
                    .count();
                info!(accounts = results.len(), synced, failed, "Sync cycle complete.");
            }
        })
    }
}
