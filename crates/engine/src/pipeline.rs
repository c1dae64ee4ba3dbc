use crate::error::EngineError;
use crate::options::MonitorOptions;
use crate::session::{AccountSession, AccountSnapshot, SessionState};
use alerter::{AlertBook, AlertSink, AlertTrigger};
use analytics::{AnalyticsEngine, MonthlyGrowth};
use chrono::{DateTime, Utc};
use core_types::{AccountId, LedgerEvent, daily_bucket, intraday_bucket};
use database::{BlobKind, DbError, SnapshotStore};
use event_source::EventSource;
use event_source::error::SourceError;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How the live peaks are treated by a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeMode {
    /// Fold the new balance into the session's existing peaks.
    Refresh,
    /// Replace the peaks with the ones reconstructed from the ledger and
    /// rewrite every stored point.
    Rebuild,
}

/// Source, store and calculators shared by every account session.
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn EventSource>,
    store: Arc<dyn SnapshotStore>,
    analytics: AnalyticsEngine,
    options: MonitorOptions,
    alert_sink: Option<Arc<dyn AlertSink>>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn SnapshotStore>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            source,
            store,
            analytics: AnalyticsEngine::new(options.offset),
            options,
            alert_sink: None,
        }
    }

    /// Delivers every alert trigger to `sink` in addition to the log.
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = Some(sink);
        self
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    pub fn analytics(&self) -> &AnalyticsEngine {
        &self.analytics
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, SourceError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.options.source_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SourceError::Timeout(self.options.source_timeout).into()),
        }
    }

    /// Ledger events in `[from, to]`, bounded by the source timeout.
    pub async fn fetch_events(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEvent>, EngineError> {
        self.bounded(self.source.list_events(account_id, from, to)).await
    }

    /// The source's latest event id, bounded by the source timeout.
    pub async fn latest_event_id(&self, account_id: AccountId) -> Result<Option<i64>, EngineError> {
        self.bounded(self.source.latest_event_id(account_id)).await
    }

    /// Replays the full ledger of one account and publishes the result.
    ///
    /// The growth table is stored into its gate here; the summary is returned
    /// for the caller to store through its own gate. Persistence failures do
    /// not fail the recompute: they are returned alongside the snapshot and
    /// leave the session marked as not persisted.
    pub async fn recompute(
        &self,
        session: &AccountSession,
        mode: RecomputeMode,
    ) -> Result<(Arc<AccountSnapshot>, Result<usize, DbError>), EngineError> {
        let account_id = session.account_id;
        let now = Utc::now();
        let events = self
            .fetch_events(account_id, self.options.history_from, now)
            .await?;
        let analysis = self.analytics.analyze(account_id, &events)?;

        let mut state = session.state.lock().await;
        let seen = state.cursor.last_event_id;
        let peaks = match (mode, state.peaks.take()) {
            (RecomputeMode::Refresh, Some(mut live)) => {
                analysis.observe_new_events(&mut live, seen);
                live.observe(analysis.balance, analysis.balance);
                live
            }
            _ => analysis.replay_peaks.clone(),
        };
        let stats = self.analytics.account_stats(&analysis, &peaks, now);
        state.peaks = Some(peaks);
        state.balance = Some(analysis.balance);

        if state.cursor.commit(analysis.last_event_id) {
            debug!(account_id, last_event_id = ?analysis.last_event_id, "Cursor advanced.");
        }

        let triggers = match self.load_alert_book(session, &mut state).await {
            Ok(()) => state
                .alerts
                .as_mut()
                .map(|book| book.evaluate(&stats))
                .unwrap_or_default(),
            Err(e) => {
                warn!(account_id, error = %e, "Could not load alert rules; skipping evaluation.");
                Vec::new()
            }
        };

        let snapshot = Arc::new(AccountSnapshot {
            stats,
            drawdowns: analysis.drawdowns,
            trade_stats: analysis.trade_stats,
            points: analysis.points,
        });
        let growth = Arc::new(analysis.growth);
        session.growth.store(growth.clone());

        if session.is_removed() {
            debug!(account_id, "Account removed during recompute; skipping persistence.");
            return Ok((snapshot, Ok(0)));
        }

        let from = match mode {
            RecomputeMode::Refresh if state.persisted => state.persisted_through,
            _ => None,
        };
        let written = self
            .persist(account_id, &snapshot, &growth, &state, from)
            .await;
        match &written {
            Ok(points) => {
                state.persisted = true;
                state.persisted_through = self.last_bucket(&snapshot).or(state.persisted_through);
                debug!(account_id, points, "Derived values persisted.");
            }
            Err(e) => {
                state.persisted = false;
                error!(account_id, error = ?e, "Failed to persist derived values; will retry next cycle.");
            }
        }
        drop(state);

        self.deliver(&triggers).await;
        Ok((snapshot, written))
    }

    fn last_bucket(&self, snapshot: &AccountSnapshot) -> Option<DateTime<Utc>> {
        snapshot
            .points
            .last()
            .map(|p| daily_bucket(p.timestamp, self.options.offset))
    }

    /// Loads the account's alert book from the store on first use and
    /// installs the configured rules it lacks. A book already held in the
    /// session is left alone.
    pub async fn load_alert_book(
        &self,
        session: &AccountSession,
        state: &mut SessionState,
    ) -> Result<(), EngineError> {
        if state.alerts.is_some() {
            return Ok(());
        }
        let mut book = match self
            .store
            .load_stats_blob(session.account_id, BlobKind::Alerts)
            .await?
        {
            Some(value) => serde_json::from_value(value)?,
            None => AlertBook::new(),
        };
        let seeded = book.seed(&session.configured_alerts, Utc::now());
        if seeded > 0 {
            debug!(account_id = session.account_id, seeded, "Configured alert rules installed.");
        }
        state.alerts = Some(book);
        Ok(())
    }

    async fn deliver(&self, triggers: &[AlertTrigger]) {
        for trigger in triggers {
            warn!(
                account_id = trigger.account_id,
                rule_id = trigger.rule_id,
                kind = %trigger.kind,
                value = %trigger.actual_value,
                "Alert triggered: {}",
                trigger.message
            );
            let Some(sink) = &self.alert_sink else {
                continue;
            };
            if let Err(e) = sink.deliver(trigger).await {
                error!(account_id = trigger.account_id, rule_id = trigger.rule_id, error = %e, "Failed to deliver alert.");
            }
        }
    }

    /// Writes the snapshot rows and every stats blob. Daily points from the
    /// bucket `from` onwards are written, all of them when `from` is `None`.
    /// Returns the number of daily points written.
    pub async fn persist(
        &self,
        account_id: AccountId,
        snapshot: &AccountSnapshot,
        growth: &[MonthlyGrowth],
        state: &SessionState,
        from: Option<DateTime<Utc>>,
    ) -> Result<usize, DbError> {
        let rows: Vec<_> = snapshot
            .points
            .iter()
            .map(|p| (daily_bucket(p.timestamp, self.options.offset), p.balance, p.equity))
            .filter(|(bucket, _, _)| from.is_none_or(|from| *bucket >= from))
            .collect();
        let written = self.store.upsert_points(account_id, &rows).await?;

        self.store
            .upsert_point(
                account_id,
                intraday_bucket(Utc::now()),
                snapshot.stats.balance,
                snapshot.stats.equity,
            )
            .await?;

        self.put_blob(account_id, BlobKind::AccountStats, &snapshot.stats).await?;
        self.put_blob(account_id, BlobKind::TradeStats, &snapshot.trade_stats).await?;
        self.put_blob(account_id, BlobKind::Drawdowns, &snapshot.drawdowns).await?;
        self.put_blob(account_id, BlobKind::MonthlyGrowth, growth).await?;
        self.put_blob(account_id, BlobKind::SyncCursor, &state.cursor).await?;
        if let Some(peaks) = &state.peaks {
            self.put_blob(account_id, BlobKind::PeakState, peaks).await?;
        }
        if let Some(alerts) = &state.alerts {
            self.put_blob(account_id, BlobKind::Alerts, alerts).await?;
        }
        Ok(written)
    }

    pub async fn put_blob<T: Serialize + ?Sized>(
        &self,
        account_id: AccountId,
        kind: BlobKind,
        value: &T,
    ) -> Result<(), DbError> {
        let payload = serde_json::to_value(value)?;
        self.store.upsert_stats_blob(account_id, kind, payload).await
    }

    /// Rewrites everything the cache holds when the last write failed.
    pub async fn retry_persist(&self, session: &AccountSession) {
        let mut state = session.state.lock().await;
        if state.persisted || session.is_removed() {
            return;
        }
        let Some(summary) = session.summary.peek() else {
            return;
        };
        let growth = session
            .growth
            .peek()
            .map(|cached| cached.payload)
            .unwrap_or_default();

        match self
            .persist(session.account_id, &summary.payload, &growth, &state, None)
            .await
        {
            Ok(points) => {
                state.persisted = true;
                state.persisted_through = self.last_bucket(&summary.payload);
                info!(account_id = session.account_id, points, "Retried write succeeded.");
            }
            Err(e) => {
                error!(account_id = session.account_id, error = ?e, "Retried write failed.");
            }
        }
    }

    /// Off-request refresh: check the cursor, recompute only when the ledger
    /// moved, otherwise just extend the cached payload's life.
    pub async fn background_refresh(&self, session: &AccountSession) -> Result<(), EngineError> {
        let account_id = session.account_id;
        if session.is_removed() {
            debug!(account_id, "Account removed; background refresh abandoned.");
            return Ok(());
        }

        let latest = match self.latest_event_id(account_id).await {
            Ok(latest) => latest,
            Err(e) => {
                session.summary.record_failure();
                return Err(e);
            }
        };
        let changed = session.state.lock().await.cursor.has_changes(latest);

        if !changed {
            debug!(account_id, "No new ledger events; keeping cached values.");
            session.summary.touch();
            session.growth.touch();
            self.retry_persist(session).await;
            return Ok(());
        }

        session.summary.invalidate();
        session.growth.invalidate();
        session
            .summary
            .refresh(false, || async {
                self.recompute(session, RecomputeMode::Refresh)
                    .await
                    .map(|(snapshot, _)| snapshot)
            })
            .await?;
        Ok(())
    }

    /// Runs `background_refresh` on its own task unless one is already
    /// running for this account.
    pub fn spawn_background_refresh(&self, session: Arc<AccountSession>) {
        let Some(slot) = session.summary.try_begin_background() else {
            debug!(account_id = session.account_id, "Background refresh already running.");
            return;
        };
        let pipeline = self.clone();
        tokio::spawn(async move {
            let _slot = slot;
            debug!(account_id = session.account_id, "Background refresh started.");
            if let Err(e) = pipeline.background_refresh(&session).await {
                warn!(account_id = session.account_id, error = %e, "Background refresh failed.");
            }
        });
    }
}
