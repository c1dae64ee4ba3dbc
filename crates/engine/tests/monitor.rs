use alerter::AlerterError;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Offset, TimeZone, Utc};
use configuration::{AccountSettings, AlertRuleSettings};
use core_types::{
    AccountId, AlertCondition, AlertKind, AlertStatus, EventKind, LedgerEvent, PeakState,
    month_start,
};
use database::{BlobKind, MemoryStore, SnapshotStore};
use engine::{
    AccountMonitor, AlertSink, AlertTrigger, CacheState, EngineError, MonitorOptions, NewAlert,
    SyncOutcome,
};
use event_source::EventSource;
use event_source::error::SourceError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

const ACCOUNT: AccountId = 7001;

/// A ledger held in memory, with a call counter, an optional delay on
/// `list_events` and a switch that makes every call hang.
#[derive(Default)]
struct ScriptedSource {
    events: std::sync::Mutex<Vec<LedgerEvent>>,
    list_calls: AtomicUsize,
    delay: Duration,
    hang: AtomicBool,
}

impl ScriptedSource {
    fn new(events: Vec<LedgerEvent>) -> Self {
        Self {
            events: std::sync::Mutex::new(events),
            ..Default::default()
        }
    }

    fn with_delay(events: Vec<LedgerEvent>, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(events)
        }
    }

    fn push(&self, event: LedgerEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    async fn maybe_hang(&self) {
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn list_events(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEvent>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_hang().await;
        tokio::time::sleep(self.delay).await;
        let events = self.events.lock().unwrap();
        Ok(events
            .iter()
            .filter(|e| e.account_id == account_id && e.timestamp >= from && e.timestamp <= to)
            .cloned()
            .collect())
    }

    async fn latest_event_id(&self, account_id: AccountId) -> Result<Option<i64>, SourceError> {
        self.maybe_hang().await;
        let events = self.events.lock().unwrap();
        Ok(events
            .iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.id)
            .max())
    }
}

fn event(id: i64, kind: EventKind, amount: Decimal, timestamp: DateTime<Utc>) -> LedgerEvent {
    LedgerEvent {
        id,
        account_id: ACCOUNT,
        timestamp,
        kind,
        amount,
        commission: Decimal::ZERO,
        swap: Decimal::ZERO,
        fill: None,
    }
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

/// Deposit 1000 and win 50 on day 0, lose 200 on day 1.
fn worked_ledger() -> Vec<LedgerEvent> {
    vec![
        event(1, EventKind::Deposit, dec!(1000), at(4, 9)),
        event(2, EventKind::TradeSettlement, dec!(50), at(4, 15)),
        event(3, EventKind::TradeSettlement, dec!(-200), at(5, 11)),
    ]
}

fn accounts() -> Vec<AccountSettings> {
    vec![AccountSettings {
        id: ACCOUNT,
        name: "primary".to_string(),
        currency: Some("USD".to_string()),
        password: None,
        server: None,
        alerts: Vec::new(),
    }]
}

fn accounts_with_alert(kind: AlertKind, condition: AlertCondition, threshold: Decimal) -> Vec<AccountSettings> {
    let mut accounts = accounts();
    accounts[0].alerts.push(AlertRuleSettings {
        kind,
        condition,
        threshold,
        message: None,
    });
    accounts
}

/// Collects delivered triggers, optionally taking a while per delivery.
#[derive(Default)]
struct RecordingSink {
    delivered: std::sync::Mutex<Vec<AlertTrigger>>,
    delay: Duration,
}

impl RecordingSink {
    fn delivered(&self) -> Vec<AlertTrigger> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn deliver(&self, trigger: &AlertTrigger) -> Result<(), AlerterError> {
        tokio::time::sleep(self.delay).await;
        self.delivered.lock().unwrap().push(trigger.clone());
        Ok(())
    }
}

fn options() -> MonitorOptions {
    MonitorOptions {
        source_timeout: Duration::from_millis(100),
        ..MonitorOptions::default()
    }
}

fn monitor_with(
    source: Arc<ScriptedSource>,
    store: Arc<MemoryStore>,
    options: MonitorOptions,
) -> AccountMonitor {
    AccountMonitor::new(&accounts(), source, store, options)
}

#[tokio::test]
async fn worked_scenario_end_to_end() {
    let source = Arc::new(ScriptedSource::new(worked_ledger()));
    let store = Arc::new(MemoryStore::new());
    let monitor = monitor_with(source, store.clone(), options());

    let stats = monitor.get_account_stats(ACCOUNT, false).await.unwrap();
    assert!(!stats.degraded);
    assert_eq!(stats.state, CacheState::Fresh);
    assert_eq!(stats.payload.balance, dec!(850));
    assert_eq!(stats.payload.peak_balance, dec!(1050));
    assert_eq!(stats.payload.drawdown_abs, dec!(200));
    assert_eq!(stats.payload.drawdown_pct.round_dp(2), dec!(19.05));
    assert_eq!(stats.payload.last_event_id, Some(3));

    let daily = monitor.get_daily_drawdown(ACCOUNT).await.unwrap().payload;
    assert_eq!(daily.len(), 2);
    assert_eq!(daily[0].drawdown_pct, Decimal::ZERO);
    assert_eq!(daily[1].start_balance, dec!(1050));
    assert_eq!(daily[1].min_balance, dec!(850));
    assert_eq!(daily[1].drawdown_pct, dec!(19.05));

    let monthly = monitor.get_monthly_drawdown(ACCOUNT).await.unwrap().payload;
    assert_eq!(monthly[0].month(3), Some(dec!(19.05)));
    assert_eq!(monthly[0].month(4), None);

    let weekly = monitor.get_weekly_drawdown(ACCOUNT).await.unwrap().payload;
    let yearly = monitor.get_yearly_drawdown(ACCOUNT).await.unwrap().payload;
    assert_eq!(weekly[0].drawdown_pct, dec!(19.05));
    assert_eq!(yearly[0].drawdown_pct, dec!(19.05));

    let growth = monitor.get_monthly_growth(ACCOUNT).await.unwrap().payload;
    assert_eq!(growth[0].year, 2024);
    assert_eq!(growth[0].growth(3), Some(dec!(-15.00)));

    let trades = monitor.get_trade_stats(ACCOUNT).await.unwrap().payload;
    assert_eq!(trades.total_trades, 2);
    assert_eq!(trades.max_consecutive_losses, 1);

    // Two end-of-day points plus the intraday live point.
    assert_eq!(store.point_count(ACCOUNT).await, 3);
    assert!(store.load_stats_blob(ACCOUNT, BlobKind::AccountStats).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_forced_refreshes_run_one_recompute() {
    let source = Arc::new(ScriptedSource::with_delay(
        worked_ledger(),
        Duration::from_millis(200),
    ));
    let monitor = Arc::new(monitor_with(
        source.clone(),
        Arc::new(MemoryStore::new()),
        MonitorOptions {
            source_timeout: Duration::from_secs(5),
            ..MonitorOptions::default()
        },
    ));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.get_account_stats(ACCOUNT, true).await })
        })
        .collect();

    for handle in handles {
        let served = handle.await.unwrap().unwrap();
        assert_eq!(served.payload.balance, dec!(850));
        assert!(!served.degraded);
    }
    assert_eq!(source.list_calls(), 1);
}

#[tokio::test]
async fn source_timeout_serves_the_cached_payload_degraded() {
    let source = Arc::new(ScriptedSource::new(worked_ledger()));
    let monitor = monitor_with(source.clone(), Arc::new(MemoryStore::new()), options());
    monitor.get_account_stats(ACCOUNT, false).await.unwrap();

    source.set_hang(true);
    let served = monitor.get_account_stats(ACCOUNT, true).await.unwrap();
    assert!(served.degraded);
    assert_eq!(served.payload.balance, dec!(850));
}

#[tokio::test]
async fn source_timeout_without_cache_is_an_error() {
    let source = Arc::new(ScriptedSource::new(worked_ledger()));
    source.set_hang(true);
    let monitor = monitor_with(source, Arc::new(MemoryStore::new()), options());

    let result = monitor.get_account_stats(ACCOUNT, false).await;
    assert!(matches!(
        result,
        Err(EngineError::Source(SourceError::Timeout(_)))
    ));
}

#[tokio::test]
async fn stale_reads_return_immediately_and_report_a_failed_background_refresh() {
    let source = Arc::new(ScriptedSource::new(worked_ledger()));
    let monitor = monitor_with(
        source.clone(),
        Arc::new(MemoryStore::new()),
        MonitorOptions {
            summary_ttl: Duration::from_millis(50),
            ..options()
        },
    );
    monitor.get_account_stats(ACCOUNT, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    source.set_hang(true);
    let stale = monitor.get_account_stats(ACCOUNT, false).await.unwrap();
    assert_eq!(stale.state, CacheState::Stale);
    assert!(!stale.degraded);

    // The background cursor check times out after 100ms.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let after = monitor.get_account_stats(ACCOUNT, false).await.unwrap();
    assert!(after.degraded);
    assert_eq!(after.payload.balance, dec!(850));
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let monitor = monitor_with(
        Arc::new(ScriptedSource::new(worked_ledger())),
        Arc::new(MemoryStore::new()),
        options(),
    );
    assert!(matches!(
        monitor.get_account_stats(42, false).await,
        Err(EngineError::AccountNotFound(42))
    ));
    assert!(matches!(
        monitor.rebuild_from_ledger(42).await,
        Err(EngineError::AccountNotFound(42))
    ));
}

#[tokio::test]
async fn failed_writes_are_retried_on_the_next_cycle() {
    let store = Arc::new(MemoryStore::new());
    let monitor = monitor_with(
        Arc::new(ScriptedSource::new(worked_ledger())),
        store.clone(),
        options(),
    );

    store.set_fail_writes(true);
    let served = monitor.get_account_stats(ACCOUNT, false).await.unwrap();
    assert_eq!(served.payload.balance, dec!(850));
    assert_eq!(store.point_count(ACCOUNT).await, 0);

    store.set_fail_writes(false);
    let results = monitor.sync_all(false).await;
    assert_eq!(results[0].outcome, SyncOutcome::NoChange);
    assert_eq!(store.point_count(ACCOUNT).await, 3);
    assert!(store.load_stats_blob(ACCOUNT, BlobKind::PeakState).await.unwrap().is_some());
}

#[tokio::test]
async fn sync_detects_new_events_through_the_cursor() {
    let source = Arc::new(ScriptedSource::new(worked_ledger()));
    let monitor = monitor_with(source.clone(), Arc::new(MemoryStore::new()), options());

    let first = monitor.sync_all(false).await;
    assert_eq!(first[0].outcome, SyncOutcome::Synced { last_event_id: Some(3) });

    let calls = source.list_calls();
    let idle = monitor.sync_all(false).await;
    assert_eq!(idle[0].outcome, SyncOutcome::NoChange);
    assert_eq!(source.list_calls(), calls);

    source.push(event(4, EventKind::TradeSettlement, dec!(100), at(6, 10)));
    let moved = monitor.sync_all(false).await;
    assert_eq!(moved[0].outcome, SyncOutcome::Synced { last_event_id: Some(4) });

    let stats = monitor.get_account_stats(ACCOUNT, false).await.unwrap().payload;
    assert_eq!(stats.balance, dec!(950));
    // The live peak is still the day-0 high.
    assert_eq!(stats.peak_balance, dec!(1050));

    let forced = monitor.sync_all(true).await;
    assert_eq!(forced[0].outcome, SyncOutcome::Synced { last_event_id: Some(4) });
}

#[tokio::test]
async fn reset_peaks_then_rebuild_restores_the_replayed_peaks() {
    let store = Arc::new(MemoryStore::new());
    let monitor = monitor_with(
        Arc::new(ScriptedSource::new(worked_ledger())),
        store.clone(),
        options(),
    );

    let peaks = monitor.reset_peaks(ACCOUNT).await.unwrap();
    assert_eq!(peaks.peak_balance, dec!(850));
    assert_eq!(peaks.max_drawdown_abs, dec!(200));

    let stats = monitor.get_account_stats(ACCOUNT, false).await.unwrap().payload;
    assert_eq!(stats.peak_balance, dec!(850));
    assert_eq!(stats.drawdown_pct, Decimal::ZERO);

    let stored = store
        .load_stats_blob(ACCOUNT, BlobKind::PeakState)
        .await
        .unwrap()
        .unwrap();
    let stored: PeakState = serde_json::from_value(stored).unwrap();
    assert_eq!(stored, peaks);

    let written = monitor.rebuild_from_ledger(ACCOUNT).await.unwrap();
    assert_eq!(written, 2);
    let rebuilt = monitor.get_account_stats(ACCOUNT, false).await.unwrap().payload;
    assert_eq!(rebuilt.peak_balance, dec!(1050));
    assert_eq!(rebuilt.drawdown_abs, dec!(200));
}

#[tokio::test]
async fn rebuild_reports_store_failures() {
    let store = Arc::new(MemoryStore::new());
    let monitor = monitor_with(
        Arc::new(ScriptedSource::new(worked_ledger())),
        store.clone(),
        options(),
    );
    store.set_fail_writes(true);
    assert!(matches!(
        monitor.rebuild_from_ledger(ACCOUNT).await,
        Err(EngineError::Database(_))
    ));
}

fn current_month_ledger() -> Vec<LedgerEvent> {
    let now = Utc::now();
    let start = month_start(now.year(), now.month(), Utc.fix()).unwrap();
    vec![
        event(1, EventKind::Deposit, dec!(1000), start - ChronoDuration::days(2)),
        event(2, EventKind::TradeSettlement, dec!(100), now - ChronoDuration::seconds(1)),
    ]
}

#[tokio::test]
async fn month_preview_prefers_override_then_snapshot_then_live_balance() {
    use analytics::StartingBalanceSource;

    let store = Arc::new(MemoryStore::new());
    let monitor = monitor_with(
        Arc::new(ScriptedSource::new(current_month_ledger())),
        store.clone(),
        options(),
    );

    let preview = monitor.get_current_month_preview(ACCOUNT).await.unwrap().payload;
    assert_eq!(preview.starting_balance.source, StartingBalanceSource::Snapshot);
    assert_eq!(preview.starting_balance.value, dec!(1000));
    assert_eq!(preview.trading_pnl, dec!(100));
    assert_eq!(preview.growth_pct, Some(dec!(10.00)));

    monitor.set_month_start_override(ACCOUNT, Some(dec!(2000))).await.unwrap();
    let manual = monitor.get_current_month_preview(ACCOUNT).await.unwrap().payload;
    assert_eq!(manual.starting_balance.source, StartingBalanceSource::Manual);
    assert_eq!(manual.growth_pct, Some(dec!(5.00)));

    monitor.set_month_start_override(ACCOUNT, None).await.unwrap();
    let cleared = monitor.get_current_month_preview(ACCOUNT).await.unwrap().payload;
    assert_eq!(cleared.starting_balance.source, StartingBalanceSource::Snapshot);
}

#[tokio::test]
async fn month_preview_falls_back_to_the_live_balance() {
    use analytics::StartingBalanceSource;

    let store = Arc::new(MemoryStore::new());
    store.set_fail_writes(true);
    let monitor = monitor_with(
        Arc::new(ScriptedSource::new(current_month_ledger())),
        store,
        options(),
    );

    let preview = monitor.get_current_month_preview(ACCOUNT).await.unwrap().payload;
    assert_eq!(preview.starting_balance.source, StartingBalanceSource::LiveBalance);
    assert_eq!(preview.starting_balance.value, dec!(1100));
    assert_eq!(preview.growth_pct, Some(dec!(9.09)));
}

#[tokio::test]
async fn warm_start_serves_persisted_values_without_the_source() {
    let store = Arc::new(MemoryStore::new());
    let first = monitor_with(
        Arc::new(ScriptedSource::new(worked_ledger())),
        store.clone(),
        options(),
    );
    first.get_account_stats(ACCOUNT, false).await.unwrap();

    let offline = Arc::new(ScriptedSource::new(worked_ledger()));
    offline.set_hang(true);
    let restarted = monitor_with(offline, store, options());
    assert_eq!(restarted.warm_start().await, 1);

    let served = restarted.get_account_stats(ACCOUNT, false).await.unwrap();
    assert_eq!(served.state, CacheState::Stale);
    assert_eq!(served.payload.balance, dec!(850));
    assert_eq!(served.payload.peak_balance, dec!(1050));
}

#[tokio::test]
async fn balance_history_returns_stored_rows() {
    let monitor = monitor_with(
        Arc::new(ScriptedSource::new(current_month_ledger())),
        Arc::new(MemoryStore::new()),
        options(),
    );
    monitor.get_account_stats(ACCOUNT, false).await.unwrap();

    let history = monitor.get_balance_history(ACCOUNT, 40).await.unwrap();
    assert!(!history.is_empty());
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(history.last().unwrap().balance, dec!(1100));
}

#[tokio::test]
async fn removed_accounts_abandon_their_background_refresh() {
    let source = Arc::new(ScriptedSource::with_delay(
        worked_ledger(),
        Duration::from_millis(150),
    ));
    let store = Arc::new(MemoryStore::new());
    let monitor = monitor_with(
        source.clone(),
        store.clone(),
        MonitorOptions {
            summary_ttl: Duration::from_millis(50),
            source_timeout: Duration::from_secs(5),
            ..MonitorOptions::default()
        },
    );
    monitor.get_account_stats(ACCOUNT, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    source.push(event(4, EventKind::TradeSettlement, dec!(100), at(6, 10)));
    let writes_before = store.writes();
    monitor.get_account_stats(ACCOUNT, false).await.unwrap();
    assert!(monitor.remove_account(ACCOUNT).await);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.writes(), writes_before);
    assert!(matches!(
        monitor.get_account_stats(ACCOUNT, false).await,
        Err(EngineError::AccountNotFound(ACCOUNT))
    ));
    assert!(!monitor.remove_account(ACCOUNT).await);
}

#[tokio::test]
async fn month_preview_serves_the_cached_growth_when_the_source_hangs() {
    let source = Arc::new(ScriptedSource::new(current_month_ledger()));
    let monitor = monitor_with(source.clone(), Arc::new(MemoryStore::new()), options());
    let live = monitor.get_current_month_preview(ACCOUNT).await.unwrap();
    assert!(!live.degraded);

    source.set_hang(true);
    let cached = monitor.get_current_month_preview(ACCOUNT).await.unwrap();
    assert!(cached.degraded);
    assert_eq!(cached.payload.trading_pnl, dec!(100));
    assert_eq!(cached.payload.growth_pct, Some(dec!(10.00)));
}

#[tokio::test]
async fn month_preview_without_any_cache_reports_the_source_failure() {
    let source = Arc::new(ScriptedSource::new(current_month_ledger()));
    source.set_hang(true);
    let monitor = monitor_with(source, Arc::new(MemoryStore::new()), options());
    assert!(matches!(
        monitor.get_current_month_preview(ACCOUNT).await,
        Err(EngineError::Source(SourceError::Timeout(_)))
    ));
}

#[tokio::test]
async fn a_high_between_two_syncs_raises_the_live_peak() {
    let source = Arc::new(ScriptedSource::new(vec![event(
        1,
        EventKind::Deposit,
        dec!(1000),
        at(4, 9),
    )]));
    let monitor = monitor_with(source.clone(), Arc::new(MemoryStore::new()), options());
    monitor.sync_all(false).await;

    source.push(event(2, EventKind::TradeSettlement, dec!(500), at(5, 10)));
    source.push(event(3, EventKind::TradeSettlement, dec!(-600), at(6, 10)));
    monitor.sync_all(false).await;

    let stats = monitor.get_account_stats(ACCOUNT, false).await.unwrap().payload;
    assert_eq!(stats.balance, dec!(900));
    assert_eq!(stats.peak_balance, dec!(1500));
    assert_eq!(stats.drawdown_pct, dec!(40));
    assert_eq!(stats.max_drawdown_pct, dec!(40));
}

#[tokio::test]
async fn every_new_day_is_stored_when_several_arrive_at_once() {
    let source = Arc::new(ScriptedSource::new(vec![event(
        1,
        EventKind::Deposit,
        dec!(1000),
        at(4, 9),
    )]));
    let store = Arc::new(MemoryStore::new());
    let monitor = monitor_with(source.clone(), store.clone(), options());
    monitor.sync_all(false).await;

    for (id, day) in (2..).zip(5..=9) {
        source.push(event(id, EventKind::TradeSettlement, dec!(10), at(day, 10)));
    }
    monitor.sync_all(false).await;

    let stored = store.load_points(ACCOUNT, at(1, 0)).await.unwrap();
    let daily: Vec<_> = stored.iter().filter(|p| p.timestamp.year() == 2024).collect();
    assert_eq!(daily.len(), 6);
    assert_eq!(daily.last().unwrap().balance, dec!(1050));
}

#[tokio::test]
async fn reset_peaks_uses_the_balance_of_the_latest_recompute() {
    let sink = Arc::new(RecordingSink {
        delay: Duration::from_millis(300),
        ..Default::default()
    });
    let source = Arc::new(ScriptedSource::new(worked_ledger()));
    let monitor = AccountMonitor::new(
        &accounts_with_alert(AlertKind::Balance, AlertCondition::Above, dec!(900)),
        source.clone(),
        Arc::new(MemoryStore::new()),
        MonitorOptions {
            summary_ttl: Duration::from_millis(50),
            ..options()
        },
    )
    .with_alert_sink(sink.clone());
    monitor.get_account_stats(ACCOUNT, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    // The background recompute commits 950 and then stalls delivering the
    // balance alert, so the cached summary still shows 850.
    source.push(event(4, EventKind::TradeSettlement, dec!(100), at(6, 10)));
    monitor.get_account_stats(ACCOUNT, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let peaks = monitor.reset_peaks(ACCOUNT).await.unwrap();
    assert_eq!(peaks.peak_balance, dec!(950));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(sink.delivered().len(), 1);
}

#[tokio::test]
async fn configured_alerts_fire_once_until_reset() {
    let sink = Arc::new(RecordingSink::default());
    let store = Arc::new(MemoryStore::new());
    let monitor = AccountMonitor::new(
        &accounts_with_alert(AlertKind::Drawdown, AlertCondition::Above, dec!(10)),
        Arc::new(ScriptedSource::new(worked_ledger())),
        store.clone(),
        options(),
    )
    .with_alert_sink(sink.clone());

    monitor.sync_all(false).await;
    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].actual_value, dec!(19.05));
    assert_eq!(delivered[0].message, "Drawdown exceeded 10% (current: 19.05%)");

    let rules = monitor.list_alerts(ACCOUNT).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].status, AlertStatus::Triggered);

    monitor.sync_all(true).await;
    assert_eq!(sink.delivered().len(), 1);

    monitor
        .set_alert_status(ACCOUNT, rules[0].id, AlertStatus::Active)
        .await
        .unwrap();
    monitor.sync_all(true).await;
    assert_eq!(sink.delivered().len(), 2);

    let history = monitor.get_alert_history(ACCOUNT, 100).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].triggered_at >= history[1].triggered_at);
    assert!(store.load_stats_blob(ACCOUNT, BlobKind::Alerts).await.unwrap().is_some());
}

#[tokio::test]
async fn alert_rules_survive_a_restart() {
    let store = Arc::new(MemoryStore::new());
    let first = monitor_with(
        Arc::new(ScriptedSource::new(worked_ledger())),
        store.clone(),
        options(),
    );
    let rule = first
        .add_alert(
            ACCOUNT,
            NewAlert {
                kind: AlertKind::Balance,
                condition: AlertCondition::Below,
                threshold: dec!(900),
                message: Some("Balance is low".to_string()),
            },
        )
        .await
        .unwrap();
    first.sync_all(false).await;

    let restarted = monitor_with(
        Arc::new(ScriptedSource::new(worked_ledger())),
        store,
        options(),
    );
    let rules = restarted.list_alerts(ACCOUNT).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, rule.id);
    assert_eq!(rules[0].status, AlertStatus::Triggered);
    let history = restarted.get_alert_history(ACCOUNT, 10).await.unwrap();
    assert_eq!(history[0].message, "Balance is low");
}

#[tokio::test]
async fn alert_operations_reject_bad_input() {
    let monitor = monitor_with(
        Arc::new(ScriptedSource::new(worked_ledger())),
        Arc::new(MemoryStore::new()),
        options(),
    );
    let too_deep = NewAlert {
        kind: AlertKind::Drawdown,
        condition: AlertCondition::Above,
        threshold: dec!(150),
        message: None,
    };
    assert!(matches!(
        monitor.add_alert(ACCOUNT, too_deep).await,
        Err(EngineError::InvalidAlert(_))
    ));
    assert!(matches!(
        monitor.remove_alert(ACCOUNT, 3).await,
        Err(EngineError::AlertNotFound(ACCOUNT, 3))
    ));
    assert!(matches!(
        monitor.set_alert_status(ACCOUNT, 3, AlertStatus::Disabled).await,
        Err(EngineError::AlertNotFound(ACCOUNT, 3))
    ));
}
