use alerter::{NewAlert, TelegramAlerter};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use configuration::settings::Settings;
use configuration::{LogFormat, StoreKind, StoreSettings};
use core_types::{AccountId, AlertCondition, AlertKind, AlertStatus};
use database::{DbRepository, MemoryStore, SnapshotStore, connect, run_migrations};
use engine::AccountMonitor;
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod logging;
mod render;

/// The main entry point for the Tidewatch account monitor.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; variables may come from the environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = configuration::load_settings(cli.config.as_deref())
        .context("Failed to load settings")?;
    let format = cli.log_format.unwrap_or(settings.logging.format);
    let _log_guard = logging::init(&settings.logging, format)?;

    let monitor = Arc::new(build_monitor(&settings).await?);
    if cli.cached {
        monitor.warm_start().await;
    }

    let output = Output { json: cli.json };
    match cli.command {
        Commands::Stats(args) => handle_stats(&monitor, &settings, args, output).await,
        Commands::Drawdown(args) => handle_drawdown(&monitor, args, output).await,
        Commands::Growth(args) => {
            let served = monitor.get_monthly_growth(args.account).await?;
            output.emit(&served, render::growth)
        }
        Commands::Preview(args) => handle_preview(&monitor, args, output).await,
        Commands::Trades(args) => {
            let served = monitor.get_trade_stats(args.account).await?;
            output.emit(&served, render::trades)
        }
        Commands::History(args) => {
            let points = monitor.get_balance_history(args.account, args.days).await?;
            output.emit(&points, |p| render::history(p))
        }
        Commands::ResetPeaks(args) => {
            let peaks = monitor.reset_peaks(args.account).await?;
            output.emit(&peaks, render::peaks)
        }
        Commands::Rebuild(args) => handle_rebuild(&monitor, args, output).await,
        Commands::Sync(args) => {
            let results = monitor.sync_all(args.force).await;
            output.emit(&results, |r| render::sync(r))
        }
        Commands::Watch(args) => handle_watch(monitor, args).await,
        Commands::Alerts(command) => handle_alerts(&monitor, command, output).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Drawdown, growth and trade-quality monitor for trading accounts.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to ./tidewatch.toml when present).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print payloads as JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Overrides `logging.format` from the settings.
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Serve persisted values first instead of waiting for the event source.
    #[arg(long, global = true)]
    cached: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Balance, peaks, drawdown and headline ratios of one account.
    Stats(StatsArgs),
    /// Drawdown at one granularity.
    Drawdown(DrawdownArgs),
    /// Deposit-adjusted monthly growth.
    Growth(AccountArgs),
    /// Growth of the current month, optionally setting its opening balance.
    Preview(PreviewArgs),
    /// Trade-quality statistics.
    Trades(AccountArgs),
    /// Stored balance snapshots.
    History(HistoryArgs),
    /// Restart the peaks from the current balance.
    ResetPeaks(AccountArgs),
    /// Replay the whole ledger and rewrite every stored snapshot.
    Rebuild(RebuildArgs),
    /// Refresh every account whose ledger changed.
    Sync(SyncArgs),
    /// Keep syncing every account on an interval until interrupted.
    Watch(WatchArgs),
    /// Manage threshold alerts.
    #[command(subcommand)]
    Alerts(AlertCommands),
}

#[derive(Subcommand)]
enum AlertCommands {
    /// Rules of one account.
    List(AccountArgs),
    /// Add a rule, or re-arm the identical one.
    Add(AddAlertArgs),
    /// Delete a rule.
    Remove(AlertRuleArgs),
    /// Re-arm a triggered or disabled rule.
    Reset(AlertRuleArgs),
    /// Stop a rule from firing.
    Disable(AlertRuleArgs),
    /// Recent triggers, newest first.
    History(AlertHistoryArgs),
}

#[derive(Parser)]
struct AddAlertArgs {
    #[arg(long)]
    account: AccountId,

    /// drawdown, profit, loss, balance or equity.
    #[arg(long)]
    kind: AlertKind,

    /// above, below or equals.
    #[arg(long)]
    condition: AlertCondition,

    /// A percentage for drawdown, an amount otherwise.
    #[arg(long)]
    threshold: Decimal,

    /// Sent instead of the generated text.
    #[arg(long)]
    message: Option<String>,
}

#[derive(Parser)]
struct AlertRuleArgs {
    #[arg(long)]
    account: AccountId,

    #[arg(long)]
    rule: u32,
}

#[derive(Parser)]
struct AlertHistoryArgs {
    #[arg(long)]
    account: AccountId,

    #[arg(long, default_value_t = 100)]
    limit: usize,
}

#[derive(Parser)]
struct AccountArgs {
    /// The account login number.
    #[arg(long)]
    account: AccountId,
}

#[derive(Parser)]
struct StatsArgs {
    #[arg(long)]
    account: AccountId,

    /// Recompute now instead of serving a stale summary.
    #[arg(long)]
    live: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Period {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Parser)]
struct DrawdownArgs {
    #[arg(long)]
    account: AccountId,

    #[arg(long, value_enum, default_value = "monthly")]
    period: Period,
}

#[derive(Parser)]
struct PreviewArgs {
    #[arg(long)]
    account: AccountId,

    /// Manual opening balance for the current month.
    #[arg(long, conflicts_with = "clear_start")]
    set_start: Option<Decimal>,

    /// Remove a manual opening balance.
    #[arg(long)]
    clear_start: bool,
}

#[derive(Parser)]
struct HistoryArgs {
    #[arg(long)]
    account: AccountId,

    #[arg(long, default_value_t = 30)]
    days: u32,
}

#[derive(Parser)]
struct RebuildArgs {
    /// Rebuild only this account (all accounts when omitted).
    #[arg(long)]
    account: Option<AccountId>,
}

#[derive(Parser)]
struct SyncArgs {
    /// Recompute every account even when its ledger did not change.
    #[arg(long)]
    force: bool,
}

#[derive(Parser)]
struct WatchArgs {
    /// Seconds between sync cycles.
    #[arg(long, default_value_t = 60)]
    interval: u64,
}

// ==============================================================================
// Wiring
// ==============================================================================

async fn open_store(settings: &StoreSettings) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    match settings.kind {
        StoreKind::Postgres => {
            let pool = connect(settings)
                .await
                .context("Failed to connect to the database")?;
            run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            Ok(Arc::new(DbRepository::new(pool)))
        }
        StoreKind::Memory => {
            warn!("Using the in-memory store; nothing is kept after this process exits.");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn build_monitor(settings: &Settings) -> anyhow::Result<AccountMonitor> {
    let source = event_source::from_settings(&settings.source, &settings.accounts)?;
    let store = open_store(&settings.store).await?;
    let mut monitor = AccountMonitor::from_settings(settings, source, store)?;
    if let Some(telegram) = settings.alerts.telegram.as_ref().and_then(TelegramAlerter::new) {
        info!("Alerts will be sent to Telegram.");
        monitor = monitor.with_alert_sink(Arc::new(telegram));
    }
    info!(accounts = settings.accounts.len(), "Monitor ready.");
    Ok(monitor)
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize + ?Sized>(self, value: &T, table: impl FnOnce(&T)) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            table(value);
        }
        Ok(())
    }
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn handle_stats(
    monitor: &AccountMonitor,
    settings: &Settings,
    args: StatsArgs,
    output: Output,
) -> anyhow::Result<()> {
    let served = monitor.get_account_stats(args.account, args.live).await?;
    let name = settings
        .account(args.account)
        .map(|a| a.name.as_str())
        .unwrap_or_default();
    output.emit(&served, |s| render::stats(name, s))
}

async fn handle_drawdown(
    monitor: &AccountMonitor,
    args: DrawdownArgs,
    output: Output,
) -> anyhow::Result<()> {
    match args.period {
        Period::Daily => output.emit(&monitor.get_daily_drawdown(args.account).await?, render::daily),
        Period::Weekly => {
            output.emit(&monitor.get_weekly_drawdown(args.account).await?, render::weekly)
        }
        Period::Monthly => {
            output.emit(&monitor.get_monthly_drawdown(args.account).await?, render::monthly)
        }
        Period::Yearly => {
            output.emit(&monitor.get_yearly_drawdown(args.account).await?, render::yearly)
        }
    }
}

async fn handle_preview(
    monitor: &AccountMonitor,
    args: PreviewArgs,
    output: Output,
) -> anyhow::Result<()> {
    if args.clear_start {
        monitor.set_month_start_override(args.account, None).await?;
    } else if let Some(balance) = args.set_start {
        monitor
            .set_month_start_override(args.account, Some(balance))
            .await?;
    }
    let preview = monitor.get_current_month_preview(args.account).await?;
    output.emit(&preview, render::preview)
}

async fn handle_alerts(
    monitor: &AccountMonitor,
    command: AlertCommands,
    output: Output,
) -> anyhow::Result<()> {
    match command {
        AlertCommands::List(args) => {
            output.emit(&monitor.list_alerts(args.account).await?, |r| render::alerts(r))
        }
        AlertCommands::Add(args) => {
            let rule = monitor
                .add_alert(
                    args.account,
                    NewAlert {
                        kind: args.kind,
                        condition: args.condition,
                        threshold: args.threshold,
                        message: args.message,
                    },
                )
                .await?;
            output.emit(&rule, |r| render::alerts(std::slice::from_ref(r)))
        }
        AlertCommands::Remove(args) => {
            monitor.remove_alert(args.account, args.rule).await?;
            output.emit(&args.rule, |id| println!("Rule {id} removed."))
        }
        AlertCommands::Reset(args) => {
            let rule = monitor
                .set_alert_status(args.account, args.rule, AlertStatus::Active)
                .await?;
            output.emit(&rule, |r| render::alerts(std::slice::from_ref(r)))
        }
        AlertCommands::Disable(args) => {
            let rule = monitor
                .set_alert_status(args.account, args.rule, AlertStatus::Disabled)
                .await?;
            output.emit(&rule, |r| render::alerts(std::slice::from_ref(r)))
        }
        AlertCommands::History(args) => {
            let history = monitor.get_alert_history(args.account, args.limit).await?;
            output.emit(&history, |h| render::alert_history(h))
        }
    }
}

async fn handle_rebuild(
    monitor: &AccountMonitor,
    args: RebuildArgs,
    output: Output,
) -> anyhow::Result<()> {
    let accounts = match args.account {
        Some(account) => vec![account],
        None => monitor.account_ids().await,
    };

    let progress_bar = ProgressBar::new(accounts.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    #[derive(Serialize)]
    struct Rebuilt {
        account_id: AccountId,
        points_written: Option<usize>,
        error: Option<String>,
    }

    let mut results = Vec::with_capacity(accounts.len());
    for account_id in accounts {
        progress_bar.set_message(format!("Rebuilding {account_id}..."));
        let result = monitor.rebuild_from_ledger(account_id).await;
        if let Err(e) = &result {
            warn!(account_id, error = %e, "Rebuild failed.");
        }
        results.push(Rebuilt {
            account_id,
            points_written: result.as_ref().ok().copied(),
            error: result.err().map(|e| e.to_string()),
        });
        progress_bar.inc(1);
    }
    progress_bar.finish_with_message("Rebuild complete!");

    output.emit(&results, |rows| {
        for row in rows {
            match (&row.points_written, &row.error) {
                (Some(points), _) => println!("{}: {} points written", row.account_id, points),
                (None, Some(e)) => println!("{}: failed: {}", row.account_id, e),
                (None, None) => {}
            }
        }
    })
}

async fn handle_watch(monitor: Arc<AccountMonitor>, args: WatchArgs) -> anyhow::Result<()> {
    let task = monitor.spawn_sync_loop(Duration::from_secs(args.interval.max(1)));
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupted; stopping the sync loop.");
    task.abort();
    Ok(())
}
