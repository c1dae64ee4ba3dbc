use crate::drawdown::DrawdownAggregator;
use crate::error::AnalyticsError;
use crate::growth::GrowthCalculator;
use crate::replayer::LedgerReplayer;
use crate::report::{AccountStats, DrawdownReport, MonthlyGrowth, TradeStats};
use crate::trade_stats::TradeStatsCalculator;
use chrono::{DateTime, Datelike, FixedOffset, Utc};
use core_types::{AccountId, EquityPoint, EventKind, LedgerEvent, PeakState, local_date};
use rust_decimal::Decimal;

/// Everything derived from one account's ledger in a single pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountAnalysis {
    pub account_id: AccountId,
    /// The ledger after sorting and de-duplication.
    pub events: Vec<LedgerEvent>,
    pub points: Vec<EquityPoint>,
    /// Peaks as reconstructed from the ledger alone, starting from zero.
    pub replay_peaks: PeakState,
    pub drawdowns: DrawdownReport,
    pub growth: Vec<MonthlyGrowth>,
    pub trade_stats: TradeStats,
    pub total_deposits: Decimal,
    /// Positive magnitude of everything withdrawn.
    pub total_withdrawals: Decimal,
    /// Net trading result: settlements including commission and swap.
    pub profit: Decimal,
    pub balance: Decimal,
    pub last_event_id: Option<i64>,
}

impl AccountAnalysis {
    /// Folds the running balance after every event whose id is beyond
    /// `after` into `peaks`, in replay order. Events at or below `after` were
    /// observed by an earlier recompute and only move the running balance.
    pub fn observe_new_events(&self, peaks: &mut PeakState, after: Option<i64>) {
        let mut running = Decimal::ZERO;
        for event in &self.events {
            running += event.balance_delta();
            if after.is_none_or(|seen| event.id > seen) {
                peaks.observe(running, running);
            }
        }
    }
}

/// Runs the replay and every calculator over a ledger.
#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
    offset: FixedOffset,
}

impl AnalyticsEngine {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn replayer(&self) -> LedgerReplayer {
        LedgerReplayer::new(self.offset)
    }

    pub fn growth_calculator(&self) -> GrowthCalculator {
        GrowthCalculator::new(self.offset)
    }

    /// The full pipeline for one account. An empty ledger produces empty
    /// structures and zero totals.
    pub fn analyze(
        &self,
        account_id: AccountId,
        events: &[LedgerEvent],
    ) -> Result<AccountAnalysis, AnalyticsError> {
        let replayer = self.replayer();
        let events = replayer.normalize(events).into_owned();

        let mut replay_peaks = PeakState::new();
        let points = replayer.replay(&events, &mut replay_peaks);
        let drawdowns = DrawdownAggregator::new(self.offset).report(&points);
        let growth = self.growth_calculator().monthly_growth(&events);
        let trade_stats = TradeStatsCalculator::new().calculate(&events, &points)?;

        let mut total_deposits = Decimal::ZERO;
        let mut total_withdrawals = Decimal::ZERO;
        let mut profit = Decimal::ZERO;
        let mut balance = Decimal::ZERO;
        for event in &events {
            balance += event.balance_delta();
            match event.kind {
                EventKind::Deposit => total_deposits += event.amount.abs(),
                EventKind::Withdrawal => total_withdrawals += event.amount.abs(),
                EventKind::TradeSettlement => profit += event.net_result(),
            }
        }

        tracing::debug!(
            account_id,
            events = events.len(),
            points = points.len(),
            "Ledger analysed."
        );

        Ok(AccountAnalysis {
            account_id,
            last_event_id: events.iter().map(|e| e.id).max(),
            events,
            points,
            replay_peaks,
            drawdowns,
            growth,
            trade_stats,
            total_deposits,
            total_withdrawals,
            profit,
            balance,
        })
    }

    /// Builds the served summary from an analysis and the session's live peaks.
    ///
    /// `peaks` must already have observed the analysis' final balance; current
    /// drawdown is measured against them, not against the replay peaks.
    pub fn account_stats(
        &self,
        analysis: &AccountAnalysis,
        peaks: &PeakState,
        as_of: DateTime<Utc>,
    ) -> AccountStats {
        let (drawdown_abs, drawdown_pct) = peaks.current_drawdown(analysis.balance);

        let growth_pct = if analysis.total_deposits > Decimal::ZERO {
            (analysis.profit / analysis.total_deposits * Decimal::ONE_HUNDRED).round_dp(2)
        } else {
            Decimal::ZERO
        };

        let today = local_date(as_of, self.offset);
        let current_month_growth_pct = analysis
            .growth
            .iter()
            .find(|row| row.year == today.year())
            .and_then(|row| row.growth(today.month()));

        let recovery_factor = if peaks.max_drawdown_abs > Decimal::ZERO {
            (analysis.trade_stats.net_profit / peaks.max_drawdown_abs).round_dp(2)
        } else {
            Decimal::ZERO
        };

        AccountStats {
            account_id: analysis.account_id,
            balance: analysis.balance,
            equity: analysis.balance,
            profit: analysis.profit,
            total_deposits: analysis.total_deposits,
            total_withdrawals: analysis.total_withdrawals,
            growth_pct,
            current_month_growth_pct,
            peak_balance: peaks.peak_balance,
            peak_equity: peaks.peak_equity,
            drawdown_abs,
            drawdown_pct: drawdown_pct.round_dp(2),
            max_drawdown_abs: peaks.max_drawdown_abs,
            max_drawdown_pct: peaks.max_drawdown_pct.round_dp(2),
            recovery_factor,
            total_trades: analysis.trade_stats.total_trades,
            win_rate_pct: analysis.trade_stats.win_rate_pct,
            last_event_id: analysis.last_event_id,
            as_of,
        }
    }
}
