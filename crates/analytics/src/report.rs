use chrono::{DateTime, NaiveDate, Utc};
use core_types::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Drawdown inside one local calendar day, measured from the day's opening balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDrawdown {
    pub date: NaiveDate,
    pub drawdown_pct: Decimal,
    pub start_balance: Decimal,
    pub min_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyDrawdown {
    pub year: i32,
    pub week: u32,
    /// Earliest date with data in this ISO week.
    pub start_date: NaiveDate,
    pub drawdown_pct: Decimal,
}

/// One calendar year of monthly maxima. Index 0 is January; months without data are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyDrawdown {
    pub year: i32,
    pub months: [Option<Decimal>; 12],
    pub year_max: Option<Decimal>,
}

impl MonthlyDrawdown {
    /// The value for a 1-based month number.
    pub fn month(&self, month: u32) -> Option<Decimal> {
        month
            .checked_sub(1)
            .and_then(|idx| self.months.get(idx as usize).copied().flatten())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyDrawdown {
    pub year: i32,
    pub drawdown_pct: Decimal,
    pub start_balance: Decimal,
    pub min_balance: Decimal,
}

/// All four drawdown granularities, derived from the same daily series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawdownReport {
    pub daily: Vec<DailyDrawdown>,
    pub weekly: Vec<WeeklyDrawdown>,
    pub monthly: Vec<MonthlyDrawdown>,
    pub yearly: Vec<YearlyDrawdown>,
}

/// Deposit-adjusted growth of one calendar year.
///
/// `months` holds growth percentages and `values` the trading P&L, both indexed
/// from January. `None` marks a month with no trading activity or, for
/// `months`, a month whose opening balance was not positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyGrowth {
    pub year: i32,
    pub months: [Option<Decimal>; 12],
    pub values: [Option<Decimal>; 12],
    pub year_total: Option<Decimal>,
    pub year_total_value: Option<Decimal>,
}

impl MonthlyGrowth {
    pub fn growth(&self, month: u32) -> Option<Decimal> {
        month
            .checked_sub(1)
            .and_then(|idx| self.months.get(idx as usize).copied().flatten())
    }

    pub fn value(&self, month: u32) -> Option<Decimal> {
        month
            .checked_sub(1)
            .and_then(|idx| self.values.get(idx as usize).copied().flatten())
    }
}

/// Where the opening balance of the current month came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartingBalanceSource {
    Manual,
    Snapshot,
    LiveBalance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartingBalance {
    pub value: Decimal,
    pub source: StartingBalanceSource,
}

/// Growth of the month in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthPreview {
    pub year: i32,
    pub month: u32,
    pub starting_balance: StartingBalance,
    pub capital_flows: Decimal,
    pub trading_pnl: Decimal,
    pub growth_pct: Option<Decimal>,
}

/// Trade-quality statistics over closed trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    // I. Counts
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    pub win_rate_pct: Decimal,

    // II. Profitability
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub net_profit: Decimal,
    pub profit_factor: Decimal, // 0 when there is no gross loss
    pub best_trade: Decimal,
    pub worst_trade: Decimal,
    pub average_profit: Decimal,
    pub average_loss: Decimal,
    pub expected_payoff: Decimal,

    // III. Streaks
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,

    // IV. Direction
    pub longs_count: usize,
    pub shorts_count: usize,
    pub longs_won: usize,
    pub shorts_won: usize,

    // V. Risk-adjusted
    pub sharpe_ratio: Decimal,

    // VI. Time-Based Metrics
    #[serde(with = "humantime_serde")]
    pub average_holding_time: Duration,
}

impl TradeStats {
    /// Creates a new, zeroed-out report. This is also the answer for an empty ledger.
    pub fn new() -> Self {
        Self {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            breakeven_trades: 0,
            win_rate_pct: Decimal::ZERO,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            net_profit: Decimal::ZERO,
            profit_factor: Decimal::ZERO,
            best_trade: Decimal::ZERO,
            worst_trade: Decimal::ZERO,
            average_profit: Decimal::ZERO,
            average_loss: Decimal::ZERO,
            expected_payoff: Decimal::ZERO,
            max_consecutive_wins: 0,
            max_consecutive_losses: 0,
            longs_count: 0,
            shorts_count: 0,
            longs_won: 0,
            shorts_won: 0,
            sharpe_ratio: Decimal::ZERO,
            average_holding_time: Duration::ZERO,
        }
    }
}

impl Default for TradeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// The account summary served to callers.
///
/// Current drawdown figures are measured against the session's live peaks,
/// which an operator may reset; the `max_*` figures survive resets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStats {
    pub account_id: AccountId,
    pub balance: Decimal,
    pub equity: Decimal,
    pub profit: Decimal,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub growth_pct: Decimal,
    pub current_month_growth_pct: Option<Decimal>,
    pub peak_balance: Decimal,
    pub peak_equity: Decimal,
    pub drawdown_abs: Decimal,
    pub drawdown_pct: Decimal,
    pub max_drawdown_abs: Decimal,
    pub max_drawdown_pct: Decimal,
    pub recovery_factor: Decimal,
    pub total_trades: usize,
    pub win_rate_pct: Decimal,
    pub last_event_id: Option<i64>,
    pub as_of: DateTime<Utc>,
}
