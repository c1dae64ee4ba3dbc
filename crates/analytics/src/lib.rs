//! # Tidewatch Analytics
//!
//! Turns an account ledger into the derived views the monitor serves: the
//! replayed equity series, drawdowns at four granularities, deposit-adjusted
//! growth and trade-quality statistics.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of the
//!   event source, the snapshot store or the cache. It depends only on `core-types`.
//! - **Stateless Calculation:** Every calculator takes its inputs by reference and
//!   returns plain report structs. The only mutable input is the `PeakState`
//!   handed to the replayer, which belongs to the caller's session.
//!
//! ## Public API
//!
//! - `LedgerReplayer`: events to one end-of-day `EquityPoint` per local date.
//! - `DrawdownAggregator`: daily drawdowns and their weekly/monthly/yearly rollups.
//! - `GrowthCalculator`: monthly growth with capital flows separated from P&L.
//! - `TradeStatsCalculator`: win rate, streaks, profit factor, Sharpe-like ratio.
//! - `AnalyticsEngine`: runs the whole pipeline and returns an `AccountAnalysis`.

pub mod drawdown;
pub mod engine;
pub mod error;
pub mod growth;
pub mod replayer;
pub mod report;
pub mod trade_stats;

pub use drawdown::DrawdownAggregator;
pub use engine::{AccountAnalysis, AnalyticsEngine};
pub use error::AnalyticsError;
pub use growth::{GrowthCalculator, resolve_starting_balance};
pub use replayer::LedgerReplayer;
pub use report::{
    AccountStats, DailyDrawdown, DrawdownReport, MonthPreview, MonthlyDrawdown, MonthlyGrowth,
    StartingBalance, StartingBalanceSource, TradeStats, WeeklyDrawdown, YearlyDrawdown,
};
pub use trade_stats::TradeStatsCalculator;
