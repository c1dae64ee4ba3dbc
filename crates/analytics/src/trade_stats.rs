use crate::error::AnalyticsError;
use crate::report::TradeStats;
use chrono::{DateTime, Utc};
use core_types::{EquityPoint, FillEntry, LedgerEvent, OrderSide};
use rust_decimal::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

/// Fewer step returns than this and the Sharpe-like ratio is reported as zero.
pub const MIN_SHARPE_SAMPLES: usize = 10;

const RATIO_DP: u32 = 2;

/// A stateless calculator for trade-quality statistics.
#[derive(Debug, Default, Clone)]
pub struct TradeStatsCalculator {}

impl TradeStatsCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The main entry point.
    ///
    /// # Arguments
    ///
    /// * `events` - The normalized ledger. Only closing settlements count as trades;
    ///   opening fills are used for holding time alone.
    /// * `points` - The replayed equity series the Sharpe-like ratio is taken from.
    pub fn calculate(
        &self,
        events: &[LedgerEvent],
        points: &[EquityPoint],
    ) -> Result<TradeStats, AnalyticsError> {
        let mut stats = TradeStats::new();
        let closed: Vec<&LedgerEvent> = events.iter().filter(|e| e.is_closing_trade()).collect();

        if closed.is_empty() {
            return Ok(stats);
        }

        Self::calculate_profitability(&closed, &mut stats);
        Self::calculate_streaks(&closed, &mut stats);
        Self::calculate_direction(&closed, &mut stats);
        stats.sharpe_ratio = Self::sharpe_ratio(points)?;
        stats.average_holding_time = Self::average_holding_time(events);

        Ok(stats)
    }

    fn calculate_profitability(closed: &[&LedgerEvent], stats: &mut TradeStats) {
        stats.total_trades = closed.len();
        stats.best_trade = Decimal::MIN;
        stats.worst_trade = Decimal::MAX;

        for event in closed {
            let result = event.net_result();
            stats.net_profit += result;
            stats.best_trade = stats.best_trade.max(result);
            stats.worst_trade = stats.worst_trade.min(result);

            match result.cmp(&Decimal::ZERO) {
                std::cmp::Ordering::Greater => {
                    stats.gross_profit += result;
                    stats.winning_trades += 1;
                }
                std::cmp::Ordering::Less => {
                    stats.gross_loss += result.abs();
                    stats.losing_trades += 1;
                }
                std::cmp::Ordering::Equal => stats.breakeven_trades += 1,
            }
        }

        let total = Decimal::from(stats.total_trades);
        stats.win_rate_pct =
            (Decimal::from(stats.winning_trades) / total * Decimal::ONE_HUNDRED).round_dp(RATIO_DP);
        stats.expected_payoff = (stats.net_profit / total).round_dp(RATIO_DP);

        // Zero, not infinite, when nothing was lost.
        if stats.gross_loss > Decimal::ZERO {
            stats.profit_factor = (stats.gross_profit / stats.gross_loss).round_dp(RATIO_DP);
        }
        if stats.winning_trades > 0 {
            stats.average_profit =
                (stats.gross_profit / Decimal::from(stats.winning_trades)).round_dp(RATIO_DP);
        }
        if stats.losing_trades > 0 {
            stats.average_loss =
                (stats.gross_loss / Decimal::from(stats.losing_trades)).round_dp(RATIO_DP);
        }
    }

    /// A break-even trade ends both the winning and the losing streak.
    fn calculate_streaks(closed: &[&LedgerEvent], stats: &mut TradeStats) {
        let mut wins = 0usize;
        let mut losses = 0usize;
        for event in closed {
            let result = event.net_result();
            if result > Decimal::ZERO {
                wins += 1;
                losses = 0;
            } else if result < Decimal::ZERO {
                losses += 1;
                wins = 0;
            } else {
                wins = 0;
                losses = 0;
            }
            stats.max_consecutive_wins = stats.max_consecutive_wins.max(wins);
            stats.max_consecutive_losses = stats.max_consecutive_losses.max(losses);
        }
    }

    /// A closing sell ends a long position and a closing buy ends a short one.
    fn calculate_direction(closed: &[&LedgerEvent], stats: &mut TradeStats) {
        for event in closed {
            let Some(fill) = &event.fill else { continue };
            let won = event.net_result() > Decimal::ZERO;
            match fill.side {
                OrderSide::Sell => {
                    stats.longs_count += 1;
                    stats.longs_won += usize::from(won);
                }
                OrderSide::Buy => {
                    stats.shorts_count += 1;
                    stats.shorts_won += usize::from(won);
                }
            }
        }
    }

    /// Mean step return over its population standard deviation.
    ///
    /// Steps are taken between consecutive points whose earlier equity is
    /// positive. Zero with fewer than `MIN_SHARPE_SAMPLES` steps or with no
    /// dispersion.
    pub fn sharpe_ratio(points: &[EquityPoint]) -> Result<Decimal, AnalyticsError> {
        let returns: Vec<Decimal> = points
            .windows(2)
            .filter(|w| w[0].equity > Decimal::ZERO)
            .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
            .collect();

        if returns.len() < MIN_SHARPE_SAMPLES {
            return Ok(Decimal::ZERO);
        }

        let n = Decimal::from(returns.len());
        let mean = returns.iter().sum::<Decimal>() / n;
        let variance = returns
            .iter()
            .map(|r| (*r - mean) * (*r - mean))
            .sum::<Decimal>()
            / n;

        if variance <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        let std_dev = variance.sqrt().ok_or_else(|| {
            AnalyticsError::Calculation("square root of the return variance".to_string())
        })?;
        if std_dev.is_zero() {
            return Ok(Decimal::ZERO);
        }
        Ok((mean / std_dev).round_dp(2))
    }

    /// Average time from the first opening fill to the last closing fill of each position.
    fn average_holding_time(events: &[LedgerEvent]) -> Duration {
        let mut positions: HashMap<i64, (Option<DateTime<Utc>>, Option<DateTime<Utc>>)> =
            HashMap::new();
        for event in events {
            let Some(fill) = &event.fill else { continue };
            let (opened, closed) = positions.entry(fill.position_id).or_default();
            match fill.entry {
                FillEntry::Open => {
                    if opened.is_none_or(|t| event.timestamp < t) {
                        *opened = Some(event.timestamp);
                    }
                }
                FillEntry::Close => {
                    if closed.is_none_or(|t| event.timestamp > t) {
                        *closed = Some(event.timestamp);
                    }
                }
            }
        }

        let held: Vec<Duration> = positions
            .into_values()
            .filter_map(|(opened, closed)| (closed? - opened?).to_std().ok())
            .collect();

        if held.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = held.iter().sum();
        total / held.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::{EventKind, TradeFill};
    use rust_decimal_macros::dec;

    fn settlement(id: i64, amount: Decimal) -> LedgerEvent {
        LedgerEvent {
            id,
            account_id: 9,
            timestamp: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(id),
            kind: EventKind::TradeSettlement,
            amount,
            commission: Decimal::ZERO,
            swap: Decimal::ZERO,
            fill: None,
        }
    }

    fn with_fill(mut event: LedgerEvent, position_id: i64, entry: FillEntry, side: OrderSide) -> LedgerEvent {
        event.fill = Some(TradeFill {
            position_id,
            entry,
            side,
            symbol: "EURUSD".to_string(),
            volume: dec!(0.1),
        });
        event
    }

    fn equity(values: &[Decimal]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| EquityPoint {
                account_id: 9,
                timestamp: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap() + chrono::Duration::days(i as i64),
                balance: *v,
                equity: *v,
                drawdown_abs: Decimal::ZERO,
                drawdown_pct: Decimal::ZERO,
            })
            .collect()
    }

    #[test]
    fn empty_ledger_is_zeroed_not_an_error() {
        let stats = TradeStatsCalculator::new().calculate(&[], &[]).unwrap();
        assert_eq!(stats, TradeStats::new());
    }

    #[test]
    fn profit_factor_is_zero_without_losses() {
        let events = vec![settlement(1, dec!(100)), settlement(2, dec!(200))];
        let stats = TradeStatsCalculator::new().calculate(&events, &[]).unwrap();
        assert_eq!(stats.gross_profit, dec!(300));
        assert_eq!(stats.gross_loss, Decimal::ZERO);
        assert_eq!(stats.profit_factor, Decimal::ZERO);
        assert_eq!(stats.win_rate_pct, dec!(100));
    }

    #[test]
    fn break_even_trade_resets_both_streaks() {
        let events = vec![
            settlement(1, dec!(10)),
            settlement(2, dec!(10)),
            settlement(3, Decimal::ZERO),
            settlement(4, dec!(10)),
            settlement(5, dec!(-5)),
            settlement(6, dec!(-5)),
            settlement(7, Decimal::ZERO),
            settlement(8, dec!(-5)),
        ];
        let stats = TradeStatsCalculator::new().calculate(&events, &[]).unwrap();
        assert_eq!(stats.max_consecutive_wins, 2);
        assert_eq!(stats.max_consecutive_losses, 2);
        assert_eq!(stats.breakeven_trades, 2);
        assert_eq!(stats.winning_trades, 3);
        assert_eq!(stats.losing_trades, 3);
    }

    #[test]
    fn wins_use_the_net_result() {
        let mut trade = settlement(1, dec!(5));
        trade.commission = dec!(-4);
        trade.swap = dec!(-2);
        let stats = TradeStatsCalculator::new().calculate(&[trade], &[]).unwrap();
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.net_profit, dec!(-1));
        assert_eq!(stats.worst_trade, dec!(-1));
        assert_eq!(stats.best_trade, dec!(-1));
    }

    #[test]
    fn profitability_figures() {
        let events = vec![
            settlement(1, dec!(300)),
            settlement(2, dec!(-100)),
            settlement(3, dec!(100)),
            settlement(4, dec!(-100)),
        ];
        let stats = TradeStatsCalculator::new().calculate(&events, &[]).unwrap();
        assert_eq!(stats.profit_factor, dec!(2));
        assert_eq!(stats.average_profit, dec!(200));
        assert_eq!(stats.average_loss, dec!(100));
        assert_eq!(stats.expected_payoff, dec!(50));
        assert_eq!(stats.win_rate_pct, dec!(50));
    }

    #[test]
    fn opening_fills_are_not_trades() {
        let events = vec![
            with_fill(settlement(1, Decimal::ZERO), 77, FillEntry::Open, OrderSide::Buy),
            with_fill(settlement(4, dec!(40)), 77, FillEntry::Close, OrderSide::Sell),
        ];
        let stats = TradeStatsCalculator::new().calculate(&events, &[]).unwrap();
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.breakeven_trades, 0);
        assert_eq!(stats.longs_count, 1);
        assert_eq!(stats.longs_won, 1);
        assert_eq!(stats.shorts_count, 0);
    }

    #[test]
    fn holding_time_pairs_by_position_id() {
        // Positions interleave, so pairing by list position would be wrong.
        let events = vec![
            with_fill(settlement(1, Decimal::ZERO), 10, FillEntry::Open, OrderSide::Buy),
            with_fill(settlement(2, Decimal::ZERO), 20, FillEntry::Open, OrderSide::Sell),
            with_fill(settlement(3, dec!(5)), 10, FillEntry::Close, OrderSide::Sell),
            with_fill(settlement(5, dec!(-5)), 20, FillEntry::Close, OrderSide::Buy),
            with_fill(settlement(9, Decimal::ZERO), 30, FillEntry::Open, OrderSide::Buy),
        ];
        let stats = TradeStatsCalculator::new().calculate(&events, &[]).unwrap();
        // Position 10 held 2h, position 20 held 3h, position 30 never closed.
        assert_eq!(stats.average_holding_time, Duration::from_secs(150 * 60));
        assert_eq!(stats.shorts_count, 1);
        assert_eq!(stats.shorts_won, 0);
    }

    #[test]
    fn holding_time_is_zero_when_nothing_pairs() {
        let events = vec![settlement(1, dec!(5)), settlement(2, dec!(6))];
        let stats = TradeStatsCalculator::new().calculate(&events, &[]).unwrap();
        assert_eq!(stats.average_holding_time, Duration::ZERO);
    }

    #[test]
    fn sharpe_needs_ten_samples() {
        let points = equity(&[dec!(100), dec!(101), dec!(99), dec!(104), dec!(103)]);
        assert_eq!(TradeStatsCalculator::sharpe_ratio(&points).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn sharpe_is_zero_without_dispersion() {
        let points = equity(&[dec!(100); 12]);
        assert_eq!(TradeStatsCalculator::sharpe_ratio(&points).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn sharpe_sign_follows_mean_return() {
        let rising: Vec<Decimal> = (0..12)
            .map(|i| dec!(1000) + Decimal::from(i * 10) + if i % 2 == 0 { dec!(3) } else { Decimal::ZERO })
            .collect();
        let ratio = TradeStatsCalculator::sharpe_ratio(&equity(&rising)).unwrap();
        assert!(ratio > Decimal::ZERO);
        assert!(ratio.scale() <= 2);

        let falling: Vec<Decimal> = rising.iter().rev().copied().collect();
        let ratio = TradeStatsCalculator::sharpe_ratio(&equity(&falling)).unwrap();
        assert!(ratio < Decimal::ZERO);
    }
}
