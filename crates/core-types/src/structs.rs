use crate::enums::{EventKind, FillEntry, OrderSide};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Accounts are identified by the broker login number.
pub type AccountId = i64;

/// Details of the fill behind a trade settlement.
///
/// `position_id` is the correlation key tying the opening fill of a position to
/// the fill(s) that close it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    pub position_id: i64,
    pub entry: FillEntry,
    pub side: OrderSide,
    pub symbol: String,
    pub volume: Decimal,
}

/// An immutable, balance-affecting occurrence in an account's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: i64,
    pub account_id: AccountId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub amount: Decimal,
    #[serde(default)]
    pub commission: Decimal,
    #[serde(default)]
    pub swap: Decimal,
    /// Present on trade settlements when the source knows the fill details.
    #[serde(default)]
    pub fill: Option<TradeFill>,
}

impl LedgerEvent {
    /// The amount by which this event moves the account balance.
    ///
    /// Deposits always add and withdrawals always subtract, whatever sign the
    /// source used for the amount. Trade settlements add their net result.
    pub fn balance_delta(&self) -> Decimal {
        match self.kind {
            EventKind::Deposit => self.amount.abs(),
            EventKind::Withdrawal => -self.amount.abs(),
            EventKind::TradeSettlement => self.net_result(),
        }
    }

    /// Profit plus commission plus swap.
    pub fn net_result(&self) -> Decimal {
        self.amount + self.commission + self.swap
    }

    /// A settlement counts as a closed trade unless it is explicitly an opening fill.
    pub fn is_closing_trade(&self) -> bool {
        self.kind == EventKind::TradeSettlement
            && self
                .fill
                .as_ref()
                .is_none_or(|fill| fill.entry == FillEntry::Close)
    }
}

/// A point-in-time balance/equity observation with its drawdown from the running peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub account_id: AccountId,
    pub timestamp: DateTime<Utc>,
    pub balance: Decimal,
    pub equity: Decimal,
    pub drawdown_abs: Decimal,
    pub drawdown_pct: Decimal,
}

/// Running peak tracking for one account session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakState {
    pub peak_balance: Decimal,
    pub peak_equity: Decimal,
    pub max_drawdown_abs: Decimal,
    pub max_drawdown_pct: Decimal,
}

impl PeakState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a new observation into the peaks and returns the current
    /// `(drawdown_abs, drawdown_pct)` measured on equity.
    pub fn observe(&mut self, balance: Decimal, equity: Decimal) -> (Decimal, Decimal) {
        if balance > self.peak_balance {
            self.peak_balance = balance;
        }
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }

        let (dd_abs, dd_pct) = drawdown(self.peak_equity, equity);
        if dd_abs > self.max_drawdown_abs {
            self.max_drawdown_abs = dd_abs;
        }
        if dd_pct > self.max_drawdown_pct {
            self.max_drawdown_pct = dd_pct;
        }
        (dd_abs, dd_pct)
    }

    /// Operator reset: the peaks restart from the current values. The record of
    /// the worst drawdown seen so far is kept.
    pub fn reset(&mut self, balance: Decimal, equity: Decimal) {
        self.peak_balance = balance;
        self.peak_equity = equity;
    }

    /// Drawdown of `equity` against the current equity peak, without mutating the state.
    pub fn current_drawdown(&self, equity: Decimal) -> (Decimal, Decimal) {
        drawdown(self.peak_equity, equity)
    }
}

/// `(max(0, peak - current), pct of peak)`, with the percentage clamped to `[0, 100]`
/// and zero when the peak is not positive.
pub fn drawdown(peak: Decimal, current: Decimal) -> (Decimal, Decimal) {
    let dd_abs = (peak - current).max(Decimal::ZERO);
    let dd_pct = if peak > Decimal::ZERO {
        (dd_abs / peak * Decimal::ONE_HUNDRED).min(Decimal::ONE_HUNDRED)
    } else {
        Decimal::ZERO
    };
    (dd_abs, dd_pct)
}

/// Recomputes the drawdown fields of a chronological series from a running
/// equity peak seeded at zero.
pub fn annotate_running_peak(points: &mut [EquityPoint]) {
    let mut peak = Decimal::ZERO;
    for point in points.iter_mut() {
        if point.equity > peak {
            peak = point.equity;
        }
        let (dd_abs, dd_pct) = drawdown(peak, point.equity);
        point.drawdown_abs = dd_abs;
        point.drawdown_pct = dd_pct;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn drawdown_is_zero_at_the_peak() {
        assert_eq!(drawdown(dec!(1050), dec!(1050)), (Decimal::ZERO, Decimal::ZERO));
        assert_eq!(drawdown(Decimal::ZERO, dec!(-10)), (dec!(10), Decimal::ZERO));
    }

    #[test]
    fn drawdown_pct_is_clamped_to_one_hundred() {
        let (dd_abs, dd_pct) = drawdown(dec!(100), dec!(-50));
        assert_eq!(dd_abs, dec!(150));
        assert_eq!(dd_pct, dec!(100));
    }

    #[test]
    fn peaks_never_decrease_until_reset() {
        let mut peaks = PeakState::new();
        peaks.observe(dec!(1000), dec!(1000));
        peaks.observe(dec!(800), dec!(800));
        assert_eq!(peaks.peak_balance, dec!(1000));
        assert_eq!(peaks.max_drawdown_abs, dec!(200));
        assert_eq!(peaks.max_drawdown_pct, dec!(20));

        peaks.reset(dec!(800), dec!(800));
        assert_eq!(peaks.peak_equity, dec!(800));
        assert_eq!(peaks.current_drawdown(dec!(800)), (Decimal::ZERO, Decimal::ZERO));
        assert_eq!(peaks.max_drawdown_pct, dec!(20));
    }

    #[test]
    fn withdrawal_always_reduces_balance() {
        let event = LedgerEvent {
            id: 1,
            account_id: 7,
            timestamp: Utc::now(),
            kind: EventKind::Withdrawal,
            amount: dec!(250),
            commission: Decimal::ZERO,
            swap: Decimal::ZERO,
            fill: None,
        };
        assert_eq!(event.balance_delta(), dec!(-250));
    }
}
