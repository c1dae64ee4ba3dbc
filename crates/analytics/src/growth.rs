use crate::error::AnalyticsError;
use crate::report::{MonthPreview, MonthlyGrowth, StartingBalance, StartingBalanceSource};
use chrono::{Datelike, FixedOffset};
use core_types::{LedgerEvent, local_date};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

const PCT_DP: u32 = 2;

#[derive(Debug, Default, Clone, Copy)]
struct MonthBucket {
    capital_flows: Decimal,
    trading_pnl: Option<Decimal>,
}

/// Deposit-adjusted growth: capital flows change the base, only trading P&L counts as growth.
#[derive(Debug, Clone)]
pub struct GrowthCalculator {
    offset: FixedOffset,
}

impl GrowthCalculator {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    fn buckets(&self, events: &[LedgerEvent]) -> BTreeMap<(i32, u32), MonthBucket> {
        let mut months: BTreeMap<(i32, u32), MonthBucket> = BTreeMap::new();
        for event in events {
            let date = local_date(event.timestamp, self.offset);
            let bucket = months.entry((date.year(), date.month())).or_default();
            if event.kind.is_capital_flow() {
                bucket.capital_flows += event.balance_delta();
            } else {
                *bucket.trading_pnl.get_or_insert(Decimal::ZERO) += event.net_result();
            }
        }
        months
    }

    /// One row per calendar year with activity.
    ///
    /// A month's capital flows are applied before its P&L, so the growth base
    /// already includes that month's deposits. When the base is not positive
    /// the growth is `None`. Year totals are plain sums of the defined months.
    pub fn monthly_growth(&self, events: &[LedgerEvent]) -> Vec<MonthlyGrowth> {
        let buckets = self.buckets(events);
        let mut years: BTreeMap<i32, MonthlyGrowth> = BTreeMap::new();
        let mut running_balance = Decimal::ZERO;

        for ((year, month), bucket) in buckets {
            let row = years.entry(year).or_insert_with(|| MonthlyGrowth {
                year,
                months: [None; 12],
                values: [None; 12],
                year_total: None,
                year_total_value: None,
            });

            let balance_before = running_balance + bucket.capital_flows;
            let pnl = bucket.trading_pnl.unwrap_or(Decimal::ZERO);
            running_balance = balance_before + pnl;

            let Some(pnl) = bucket.trading_pnl else {
                continue;
            };
            let idx = (month - 1) as usize;
            row.values[idx] = Some(pnl.round_dp(PCT_DP));
            row.year_total_value = Some(row.year_total_value.unwrap_or(Decimal::ZERO) + pnl);

            if balance_before > Decimal::ZERO {
                let growth = pnl / balance_before * Decimal::ONE_HUNDRED;
                row.months[idx] = Some(growth.round_dp(PCT_DP));
                row.year_total = Some(row.year_total.unwrap_or(Decimal::ZERO) + growth);
            }
        }

        years
            .into_values()
            .map(|mut row| {
                row.year_total = row.year_total.map(|t| t.round_dp(PCT_DP));
                row.year_total_value = row.year_total_value.map(|t| t.round_dp(PCT_DP));
                row
            })
            .collect()
    }

    /// Growth of the given month so far, against an already resolved opening balance.
    pub fn month_preview(
        &self,
        events: &[LedgerEvent],
        year: i32,
        month: u32,
        starting_balance: StartingBalance,
    ) -> Result<MonthPreview, AnalyticsError> {
        // Validates the month before anything is bucketed.
        core_types::month_start(year, month, self.offset)?;

        let bucket = self
            .buckets(events)
            .get(&(year, month))
            .copied()
            .unwrap_or_default();
        let trading_pnl = bucket.trading_pnl.unwrap_or(Decimal::ZERO);
        let balance_before = starting_balance.value + bucket.capital_flows;
        let growth_pct = (balance_before > Decimal::ZERO)
            .then(|| (trading_pnl / balance_before * Decimal::ONE_HUNDRED).round_dp(PCT_DP));

        Ok(MonthPreview {
            year,
            month,
            starting_balance,
            capital_flows: bucket.capital_flows,
            trading_pnl,
            growth_pct,
        })
    }
}

/// Opening balance of the current month: a manual override wins, then the
/// closest stored snapshot, then the live balance.
pub fn resolve_starting_balance(
    manual: Option<Decimal>,
    snapshot: Option<Decimal>,
    live_balance: Decimal,
) -> StartingBalance {
    match (manual, snapshot) {
        (Some(value), _) => StartingBalance {
            value,
            source: StartingBalanceSource::Manual,
        },
        (None, Some(value)) => StartingBalance {
            value,
            source: StartingBalanceSource::Snapshot,
        },
        (None, None) => StartingBalance {
            value: live_balance,
            source: StartingBalanceSource::LiveBalance,
        },
    }
}
