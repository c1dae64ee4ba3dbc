use crate::report::{DailyDrawdown, DrawdownReport, MonthlyDrawdown, WeeklyDrawdown, YearlyDrawdown};
use chrono::{Datelike, FixedOffset, NaiveDate};
use core_types::{EquityPoint, local_date};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Published percentages carry two decimal places. Daily values are rounded
/// before any rollup so that every parent period is an exact max of its children.
const PCT_DP: u32 = 2;

/// Derives daily drawdowns from an equity series and rolls them up.
///
/// Weekly, monthly and yearly values are never computed from balances; each
/// one is the maximum of the daily values it contains.
#[derive(Debug, Clone)]
pub struct DrawdownAggregator {
    offset: FixedOffset,
}

impl DrawdownAggregator {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// All four granularities at once.
    pub fn report(&self, points: &[EquityPoint]) -> DrawdownReport {
        let daily = self.daily(points);
        DrawdownReport {
            weekly: Self::weekly(&daily),
            monthly: Self::monthly(&daily),
            yearly: Self::yearly(&daily),
            daily,
        }
    }

    /// Drawdown inside each local date, from the day's opening balance.
    ///
    /// The opening balance is the previous day's last balance, or the first
    /// point's balance for the first day. The intraday peak and trough both
    /// start at the opening balance.
    pub fn daily(&self, points: &[EquityPoint]) -> Vec<DailyDrawdown> {
        let mut by_day: BTreeMap<NaiveDate, Vec<&EquityPoint>> = BTreeMap::new();
        for point in points {
            by_day
                .entry(local_date(point.timestamp, self.offset))
                .or_default()
                .push(point);
        }

        let mut result = Vec::with_capacity(by_day.len());
        let mut prev_day_close: Option<Decimal> = None;

        for (date, mut day_points) in by_day {
            day_points.sort_by_key(|p| p.timestamp);
            let (Some(first), Some(last)) = (day_points.first(), day_points.last()) else {
                continue;
            };

            let start_balance = prev_day_close.unwrap_or(first.balance);
            let mut day_peak = start_balance;
            let mut day_min = start_balance;
            for p in &day_points {
                day_peak = day_peak.max(p.balance);
                day_min = day_min.min(p.balance);
            }

            let drawdown_pct = if day_peak > Decimal::ZERO {
                ((day_peak - day_min) / day_peak * Decimal::ONE_HUNDRED)
                    .max(Decimal::ZERO)
                    .min(Decimal::ONE_HUNDRED)
            } else {
                Decimal::ZERO
            };

            result.push(DailyDrawdown {
                date,
                drawdown_pct: drawdown_pct.round_dp(PCT_DP),
                start_balance: start_balance.round_dp(PCT_DP),
                min_balance: day_min.round_dp(PCT_DP),
            });
            prev_day_close = Some(last.balance);
        }

        result
    }

    /// Max daily drawdown per ISO `(year, week)`.
    pub fn weekly(daily: &[DailyDrawdown]) -> Vec<WeeklyDrawdown> {
        let mut weeks: BTreeMap<(i32, u32), WeeklyDrawdown> = BTreeMap::new();
        for day in daily {
            let iso = day.date.iso_week();
            weeks
                .entry((iso.year(), iso.week()))
                .and_modify(|week| {
                    week.drawdown_pct = week.drawdown_pct.max(day.drawdown_pct);
                    if day.date < week.start_date {
                        week.start_date = day.date;
                    }
                })
                .or_insert_with(|| WeeklyDrawdown {
                    year: iso.year(),
                    week: iso.week(),
                    start_date: day.date,
                    drawdown_pct: day.drawdown_pct,
                });
        }
        weeks.into_values().collect()
    }

    /// Max daily drawdown per calendar month, one row per year with data.
    pub fn monthly(daily: &[DailyDrawdown]) -> Vec<MonthlyDrawdown> {
        let mut years: BTreeMap<i32, [Option<Decimal>; 12]> = BTreeMap::new();
        for day in daily {
            let months = years.entry(day.date.year()).or_insert([None; 12]);
            let slot = &mut months[day.date.month0() as usize];
            *slot = Some(slot.map_or(day.drawdown_pct, |m| m.max(day.drawdown_pct)));
        }

        years
            .into_iter()
            .map(|(year, months)| {
                let year_max = months
                    .iter()
                    .flatten()
                    .copied()
                    .max()
                    .filter(|max| *max > Decimal::ZERO);
                MonthlyDrawdown {
                    year,
                    months,
                    year_max,
                }
            })
            .collect()
    }

    /// Max daily drawdown per year, with the first day's opening balance and the lowest balance.
    pub fn yearly(daily: &[DailyDrawdown]) -> Vec<YearlyDrawdown> {
        let mut years: BTreeMap<i32, YearlyDrawdown> = BTreeMap::new();
        for day in daily {
            years
                .entry(day.date.year())
                .and_modify(|year| {
                    year.drawdown_pct = year.drawdown_pct.max(day.drawdown_pct);
                    year.min_balance = year.min_balance.min(day.min_balance);
                })
                .or_insert_with(|| YearlyDrawdown {
                    year: day.date.year(),
                    drawdown_pct: day.drawdown_pct,
                    start_balance: day.start_balance,
                    min_balance: day.min_balance,
                });
        }
        years.into_values().collect()
    }
}
