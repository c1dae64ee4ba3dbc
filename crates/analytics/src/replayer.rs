use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use core_types::{EquityPoint, LedgerEvent, PeakState, local_date};
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::collections::HashSet;

/// Replays a ledger into an end-of-day equity series.
///
/// Equity is modelled equal to balance: a closed ledger carries no floating
/// P&L, so the replayed series cannot show open-position swings.
#[derive(Debug, Clone)]
pub struct LedgerReplayer {
    offset: FixedOffset,
}

/// State after the last event of a date, waiting for the date to close.
struct DayClose {
    date: NaiveDate,
    timestamp: DateTime<Utc>,
    balance: Decimal,
    drawdown_abs: Decimal,
    drawdown_pct: Decimal,
}

impl LedgerReplayer {
    /// `offset` defines the local calendar used to find day boundaries.
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Sorts by `(timestamp, id)` and drops repeated ids, keeping the first.
    ///
    /// Returns the input untouched when it is already in order with unique ids.
    pub fn normalize<'a>(&self, events: &'a [LedgerEvent]) -> Cow<'a, [LedgerEvent]> {
        let ordered = events
            .windows(2)
            .all(|w| (w[0].timestamp, w[0].id) < (w[1].timestamp, w[1].id));
        let mut ids = HashSet::with_capacity(events.len());
        if ordered && events.iter().all(|event| ids.insert(event.id)) {
            return Cow::Borrowed(events);
        }

        let mut sorted = events.to_vec();
        sorted.sort_by(|a, b| (a.timestamp, a.id).cmp(&(b.timestamp, b.id)));
        let mut seen = HashSet::with_capacity(sorted.len());
        sorted.retain(|event| seen.insert(event.id));

        tracing::warn!(
            received = events.len(),
            kept = sorted.len(),
            "Ledger events arrived out of order or with duplicate ids; sorted before replay."
        );
        Cow::Owned(sorted)
    }

    /// Replays `events` from a zero balance, folding every balance change into `peaks`.
    ///
    /// One point is emitted per local date, carrying the closing state of that
    /// date: it is written when the first event of the next date arrives, and
    /// the final date is always flushed. An empty ledger yields no points and
    /// leaves `peaks` untouched.
    pub fn replay(&self, events: &[LedgerEvent], peaks: &mut PeakState) -> Vec<EquityPoint> {
        if events.is_empty() {
            return Vec::new();
        }
        let events = self.normalize(events);

        let mut points = Vec::new();
        let mut running_balance = Decimal::ZERO;
        let mut pending: Option<DayClose> = None;

        for event in events.iter() {
            let date = local_date(event.timestamp, self.offset);
            if let Some(close) = pending.take_if(|close| close.date != date) {
                points.push(self.emit(event.account_id, close));
            }

            running_balance += event.balance_delta();
            let (drawdown_abs, drawdown_pct) = peaks.observe(running_balance, running_balance);

            pending = Some(DayClose {
                date,
                timestamp: event.timestamp,
                balance: running_balance,
                drawdown_abs,
                drawdown_pct,
            });
        }

        if let (Some(close), Some(last)) = (pending, events.last()) {
            points.push(self.emit(last.account_id, close));
        }
        points
    }

    fn emit(&self, account_id: i64, close: DayClose) -> EquityPoint {
        EquityPoint {
            account_id,
            timestamp: close.timestamp,
            balance: close.balance,
            equity: close.balance,
            drawdown_abs: close.drawdown_abs,
            drawdown_pct: close.drawdown_pct,
        }
    }
}
