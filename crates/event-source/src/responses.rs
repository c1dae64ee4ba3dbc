use crate::error::SourceError;
use chrono::{TimeZone, Utc};
use core_types::{AccountId, EventKind, FillEntry, LedgerEvent, OrderSide, TradeFill};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// Deal type codes as reported by the terminal.
const DEAL_TYPE_BUY: i32 = 0;
const DEAL_TYPE_SELL: i32 = 1;
const DEAL_TYPE_BALANCE: i32 = 2;

// Deal entry codes.
const DEAL_ENTRY_IN: i32 = 0;

/// A single deal from `POST /history_deals`.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeDeal {
    pub ticket: i64,
    pub order: i64,
    /// Present when the bridge exposes the position identifier; preferred over `order`.
    #[serde(default)]
    pub position_id: Option<i64>,
    /// Unix seconds.
    pub time: i64,
    #[serde(rename = "type")]
    pub deal_type: i32,
    pub entry: i32,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub volume: Decimal,
    #[serde(default)]
    pub price: Decimal,
    pub profit: Decimal,
    #[serde(default)]
    pub swap: Decimal,
    #[serde(default)]
    pub commission: Decimal,
}

impl BridgeDeal {
    /// Converts a deal into a ledger event.
    ///
    /// Balance operations become deposits or withdrawals by sign; buy and sell
    /// deals become trade settlements. Other deal types (credit, bonus, charges)
    /// do not move the trading balance and yield `None`.
    pub fn into_event(self, account_id: AccountId) -> Result<Option<LedgerEvent>, SourceError> {
        let timestamp = Utc
            .timestamp_opt(self.time, 0)
            .single()
            .ok_or_else(|| SourceError::InvalidData(format!("Invalid deal time: {}", self.time)))?;

        let (kind, fill) = match self.deal_type {
            DEAL_TYPE_BALANCE if self.profit >= Decimal::ZERO => (EventKind::Deposit, None),
            DEAL_TYPE_BALANCE => (EventKind::Withdrawal, None),
            DEAL_TYPE_BUY | DEAL_TYPE_SELL => {
                let side = if self.deal_type == DEAL_TYPE_BUY {
                    OrderSide::Buy
                } else {
                    OrderSide::Sell
                };
                let entry = if self.entry == DEAL_ENTRY_IN {
                    FillEntry::Open
                } else {
                    FillEntry::Close
                };
                let fill = TradeFill {
                    position_id: self.position_id.unwrap_or(self.order),
                    entry,
                    side,
                    symbol: self.symbol,
                    volume: self.volume,
                };
                (EventKind::TradeSettlement, Some(fill))
            }
            _ => return Ok(None),
        };

        Ok(Some(LedgerEvent {
            id: self.ticket,
            account_id,
            timestamp,
            kind,
            amount: self.profit,
            commission: self.commission,
            swap: self.swap,
            fill,
        }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct HistoryRequest {
    pub date_from: String,
    pub date_to: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub login: AccountId,
    pub password: &'a str,
    pub server: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
}
