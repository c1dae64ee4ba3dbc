use crate::error::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{AccountId, EquityPoint};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// The kinds of derived-statistics payloads kept per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlobKind {
    AccountStats,
    TradeStats,
    MonthlyGrowth,
    Drawdowns,
    SyncCursor,
    PeakState,
    MonthStartOverride,
    /// Alert rules and their trigger history.
    Alerts,
}

impl BlobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobKind::AccountStats => "account_stats",
            BlobKind::TradeStats => "trade_stats",
            BlobKind::MonthlyGrowth => "monthly_growth",
            BlobKind::Drawdowns => "drawdowns",
            BlobKind::SyncCursor => "sync_cursor",
            BlobKind::PeakState => "peak_state",
            BlobKind::MonthStartOverride => "month_start_override",
            BlobKind::Alerts => "alerts",
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlobKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account_stats" => Ok(BlobKind::AccountStats),
            "trade_stats" => Ok(BlobKind::TradeStats),
            "monthly_growth" => Ok(BlobKind::MonthlyGrowth),
            "drawdowns" => Ok(BlobKind::Drawdowns),
            "sync_cursor" => Ok(BlobKind::SyncCursor),
            "peak_state" => Ok(BlobKind::PeakState),
            "month_start_override" => Ok(BlobKind::MonthStartOverride),
            "alerts" => Ok(BlobKind::Alerts),
            other => Err(DbError::UnknownBlobKind(other.to_string())),
        }
    }
}

/// Idempotent persistence for snapshot rows and statistics blobs.
///
/// Every write is an upsert: re-ingesting the same key overwrites the row.
/// Implementations are shared across accounts and must accept concurrent calls.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn upsert_point(
        &self,
        account_id: AccountId,
        bucket_ts: DateTime<Utc>,
        balance: Decimal,
        equity: Decimal,
    ) -> Result<(), DbError>;

    /// Points at or after `since`, ordered by bucket, with drawdown fields
    /// recomputed from a running peak over the returned rows.
    async fn load_points(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<Vec<EquityPoint>, DbError>;

    async fn upsert_stats_blob(
        &self,
        account_id: AccountId,
        kind: BlobKind,
        payload: JsonValue,
    ) -> Result<(), DbError>;

    async fn load_stats_blob(
        &self,
        account_id: AccountId,
        kind: BlobKind,
    ) -> Result<Option<JsonValue>, DbError>;

    /// Writes a batch of `(bucket_ts, balance, equity)` rows, returning how many were written.
    async fn upsert_points(
        &self,
        account_id: AccountId,
        rows: &[(DateTime<Utc>, Decimal, Decimal)],
    ) -> Result<usize, DbError> {
        for (bucket_ts, balance, equity) in rows {
            self.upsert_point(account_id, *bucket_ts, *balance, *equity).await?;
        }
        Ok(rows.len())
    }
}
