use crate::error::DbError;
use crate::store::{BlobKind, SnapshotStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{AccountId, EquityPoint, annotate_running_peak};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// An in-process `SnapshotStore`.
///
/// Backs `store.kind = "memory"` and the test suites. Writes can be switched to
/// fail to exercise the "not persisted" path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    points: Mutex<BTreeMap<(AccountId, DateTime<Utc>), (Decimal, Decimal)>>,
    blobs: Mutex<HashMap<(AccountId, BlobKind), JsonValue>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write returns `DbError::WriteRejected` and stores nothing.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful write calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn point_count(&self, account_id: AccountId) -> usize {
        self.points
            .lock()
            .await
            .keys()
            .filter(|(id, _)| *id == account_id)
            .count()
    }

    fn check_writable(&self) -> Result<(), DbError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::WriteRejected("memory store is failing writes".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn upsert_point(
        &self,
        account_id: AccountId,
        bucket_ts: DateTime<Utc>,
        balance: Decimal,
        equity: Decimal,
    ) -> Result<(), DbError> {
        self.check_writable()?;
        self.points
            .lock()
            .await
            .insert((account_id, bucket_ts), (balance, equity));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_points(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<Vec<EquityPoint>, DbError> {
        let points = self.points.lock().await;
        let mut loaded: Vec<EquityPoint> = points
            .range((account_id, since)..)
            .take_while(|((id, _), _)| *id == account_id)
            .map(|((_, timestamp), (balance, equity))| EquityPoint {
                account_id,
                timestamp: *timestamp,
                balance: *balance,
                equity: *equity,
                drawdown_abs: Decimal::ZERO,
                drawdown_pct: Decimal::ZERO,
            })
            .collect();
        annotate_running_peak(&mut loaded);
        Ok(loaded)
    }

    async fn upsert_stats_blob(
        &self,
        account_id: AccountId,
        kind: BlobKind,
        payload: JsonValue,
    ) -> Result<(), DbError> {
        self.check_writable()?;
        self.blobs.lock().await.insert((account_id, kind), payload);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_stats_blob(
        &self,
        account_id: AccountId,
        kind: BlobKind,
    ) -> Result<Option<JsonValue>, DbError> {
        Ok(self.blobs.lock().await.get(&(account_id, kind)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, day, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn upserting_the_same_bucket_overwrites() {
        let store = MemoryStore::new();
        store.upsert_point(1, ts(1), dec!(100), dec!(100)).await.unwrap();
        store.upsert_point(1, ts(1), dec!(120), dec!(120)).await.unwrap();
        assert_eq!(store.point_count(1).await, 1);

        let points = store.load_points(1, ts(1)).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].balance, dec!(120));
    }

    #[tokio::test]
    async fn load_points_is_ordered_scoped_and_annotated() {
        let store = MemoryStore::new();
        store
            .upsert_points(
                1,
                &[
                    (ts(3), dec!(80), dec!(80)),
                    (ts(1), dec!(50), dec!(50)),
                    (ts(2), dec!(100), dec!(100)),
                ],
            )
            .await
            .unwrap();
        store.upsert_point(2, ts(2), dec!(999), dec!(999)).await.unwrap();

        let points = store.load_points(1, ts(1)).await.unwrap();
        let balances: Vec<Decimal> = points.iter().map(|p| p.balance).collect();
        assert_eq!(balances, vec![dec!(50), dec!(100), dec!(80)]);
        assert_eq!(points[2].drawdown_abs, dec!(20));
        assert_eq!(points[2].drawdown_pct, dec!(20));

        let recent = store.load_points(1, ts(2)).await.unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn failing_writes_store_nothing() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let result = store
            .upsert_stats_blob(1, BlobKind::TradeStats, json!({"total_trades": 3}))
            .await;
        assert!(matches!(result, Err(DbError::WriteRejected(_))));
        assert_eq!(store.load_stats_blob(1, BlobKind::TradeStats).await.unwrap(), None);

        store.set_fail_writes(false);
        store
            .upsert_stats_blob(1, BlobKind::TradeStats, json!({"total_trades": 3}))
            .await
            .unwrap();
        assert_eq!(
            store.load_stats_blob(1, BlobKind::TradeStats).await.unwrap(),
            Some(json!({"total_trades": 3}))
        );
        assert_eq!(store.writes(), 1);
    }
}
