use crate::DbError;
use crate::store::{BlobKind, SnapshotStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{AccountId, EquityPoint, annotate_running_peak};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::Row;
use sqlx::postgres::PgPool;

/// The `DbRepository` implements `SnapshotStore` on PostgreSQL. It encapsulates
/// all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for DbRepository {
    async fn upsert_point(
        &self,
        account_id: AccountId,
        bucket_ts: DateTime<Utc>,
        balance: Decimal,
        equity: Decimal,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO balance_snapshots (account_id, bucket_ts, balance, equity, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (account_id, bucket_ts)
            DO UPDATE SET balance = EXCLUDED.balance, equity = EXCLUDED.equity, updated_at = NOW()
            "#,
        )
        .bind(account_id)
        .bind(bucket_ts)
        .bind(balance)
        .bind(equity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_points(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<Vec<EquityPoint>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT bucket_ts, balance, equity
            FROM balance_snapshots
            WHERE account_id = $1 AND bucket_ts >= $2
            ORDER BY bucket_ts ASC
            "#,
        )
        .bind(account_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut points = rows
            .into_iter()
            .map(|row| {
                Ok(EquityPoint {
                    account_id,
                    timestamp: row.try_get("bucket_ts")?,
                    balance: row.try_get("balance")?,
                    equity: row.try_get("equity")?,
                    drawdown_abs: Decimal::ZERO,
                    drawdown_pct: Decimal::ZERO,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        annotate_running_peak(&mut points);
        Ok(points)
    }

    /// Runs the whole batch in one transaction.
    async fn upsert_points(
        &self,
        account_id: AccountId,
        rows: &[(DateTime<Utc>, Decimal, Decimal)],
    ) -> Result<usize, DbError> {
        let mut tx = self.pool.begin().await?;
        for (bucket_ts, balance, equity) in rows {
            sqlx::query(
                r#"
                INSERT INTO balance_snapshots (account_id, bucket_ts, balance, equity, updated_at)
                VALUES ($1, $2, $3, $4, NOW())
                ON CONFLICT (account_id, bucket_ts)
                DO UPDATE SET balance = EXCLUDED.balance, equity = EXCLUDED.equity, updated_at = NOW()
                "#,
            )
            .bind(account_id)
            .bind(bucket_ts)
            .bind(balance)
            .bind(equity)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    async fn upsert_stats_blob(
        &self,
        account_id: AccountId,
        kind: BlobKind,
        payload: JsonValue,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO stats_blobs (account_id, kind, payload, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (account_id, kind)
            DO UPDATE SET payload = EXCLUDED.payload, updated_at = NOW()
            "#,
        )
        .bind(account_id)
        .bind(kind.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_stats_blob(
        &self,
        account_id: AccountId,
        kind: BlobKind,
    ) -> Result<Option<JsonValue>, DbError> {
        let payload = sqlx::query_scalar::<_, JsonValue>(
            "SELECT payload FROM stats_blobs WHERE account_id = $1 AND kind = $2",
        )
        .bind(account_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(payload)
    }
}
