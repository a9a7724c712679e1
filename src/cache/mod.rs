use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

use crate::exchange::{CandleFetcher, ClientError, DataSource};
use crate::types::{Candle, CandleInterval};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("integrity mismatch: {0}")]
    IntegrityMismatch(String),
    #[error("fetch failed: {0}")]
    Fetch(#[from] ClientError),
}

/// What one `sync` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Candles fetched from upstream during this call.
    pub fetched: usize,
    /// Total rows now cached for the (source, coin, interval) key.
    pub cached: usize,
}

/// Durable candle store keyed by (source, coin, interval, t), with per-key
/// sync metadata whose `last_timestamp` only ever advances.
pub struct CandleCache {
    pool: SqlitePool,
}

impl CandleCache {
    /// Opens (creating if missing) a cache at the given sqlite path.
    pub async fn new(db_path: &str) -> Result<Self, CacheError> {
        info!("opening candle cache at {}", db_path);
        let options = SqliteConnectOptions::from_str(db_path)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let cache = Self { pool };
        cache.create_schema().await?;
        Ok(cache)
    }

    /// In-memory cache for tests. Single connection so the database is
    /// shared across queries.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let cache = Self { pool };
        cache.create_schema().await?;
        Ok(cache)
    }

    async fn create_schema(&self) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                source TEXT NOT NULL,
                coin TEXT NOT NULL,
                interval TEXT NOT NULL,
                t INTEGER NOT NULL,
                o REAL NOT NULL,
                h REAL NOT NULL,
                l REAL NOT NULL,
                c REAL NOT NULL,
                v REAL NOT NULL,
                n INTEGER NOT NULL,
                PRIMARY KEY (source, coin, interval, t)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_meta (
                source TEXT NOT NULL,
                coin TEXT NOT NULL,
                interval TEXT NOT NULL,
                last_timestamp INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (source, coin, interval)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_candles(
        &self,
        source: DataSource,
        coin: &str,
        interval: CandleInterval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, CacheError> {
        let rows = sqlx::query(
            r#"
            SELECT t, o, h, l, c, v, n FROM candles
            WHERE source = ? AND coin = ? AND interval = ? AND t >= ? AND t <= ?
            ORDER BY t ASC
            "#,
        )
        .bind(source.as_str())
        .bind(coin)
        .bind(interval.as_str())
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Candle {
                t: row.get(0),
                o: row.get(1),
                h: row.get(2),
                l: row.get(3),
                c: row.get(4),
                v: row.get(5),
                n: row.get::<i64, _>(6) as u64,
            })
            .collect())
    }

    /// Upserts a batch atomically, then advances `sync_meta.last_timestamp`
    /// (never decreasing it). Candle invariants are validated before any
    /// write; a bad row aborts the whole batch.
    pub async fn insert_candles(
        &self,
        source: DataSource,
        coin: &str,
        interval: CandleInterval,
        candles: &[Candle],
    ) -> Result<(), CacheError> {
        if candles.is_empty() {
            return Ok(());
        }
        for candle in candles {
            if !candle.is_valid() {
                return Err(CacheError::IntegrityMismatch(format!(
                    "candle at t={} violates price bounds",
                    candle.t
                )));
            }
        }
        let max_t = candles.iter().map(|c| c.t).max().unwrap_or(0);

        let mut tx = self.pool.begin().await?;
        for candle in candles {
            sqlx::query(
                r#"
                INSERT INTO candles (source, coin, interval, t, o, h, l, c, v, n)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (source, coin, interval, t) DO UPDATE SET
                    o = excluded.o, h = excluded.h, l = excluded.l,
                    c = excluded.c, v = excluded.v, n = excluded.n
                "#,
            )
            .bind(source.as_str())
            .bind(coin)
            .bind(interval.as_str())
            .bind(candle.t)
            .bind(candle.o)
            .bind(candle.h)
            .bind(candle.l)
            .bind(candle.c)
            .bind(candle.v)
            .bind(candle.n as i64)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO sync_meta (source, coin, interval, last_timestamp, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (source, coin, interval) DO UPDATE SET
                last_timestamp = MAX(last_timestamp, excluded.last_timestamp),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(source.as_str())
        .bind(coin)
        .bind(interval.as_str())
        .bind(max_t)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_first_timestamp(
        &self,
        source: DataSource,
        coin: &str,
        interval: CandleInterval,
    ) -> Result<Option<i64>, CacheError> {
        let row = sqlx::query(
            "SELECT MIN(t) FROM candles WHERE source = ? AND coin = ? AND interval = ?",
        )
        .bind(source.as_str())
        .bind(coin)
        .bind(interval.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get(0))
    }

    pub async fn get_last_timestamp(
        &self,
        source: DataSource,
        coin: &str,
        interval: CandleInterval,
    ) -> Result<Option<i64>, CacheError> {
        let row = sqlx::query(
            "SELECT MAX(t) FROM candles WHERE source = ? AND coin = ? AND interval = ?",
        )
        .bind(source.as_str())
        .bind(coin)
        .bind(interval.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get(0))
    }

    pub async fn get_candle_count(
        &self,
        source: DataSource,
        coin: &str,
        interval: CandleInterval,
    ) -> Result<usize, CacheError> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM candles WHERE source = ? AND coin = ? AND interval = ?",
        )
        .bind(source.as_str())
        .bind(coin)
        .bind(interval.as_str())
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }

    pub async fn get_sync_meta(
        &self,
        source: DataSource,
        coin: &str,
        interval: CandleInterval,
    ) -> Result<Option<i64>, CacheError> {
        let row = sqlx::query(
            "SELECT last_timestamp FROM sync_meta WHERE source = ? AND coin = ? AND interval = ?",
        )
        .bind(source.as_str())
        .bind(coin)
        .bind(interval.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get(0)))
    }

    /// Incremental sync: cold start fetches the whole window, otherwise a
    /// backfill fills history before the first cached bar and a forward fill
    /// extends past the last one.
    pub async fn sync(
        &self,
        fetcher: &dyn CandleFetcher,
        source: DataSource,
        coin: &str,
        interval: CandleInterval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<SyncOutcome, CacheError> {
        let mut fetched = 0usize;
        let count = self.get_candle_count(source, coin, interval).await?;

        if count == 0 {
            let batch = fetcher.fetch_candles(coin, interval, start_ms, end_ms).await?;
            if batch.is_empty() {
                warn!(%source, coin, %interval, start_ms, end_ms, "no candles for requested window");
            }
            fetched += batch.len();
            self.insert_candles(source, coin, interval, &batch).await?;
        } else {
            let first_cached = self
                .get_first_timestamp(source, coin, interval)
                .await?
                .unwrap_or(start_ms);
            if start_ms < first_cached {
                let batch = fetcher
                    .fetch_candles(coin, interval, start_ms, first_cached - 1)
                    .await?;
                if batch.is_empty() {
                    warn!(%source, coin, %interval, "backfill window returned no candles");
                }
                fetched += batch.len();
                self.insert_candles(source, coin, interval, &batch).await?;
            }

            let last_cached = self
                .get_last_timestamp(source, coin, interval)
                .await?
                .unwrap_or(end_ms);
            let forward_start = last_cached + interval.millis();
            if forward_start < end_ms {
                let batch = fetcher
                    .fetch_candles(coin, interval, forward_start, end_ms)
                    .await?;
                if batch.is_empty() {
                    warn!(%source, coin, %interval, "forward window returned no candles");
                }
                fetched += batch.len();
                self.insert_candles(source, coin, interval, &batch).await?;
            }
        }

        let cached = self.get_candle_count(source, coin, interval).await?;
        info!(%source, coin, %interval, fetched, cached, "sync complete");
        Ok(SyncOutcome { fetched, cached })
    }
}
