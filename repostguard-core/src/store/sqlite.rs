//! SQLite store backend.
//!
//! Implements the relational schema shared with prior deployments:
//!
//! ```sql
//! hashes(hash TEXT PRIMARY KEY, sids TEXT, h1..h5 INTEGER)
//! submissions(sid TEXT PRIMARY KEY, author TEXT, utctime REAL, title TEXT, re INTEGER)
//! ```
//!
//! `hash` is the fixed-width hex form of the fingerprint, `sids` the
//! comma-joined item id list, and `h1..h5` the denormalized segment values
//! that candidate lookup disjuncts over.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::info;

use crate::fingerprint::Fingerprint;
use crate::segment::{self, SegmentKey, SEGMENT_COUNT};

use super::{FingerprintRecord, ItemRecord, RecordStore, StoreError};

/// SQLite-backed [`RecordStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct HashRow {
    hash: String,
    sids: String,
    h1: i64,
    h2: i64,
    h3: i64,
    h4: i64,
    h5: i64,
}

#[derive(FromRow)]
struct SubmissionRow {
    sid: String,
    author: String,
    utctime: f64,
    title: String,
    re: i64,
}

impl HashRow {
    fn into_record(self) -> Result<FingerprintRecord, StoreError> {
        let fingerprint = Fingerprint::from_hex(&self.hash)
            .ok_or_else(|| StoreError::CorruptRow(format!("bad hash key {:?}", self.hash)))?;

        let mut segments: SegmentKey = [0; SEGMENT_COUNT];
        for (slot, raw) in segments
            .iter_mut()
            .zip([self.h1, self.h2, self.h3, self.h4, self.h5])
        {
            *slot = u16::try_from(raw).map_err(|_| {
                StoreError::CorruptRow(format!("segment value {raw} out of range for {}", self.hash))
            })?;
        }

        let item_ids = self
            .sids
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(FingerprintRecord {
            fingerprint,
            item_ids,
            segments,
        })
    }
}

impl SubmissionRow {
    fn into_item(self) -> Result<ItemRecord, StoreError> {
        let created_at = DateTime::from_timestamp_millis((self.utctime * 1000.0) as i64)
            .ok_or_else(|| {
                StoreError::CorruptRow(format!("bad utctime {} for {}", self.utctime, self.sid))
            })?;

        Ok(ItemRecord {
            id: self.sid,
            author: self.author,
            created_at,
            title: self.title,
            confirmed_repost: self.re != 0,
        })
    }
}

fn query_err(e: sqlx::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and run migrations.
    ///
    /// The pool is capped at one connection: the pipeline is the only
    /// writer, and a single connection keeps `sqlite::memory:` databases
    /// coherent across calls.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "SQLite record store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS hashes (
                hash TEXT PRIMARY KEY,
                sids TEXT NOT NULL,
                h1 INTEGER NOT NULL,
                h2 INTEGER NOT NULL,
                h3 INTEGER NOT NULL,
                h4 INTEGER NOT NULL,
                h5 INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_hashes_h1 ON hashes (h1)",
            "CREATE INDEX IF NOT EXISTS idx_hashes_h2 ON hashes (h2)",
            "CREATE INDEX IF NOT EXISTS idx_hashes_h3 ON hashes (h3)",
            "CREATE INDEX IF NOT EXISTS idx_hashes_h4 ON hashes (h4)",
            "CREATE INDEX IF NOT EXISTS idx_hashes_h5 ON hashes (h5)",
            r#"
            CREATE TABLE IF NOT EXISTS submissions (
                sid TEXT PRIMARY KEY,
                author TEXT NOT NULL,
                utctime REAL NOT NULL,
                title TEXT NOT NULL,
                re INTEGER NOT NULL DEFAULT 0
            )
            "#,
        ];

        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Migration(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn find_by_segments(
        &self,
        key: &SegmentKey,
    ) -> Result<Vec<FingerprintRecord>, StoreError> {
        let rows = sqlx::query_as::<_, HashRow>(
            r#"
            SELECT hash, sids, h1, h2, h3, h4, h5 FROM hashes
            WHERE h1 = ?1 OR h2 = ?2 OR h3 = ?3 OR h4 = ?4 OR h5 = ?5
            "#,
        )
        .bind(i64::from(key[0]))
        .bind(i64::from(key[1]))
        .bind(i64::from(key[2]))
        .bind(i64::from(key[3]))
        .bind(i64::from(key[4]))
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.into_iter().map(HashRow::into_record).collect()
    }

    async fn find_exact(&self, fp: Fingerprint) -> Result<Option<FingerprintRecord>, StoreError> {
        let row = sqlx::query_as::<_, HashRow>(
            "SELECT hash, sids, h1, h2, h3, h4, h5 FROM hashes WHERE hash = ?1",
        )
        .bind(fp.to_hex())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        row.map(HashRow::into_record).transpose()
    }

    async fn upsert_fingerprint(&self, fp: Fingerprint, item_id: &str) -> Result<(), StoreError> {
        if let Some(existing) = self.find_exact(fp).await? {
            let mut item_ids = existing.item_ids;
            item_ids.push(item_id.to_string());
            sqlx::query("UPDATE hashes SET sids = ?1 WHERE hash = ?2")
                .bind(item_ids.join(","))
                .bind(fp.to_hex())
                .execute(&self.pool)
                .await
                .map_err(query_err)?;
            return Ok(());
        }

        let key = segment::segments(fp);
        sqlx::query(
            r#"
            INSERT INTO hashes (hash, sids, h1, h2, h3, h4, h5)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(fp.to_hex())
        .bind(item_id)
        .bind(i64::from(key[0]))
        .bind(i64::from(key[1]))
        .bind(i64::from(key[2]))
        .bind(i64::from(key[3]))
        .bind(i64::from(key[4]))
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn create_item(&self, item: &ItemRecord) -> Result<(), StoreError> {
        // OR IGNORE: first write wins, item rows are immutable.
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO submissions (sid, author, utctime, title, re)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&item.id)
        .bind(&item.author)
        .bind(item.created_at.timestamp_millis() as f64 / 1000.0)
        .bind(&item.title)
        .bind(i64::from(item.confirmed_repost))
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<ItemRecord>, StoreError> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            "SELECT sid, author, utctime, title, re FROM submissions WHERE sid = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        row.map(SubmissionRow::into_item).transpose()
    }
}
