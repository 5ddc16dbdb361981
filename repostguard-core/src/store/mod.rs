//! Record storage.
//!
//! Two record kinds are persisted:
//!
//! - **Fingerprint records**: one row per distinct fingerprint, carrying the
//!   growing set of item ids that produced it plus its 5 segment values
//!   (denormalized so candidate lookup can hit an index instead of scanning
//!   the table).
//! - **Item records**: one row per stream item, written exactly once and
//!   never updated or deleted.
//!
//! Both grow monotonically; there is no eviction. That is an accepted scaling
//! limit of the design, not an oversight.
//!
//! Two interchangeable backends implement [`RecordStore`]:
//! [`MemoryStore`](memory::MemoryStore) for tests and local runs without a
//! database, and [`SqliteStore`](sqlite::SqliteStore) for the relational
//! schema shared with prior deployments.

mod memory;
#[cfg(feature = "sqlite-store")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite-store")]
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::segment::SegmentKey;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("database migration error: {0}")]
    Migration(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// A stored fingerprint and every item id that produced exactly it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRecord {
    pub fingerprint: Fingerprint,
    /// Append-only; insertion order carries no meaning.
    pub item_ids: Vec<String>,
    /// Denormalized segment values, always `segment::segments(fingerprint)`.
    pub segments: SegmentKey,
}

/// Metadata for one ingested item, written exactly once per id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    /// True when the item was flagged as a probable repost at ingest time.
    pub confirmed_repost: bool,
}

/// Persistent mapping fingerprint -> item ids and item id -> metadata.
///
/// Implementations must satisfy:
/// - `find_by_segments` returns the union over records matching *any* of the
///   5 segment values (disjunction; conjunction would break the pigeonhole
///   recall guarantee).
/// - `create_item` is a no-op when the id already exists; item rows are never
///   updated afterwards.
/// - `upsert_fingerprint` appends to an existing record's id set or inserts
///   a fresh record with derived segments. It does not dedupe ids; the one
///   duplicate source that matters (re-delivery of the same item) is guarded
///   upstream before any write happens.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch every record sharing at least one segment value with `key`.
    async fn find_by_segments(&self, key: &SegmentKey) -> Result<Vec<FingerprintRecord>, StoreError>;

    /// Fetch the record holding exactly this fingerprint, if any.
    async fn find_exact(&self, fp: Fingerprint) -> Result<Option<FingerprintRecord>, StoreError>;

    /// Append `item_id` to the record for `fp`, creating the record first if
    /// this fingerprint has never been seen.
    async fn upsert_fingerprint(&self, fp: Fingerprint, item_id: &str) -> Result<(), StoreError>;

    /// Insert an item row; silently keeps the existing row if the id is
    /// already present.
    async fn create_item(&self, item: &ItemRecord) -> Result<(), StoreError>;

    /// Fetch item metadata by id.
    async fn get_item(&self, id: &str) -> Result<Option<ItemRecord>, StoreError>;
}
