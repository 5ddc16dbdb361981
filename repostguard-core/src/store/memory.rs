//! In-memory store backend.
//!
//! Backs unit tests and database-less local runs. Lookup goes through the
//! same per-segment buckets the relational schema indexes on, so the
//! candidate sets match the SQLite backend exactly instead of degenerating
//! into a full scan.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::fingerprint::Fingerprint;
use crate::segment::{self, SegmentKey};

use super::{FingerprintRecord, ItemRecord, RecordStore, StoreError};

/// In-memory [`RecordStore`]. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Fingerprint bits -> record.
    records: DashMap<u64, FingerprintRecord>,
    /// (segment position, segment value) -> fingerprint bits in that bucket.
    buckets: DashMap<(usize, u16), Vec<u64>>,
    items: DashMap<String, ItemRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct fingerprints stored.
    pub fn fingerprint_count(&self) -> usize {
        self.records.len()
    }

    /// Number of item rows stored.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_by_segments(
        &self,
        key: &SegmentKey,
    ) -> Result<Vec<FingerprintRecord>, StoreError> {
        let mut seen: Vec<u64> = Vec::new();
        let mut out = Vec::new();

        for (position, value) in key.iter().enumerate() {
            let Some(bucket) = self.buckets.get(&(position, *value)) else {
                continue;
            };
            for bits in bucket.iter() {
                if seen.contains(bits) {
                    continue;
                }
                seen.push(*bits);
                if let Some(record) = self.records.get(bits) {
                    out.push(record.clone());
                }
            }
        }

        Ok(out)
    }

    async fn find_exact(&self, fp: Fingerprint) -> Result<Option<FingerprintRecord>, StoreError> {
        Ok(self.records.get(&fp.bits()).map(|r| r.clone()))
    }

    async fn upsert_fingerprint(&self, fp: Fingerprint, item_id: &str) -> Result<(), StoreError> {
        if let Some(mut record) = self.records.get_mut(&fp.bits()) {
            record.item_ids.push(item_id.to_string());
            return Ok(());
        }

        let segments = segment::segments(fp);
        self.records.insert(
            fp.bits(),
            FingerprintRecord {
                fingerprint: fp,
                item_ids: vec![item_id.to_string()],
                segments,
            },
        );
        for (position, value) in segments.iter().enumerate() {
            self.buckets
                .entry((position, *value))
                .or_default()
                .push(fp.bits());
        }
        Ok(())
    }

    async fn create_item(&self, item: &ItemRecord) -> Result<(), StoreError> {
        // First write wins; item rows are immutable.
        self.items
            .entry(item.id.clone())
            .or_insert_with(|| item.clone());
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<ItemRecord>, StoreError> {
        Ok(self.items.get(id).map(|i| i.clone()))
    }
}
