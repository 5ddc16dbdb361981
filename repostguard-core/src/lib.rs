//! Repostguard core - perceptual fingerprinting and near-duplicate matching.
//!
//! This crate holds the deterministic heart of the repost detector:
//!
//! - 64-bit difference-hash fingerprints ([`fingerprint`])
//! - the 5-segment partition that keeps Hamming lookup sub-linear
//!   ([`segment`])
//! - the [`RecordStore`] contract with in-memory and SQLite backends
//!   ([`store`])
//! - candidate filtering, ranking, and the self-match guard ([`matcher`])
//!
//! # Example
//!
//! ```no_run
//! use repostguard_core::{extract, find_matches, MatchOutcome, MemoryStore, RecordStore};
//!
//! # async fn example(image: image::GrayImage) -> Result<(), repostguard_core::StoreError> {
//! let store = MemoryStore::new();
//!
//! let Some(fp) = extract(&image) else {
//!     return Ok(()); // flat image, nothing to index
//! };
//!
//! match find_matches(&store, fp, "item-1").await? {
//!     MatchOutcome::SelfMatch => {} // re-delivered, do nothing
//!     MatchOutcome::Matches(matches) => {
//!         for m in &matches {
//!             println!("{} at distance {}", m.item_id, m.distance);
//!         }
//!         store.upsert_fingerprint(fp, "item-1").await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod fingerprint;
pub mod matcher;
pub mod segment;
pub mod store;

// Re-export main types for convenience
pub use fingerprint::{extract, Fingerprint, FINGERPRINT_BITS, GRID_HEIGHT, GRID_WIDTH};
pub use matcher::{find_matches, MatchOutcome, RankedMatch, MAX_MATCHES};
pub use segment::{from_segments, segments, SegmentKey, MATCH_THRESHOLD, SEGMENT_COUNT};
pub use store::{FingerprintRecord, ItemRecord, MemoryStore, RecordStore, StoreError};

#[cfg(feature = "sqlite-store")]
pub use store::SqliteStore;
