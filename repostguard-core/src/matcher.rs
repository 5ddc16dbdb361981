//! Candidate matching and ranking.
//!
//! Candidates come back from the store's any-segment lookup with false
//! positives mixed in; every candidate's true Hamming distance is recomputed
//! here and anything past [`MATCH_THRESHOLD`](crate::segment::MATCH_THRESHOLD)
//! is discarded. Survivors are flattened to `(distance, item id)` pairs,
//! ranked distance-ascending with a stable id tiebreak, and capped at
//! [`MAX_MATCHES`] to bound reply size.
//!
//! The stream source only de-duplicates on a best-effort basis, so the item
//! currently being processed can already be in the store. That case is
//! detected here, on the *uncapped* candidate set (a self id hiding past
//! rank 10 must still be caught), and reported as [`MatchOutcome::SelfMatch`]
//! so the caller skips both the notification and the duplicate write.

use tracing::debug;

use crate::fingerprint::Fingerprint;
use crate::segment::{self, MATCH_THRESHOLD};
use crate::store::{RecordStore, StoreError};

/// Upper bound on reported matches per item.
pub const MAX_MATCHES: usize = 10;

/// One confirmed near-duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedMatch {
    /// True Hamming distance to the query fingerprint, `0..=MATCH_THRESHOLD`.
    pub distance: u32,
    pub item_id: String,
}

/// Result of matching a fingerprint against the store.
#[derive(Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The excluded item id itself was found among the candidates: the item
    /// was re-delivered, not reposted.
    SelfMatch,
    /// Ranked matches, possibly empty, at most [`MAX_MATCHES`] long.
    Matches(Vec<RankedMatch>),
}

/// Match `fp` against everything previously stored.
///
/// `exclude_id` is the id of the item that produced `fp`; finding it among
/// the candidates short-circuits into [`MatchOutcome::SelfMatch`].
pub async fn find_matches(
    store: &dyn RecordStore,
    fp: Fingerprint,
    exclude_id: &str,
) -> Result<MatchOutcome, StoreError> {
    let key = segment::segments(fp);
    let candidates = store.find_by_segments(&key).await?;
    let candidate_count = candidates.len();

    let mut hits: Vec<RankedMatch> = Vec::new();
    for record in candidates {
        let distance = fp.distance(record.fingerprint);
        if distance > MATCH_THRESHOLD {
            continue;
        }
        for item_id in record.item_ids {
            if item_id == exclude_id {
                debug!(exclude_id, "query item already stored, treating as re-delivery");
                return Ok(MatchOutcome::SelfMatch);
            }
            hits.push(RankedMatch { distance, item_id });
        }
    }

    hits.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    hits.truncate(MAX_MATCHES);

    debug!(
        fingerprint = %fp,
        candidates = candidate_count,
        matches = hits.len(),
        "candidate matching complete"
    );
    Ok(MatchOutcome::Matches(hits))
}
