//! Segment keys: fixed-width slices of a fingerprint used as index keys.
//!
//! A 64-bit fingerprint is partitioned into 5 contiguous groups of widths
//! (13, 13, 13, 13, 12), each read as an unsigned integer. The partition
//! makes Hamming lookup sub-linear by the pigeonhole principle: two
//! fingerprints differing in at most [`MATCH_THRESHOLD`] bit positions
//! cannot differ in all 5 disjoint groups, so at least one group is
//! bit-for-bit identical. Fetching every stored record that shares *any*
//! segment value with the query therefore retrieves every true match at
//! distance <= 4, with false positives filtered later by a true distance
//! computation.
//!
//! [`MATCH_THRESHOLD`] and [`SEGMENT_COUNT`] are coupled: the recall
//! guarantee requires `MATCH_THRESHOLD < SEGMENT_COUNT`. Neither may change
//! without the other.

use crate::fingerprint::{Fingerprint, FINGERPRINT_BITS};

/// Number of disjoint segments a fingerprint is split into.
pub const SEGMENT_COUNT: usize = 5;

/// Bit width of each segment, first to last. Fixed constants; the
/// concatenation of all widths covers the 64 bits exactly.
pub const SEGMENT_WIDTHS: [u32; SEGMENT_COUNT] = [13, 13, 13, 13, 12];

/// Maximum Hamming distance considered a near-duplicate.
pub const MATCH_THRESHOLD: u32 = 4;

/// The 5 segment values of a fingerprint, in partition order.
pub type SegmentKey = [u16; SEGMENT_COUNT];

// MATCH_THRESHOLD < SEGMENT_COUNT is what makes any-segment lookup lossless.
const _: () = assert!((MATCH_THRESHOLD as usize) < SEGMENT_COUNT);
const _: () = assert!(
    SEGMENT_WIDTHS[0] + SEGMENT_WIDTHS[1] + SEGMENT_WIDTHS[2] + SEGMENT_WIDTHS[3] + SEGMENT_WIDTHS[4]
        == FINGERPRINT_BITS
);

/// Split a fingerprint into its 5 segment values, MSB-first.
pub fn segments(fp: Fingerprint) -> SegmentKey {
    let bits = fp.bits();
    let mut out = [0u16; SEGMENT_COUNT];
    let mut shift = FINGERPRINT_BITS;
    for (value, width) in out.iter_mut().zip(SEGMENT_WIDTHS) {
        shift -= width;
        *value = ((bits >> shift) & ((1u64 << width) - 1)) as u16;
    }
    out
}

/// Reassemble a fingerprint from its segment values.
///
/// Exact inverse of [`segments`]: `from_segments(segments(fp)) == fp` for
/// every fingerprint.
pub fn from_segments(key: SegmentKey) -> Fingerprint {
    let mut bits = 0u64;
    for (value, width) in key.iter().zip(SEGMENT_WIDTHS) {
        bits = (bits << width) | u64::from(*value);
    }
    Fingerprint::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tiny deterministic generator so property checks need no RNG crate.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.0
        }
    }

    #[test]
    fn test_roundtrip_law() {
        for bits in [
            0u64,
            u64::MAX,
            0xDEAD_BEEF_CAFE_BABE,
            0x0123_4567_89AB_CDEF,
            1,
            1 << 63,
            0x5555_5555_5555_5555,
        ] {
            let fp = Fingerprint::from_bits(bits);
            assert_eq!(from_segments(segments(fp)), fp, "bits={bits:#018x}");
        }
    }

    #[test]
    fn test_roundtrip_law_random() {
        let mut rng = Lcg(0x9E37_79B9_7F4A_7C15);
        for _ in 0..10_000 {
            let fp = Fingerprint::from_bits(rng.next());
            assert_eq!(from_segments(segments(fp)), fp);
        }
    }

    #[test]
    fn test_segment_boundaries() {
        // Highest 13 bits land in the first segment, lowest 12 in the last.
        let top = Fingerprint::from_bits(0xFFF8_0000_0000_0000);
        assert_eq!(segments(top), [0x1FFF, 0, 0, 0, 0]);

        let bottom = Fingerprint::from_bits(0x0000_0000_0000_0FFF);
        assert_eq!(segments(bottom), [0, 0, 0, 0, 0x0FFF]);
    }

    fn shares_a_segment(a: Fingerprint, b: Fingerprint) -> bool {
        segments(a)
            .iter()
            .zip(segments(b))
            .any(|(sa, sb)| *sa == sb)
    }

    #[test]
    fn test_pigeonhole_random_pairs_within_threshold() {
        let mut rng = Lcg(42);
        for _ in 0..10_000 {
            let base = Fingerprint::from_bits(rng.next());
            let flips = (rng.next() % (u64::from(MATCH_THRESHOLD) + 1)) as usize;
            let mut mutated = base.bits();
            for _ in 0..flips {
                mutated ^= 1 << (rng.next() % 64);
            }
            let other = Fingerprint::from_bits(mutated);
            assert!(base.distance(other) <= MATCH_THRESHOLD);
            assert!(
                shares_a_segment(base, other),
                "distance {} pair lost recall: {base} vs {other}",
                base.distance(other)
            );
        }
    }

    #[test]
    fn test_pigeonhole_adversarial_distance_four() {
        // Four flips concentrated around the segment boundaries still leave
        // one untouched segment.
        let base = Fingerprint::from_bits(0xAAAA_AAAA_AAAA_AAAA);
        // Boundaries after bits 13, 26, 39, 52 (from the MSB); flip one bit
        // on each side of the first two boundaries.
        let flipped = base.bits() ^ (1 << 51) ^ (1 << 50) ^ (1 << 38) ^ (1 << 37);
        let other = Fingerprint::from_bits(flipped);
        assert_eq!(base.distance(other), 4);
        assert!(shares_a_segment(base, other));
    }

    #[test]
    fn test_pigeonhole_breaks_at_distance_five() {
        // One flip inside every segment: no shared segment remains. This is
        // exactly why the threshold is pinned below the segment count.
        let base = Fingerprint::from_bits(0);
        let flipped = (1u64 << 63) | (1 << 50) | (1 << 37) | (1 << 24) | (1 << 11);
        let other = Fingerprint::from_bits(flipped);
        assert_eq!(base.distance(other), 5);
        assert!(!shares_a_segment(base, other));
    }
}
