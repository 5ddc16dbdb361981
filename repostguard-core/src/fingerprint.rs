//! Perceptual fingerprinting for images.
//!
//! This module computes a 64-bit difference hash ("dHash") from an image's
//! downsampled luminance gradient. Two fingerprints whose Hamming distance is
//! small almost always come from the same picture re-encoded, re-compressed,
//! or lightly edited.
//!
//! # Algorithm
//!
//! The image is reduced to a 9-wide x 8-tall luminance grid (direct resize,
//! no aspect preservation). Each of the 8 rows contributes 8 bits: column `x`
//! is compared against its left neighbor, and the bit is 1 exactly when the
//! left neighbor is strictly darker. Bits are emitted row-major, left to
//! right, top to bottom, most significant bit first.
//!
//! The bit order is part of the fingerprint's definition: persisted hashes
//! from any prior deployment must compare bit-for-bit, so it is never
//! allowed to change.
//!
//! # Degenerate inputs
//!
//! A grid where every cell holds the same value (flat color, corrupt decode,
//! 1x1 thumbnails) carries no exploitable structure. `extract` returns
//! `None` for those; this is an expected outcome, not an error.

use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Fingerprint length in bits.
pub const FINGERPRINT_BITS: u32 = 64;

/// Width of the comparison grid. One extra column yields 8 comparisons per row.
pub const GRID_WIDTH: u32 = 9;

/// Height of the comparison grid.
pub const GRID_HEIGHT: u32 = 8;

/// A 64-bit perceptual fingerprint.
///
/// Bit 63 (the most significant bit) is the first comparison of the first
/// row; bit 0 is the last comparison of the last row. Fingerprints are only
/// ever compared by Hamming distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Wrap raw bits in fingerprint order (MSB = first comparison).
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// The raw bits, MSB-first.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Hamming distance to another fingerprint: the number of differing bit
    /// positions, in `0..=64`. Symmetric, and zero iff the fingerprints are
    /// bit-identical.
    pub const fn distance(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Fixed-width lowercase hex form, used as the persistence key.
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse the fixed-width hex form produced by [`Fingerprint::to_hex`].
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 16 {
            return None;
        }
        u64::from_str_radix(hex, 16).ok().map(Self)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Compute the difference hash of a grayscale image.
///
/// Pure, no side effects. Returns `None` when the downsampled grid is
/// uniform (see module docs) or the image is empty.
pub fn extract(image: &GrayImage) -> Option<Fingerprint> {
    if image.width() == 0 || image.height() == 0 {
        return None;
    }

    let grid = imageops::resize(image, GRID_WIDTH, GRID_HEIGHT, FilterType::Triangle);

    let first = grid.get_pixel(0, 0)[0];
    if grid.pixels().all(|p| p[0] == first) {
        return None;
    }

    let mut bits = 0u64;
    for y in 0..GRID_HEIGHT {
        for x in 1..GRID_WIDTH {
            bits <<= 1;
            if grid.get_pixel(x - 1, y)[0] < grid.get_pixel(x, y)[0] {
                bits |= 1;
            }
        }
    }

    Some(Fingerprint(bits))
}
