//! Perceptual hashing, symbol indices and matching

pub mod extractor;
pub mod index;
pub mod matcher;

pub use extractor::HashExtractor;
pub use index::{IndexError, IndexSet, LinearIndex, Neighbor};
pub use matcher::{DualHashMatcher, MatchOutcome, SingleHashMatcher};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hash family used to fingerprint a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashKind {
    /// Threshold against the mean of an N x N thumbnail.
    Average,
    /// Horizontal neighbour comparison on an (N+1) x N thumbnail.
    Difference,
    /// Vertical neighbour comparison on an N x (N+1) thumbnail.
    DifferenceVertical,
    /// Low-frequency DCT block thresholded against its median.
    Perceptual,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Average => "ahash",
            HashKind::Difference => "dhash",
            HashKind::DifferenceVertical => "vdhash",
            HashKind::Perceptual => "phash",
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-length boolean fingerprint, packed 64 bits per word.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureVector {
    words: Vec<u64>,
    len: usize,
}

impl FeatureVector {
    pub fn zeros(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn from_bits<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let mut words = Vec::new();
        let mut len = 0;
        for bit in bits {
            if len % 64 == 0 {
                words.push(0);
            }
            if bit {
                words[len / 64] |= 1u64 << (len % 64);
            }
            len += 1;
        }
        Self { words, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> bool {
        i < self.len && self.words[i / 64] & (1u64 << (i % 64)) != 0
    }

    pub fn set(&mut self, i: usize, value: bool) {
        if i >= self.len {
            return;
        }
        if value {
            self.words[i / 64] |= 1u64 << (i % 64);
        } else {
            self.words[i / 64] &= !(1u64 << (i % 64));
        }
    }

    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|i| self.get(i))
    }

    /// Hamming distance. Vectors of different length are a caller error;
    /// the extra bits of the longer one count as differing.
    pub fn distance(&self, other: &FeatureVector) -> u32 {
        debug_assert_eq!(self.len, other.len, "feature vector length mismatch");
        let shared: u32 = self
            .words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        shared + self.len.abs_diff(other.len) as u32
    }

    /// Hex encoding, bit 0 first, four bits per digit.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.len.div_ceil(4));
        for chunk in 0..self.len.div_ceil(4) {
            let mut nibble = 0u32;
            for j in 0..4 {
                if self.get(chunk * 4 + j) {
                    nibble |= 1 << (3 - j);
                }
            }
            out.push(std::char::from_digit(nibble, 16).unwrap_or('0'));
        }
        out
    }

    /// Parse a hex string produced by [`FeatureVector::to_hex`]; `len` is the
    /// number of meaningful bits.
    pub fn from_hex(hex: &str, len: usize) -> Option<Self> {
        if hex.len() != len.div_ceil(4) {
            return None;
        }
        let mut vector = Self::zeros(len);
        for (chunk, ch) in hex.chars().enumerate() {
            let nibble = ch.to_digit(16)?;
            for j in 0..4 {
                if nibble & (1 << (3 - j)) != 0 {
                    vector.set(chunk * 4 + j, true);
                }
            }
        }
        Some(vector)
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
