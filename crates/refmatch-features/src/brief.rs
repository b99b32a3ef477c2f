//! BRIEF-style binary descriptors.
//!
//! A descriptor is one bit per sampled pixel pair: bit `i` is set when the
//! first sample of pair `i` is brighter than the second. The pair table is
//! generated once from a seed and must be shared by enrollment and live
//! extraction; descriptors built from different tables are not comparable.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use refmatch_core::GrayImageView;
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::keypoint::Keypoint;

/// Seed used when the configuration does not provide one.
pub const DEFAULT_SAMPLE_SEED: u64 = 0x00b1_13f5_eed0_0128;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DescriptorParams {
    /// Number of pair tests, i.e. descriptor length in bits.
    pub num_tests: usize,
    /// Side of the square sampling patch. Offsets fall in `[-patch/2, patch/2]`.
    pub patch_size: usize,
    /// Seed of the pair table.
    pub seed: u64,
}

impl Default for DescriptorParams {
    fn default() -> Self {
        Self {
            num_tests: 128,
            patch_size: 31,
            seed: DEFAULT_SAMPLE_SEED,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor needs at least one test")]
    NoTests,
    #[error("patch_size must be at least 3 (got {0})")]
    PatchTooSmall(usize),
    #[error("{len} words do not split into rows of {row}")]
    RaggedWords { len: usize, row: usize },
}

/// One intensity comparison: `(x + dx1, y + dy1)` against `(x + dx2, y + dy2)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplePair {
    pub dx1: i32,
    pub dy1: i32,
    pub dx2: i32,
    pub dy2: i32,
}

/// Fixed table of sample pairs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleOffsets {
    pairs: Vec<SamplePair>,
    patch_size: usize,
}

impl SampleOffsets {
    /// Draw the pair table uniformly inside the patch from a seeded ChaCha
    /// stream. The same parameters always give the same table.
    pub fn generate(params: &DescriptorParams) -> Result<Self, DescriptorError> {
        if params.num_tests == 0 {
            return Err(DescriptorError::NoTests);
        }
        if params.patch_size < 3 {
            return Err(DescriptorError::PatchTooSmall(params.patch_size));
        }
        let r = (params.patch_size / 2) as i32;
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let pairs = (0..params.num_tests)
            .map(|_| SamplePair {
                dx1: rng.random_range(-r..=r),
                dy1: rng.random_range(-r..=r),
                dx2: rng.random_range(-r..=r),
                dy2: rng.random_range(-r..=r),
            })
            .collect();
        Ok(Self {
            pairs,
            patch_size: params.patch_size,
        })
    }

    pub fn from_pairs(
        pairs: Vec<SamplePair>,
        patch_size: usize,
    ) -> Result<Self, DescriptorError> {
        if pairs.is_empty() {
            return Err(DescriptorError::NoTests);
        }
        Ok(Self { pairs, patch_size })
    }

    #[inline]
    pub fn pairs(&self) -> &[SamplePair] {
        &self.pairs
    }

    #[inline]
    pub fn num_bits(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn words_per_descriptor(&self) -> usize {
        self.pairs.len().div_ceil(64)
    }

    pub fn patch_size(&self) -> usize {
        self.patch_size
    }
}

/// Hamming distance between two packed descriptors.
#[inline]
pub fn hamming(a: &[u64], b: &[u64]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Packed descriptors, one fixed-width row per keypoint.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DescriptorSet {
    num_bits: usize,
    words_per_descriptor: usize,
    words: Vec<u64>,
}

impl DescriptorSet {
    pub fn empty(num_bits: usize) -> Self {
        Self {
            num_bits,
            words_per_descriptor: num_bits.div_ceil(64),
            words: Vec::new(),
        }
    }

    /// Wrap packed words; `words.len()` must be a multiple of the row width.
    pub fn from_words(num_bits: usize, words: Vec<u64>) -> Result<Self, DescriptorError> {
        let words_per_descriptor = num_bits.div_ceil(64);
        if words_per_descriptor == 0 {
            return Err(DescriptorError::NoTests);
        }
        if words.len() % words_per_descriptor != 0 {
            return Err(DescriptorError::RaggedWords {
                len: words.len(),
                row: words_per_descriptor,
            });
        }
        Ok(Self {
            num_bits,
            words_per_descriptor,
            words,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.words_per_descriptor == 0 {
            0
        } else {
            self.words.len() / self.words_per_descriptor
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[inline]
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    #[inline]
    pub fn descriptor(&self, i: usize) -> &[u64] {
        let w = self.words_per_descriptor;
        &self.words[i * w..(i + 1) * w]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u64]> + '_ {
        self.words.chunks_exact(self.words_per_descriptor.max(1))
    }

    /// Value of bit `bit` of descriptor `i`.
    pub fn bit(&self, i: usize, bit: usize) -> bool {
        (self.descriptor(i)[bit / 64] >> (bit % 64)) & 1 == 1
    }
}

/// Computes descriptors against a shared pair table.
#[derive(Clone, Debug)]
pub struct DescriptorExtractor {
    offsets: Arc<SampleOffsets>,
}

impl DescriptorExtractor {
    pub fn new(offsets: Arc<SampleOffsets>) -> Self {
        Self { offsets }
    }

    pub fn from_params(params: &DescriptorParams) -> Result<Self, DescriptorError> {
        Ok(Self::new(Arc::new(SampleOffsets::generate(params)?)))
    }

    #[inline]
    pub fn offsets(&self) -> &Arc<SampleOffsets> {
        &self.offsets
    }

    fn describe_one(&self, img: &GrayImageView<'_>, kp: Keypoint) -> Vec<u64> {
        let mut words = vec![0u64; self.offsets.words_per_descriptor()];
        for (i, p) in self.offsets.pairs().iter().enumerate() {
            let a = img.get_clamped(kp.x + p.dx1, kp.y + p.dy1);
            let b = img.get_clamped(kp.x + p.dx2, kp.y + p.dy2);
            if a > b {
                words[i / 64] |= 1u64 << (i % 64);
            }
        }
        words
    }

    /// One descriptor per keypoint, in keypoint order.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, img, keypoints), fields(n = keypoints.len()))
    )]
    pub fn describe(&self, img: &GrayImageView<'_>, keypoints: &[Keypoint]) -> DescriptorSet {
        #[cfg(feature = "rayon")]
        let rows: Vec<Vec<u64>> = keypoints
            .par_iter()
            .map(|&kp| self.describe_one(img, kp))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let rows: Vec<Vec<u64>> = keypoints
            .iter()
            .map(|&kp| self.describe_one(img, kp))
            .collect();

        DescriptorSet {
            num_bits: self.offsets.num_bits(),
            words_per_descriptor: self.offsets.words_per_descriptor(),
            words: rows.concat(),
        }
    }
}
