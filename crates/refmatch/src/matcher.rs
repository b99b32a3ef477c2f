//! Brute-force Hamming matching of a frame against the whole catalog.

use std::sync::Arc;

use log::debug;
use refmatch_features::{hamming, DescriptorSet};
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::library::{EnrolledTarget, TargetLibrary};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchParams {
    /// A target needs strictly more correspondences than this.
    pub min_match_count: usize,
    /// A target needs a match rate strictly above this.
    pub min_match_rate: f32,
    /// Skip targets whose every descriptor matched (rate == 1).
    pub reject_perfect_matches: bool,
    /// Reject correspondences farther apart than this many bits.
    pub max_hamming: Option<u32>,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            min_match_count: 3,
            min_match_rate: 1e-4,
            reject_perfect_matches: false,
            max_hamming: None,
        }
    }
}

/// Target descriptor `target_index` paired with frame descriptor `frame_index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correspondence {
    pub target_index: usize,
    pub frame_index: usize,
    pub distance: u32,
}

#[derive(Clone, Debug)]
pub struct MatchResult {
    pub target: Arc<EnrolledTarget>,
    pub match_count: usize,
    pub target_total_count: usize,
    pub correspondences: Vec<Correspondence>,
}

impl MatchResult {
    #[inline]
    pub fn match_rate(&self) -> f32 {
        if self.target_total_count == 0 {
            0.0
        } else {
            self.match_count as f32 / self.target_total_count as f32
        }
    }
}

/// Mutual-best correspondences between two descriptor sets.
///
/// Target descriptor `t` pairs with its nearest frame descriptor `f` only
/// when `t` is also the nearest target descriptor to `f`. Ties go to the
/// lower index on both sides, so each frame descriptor is used at most once
/// and the result never exceeds `min(target.len(), frame.len())`.
/// Output is ordered by target index.
pub fn mutual_best(
    target: &DescriptorSet,
    frame: &DescriptorSet,
    max_hamming: Option<u32>,
) -> Vec<Correspondence> {
    let nt = target.len();
    let nf = frame.len();
    if nt == 0 || nf == 0 {
        return Vec::new();
    }

    let mut row_best = vec![(u32::MAX, 0usize); nt];
    let mut col_best = vec![(u32::MAX, 0usize); nf];
    for (t, td) in target.iter().enumerate() {
        for (f, fd) in frame.iter().enumerate() {
            let d = hamming(td, fd);
            if d < row_best[t].0 {
                row_best[t] = (d, f);
            }
            if d < col_best[f].0 {
                col_best[f] = (d, t);
            }
        }
    }

    row_best
        .iter()
        .enumerate()
        .filter(|&(t, &(d, f))| col_best[f].1 == t && max_hamming.is_none_or(|m| d <= m))
        .map(|(t, &(d, f))| Correspondence {
            target_index: t,
            frame_index: f,
            distance: d,
        })
        .collect()
}

#[derive(Clone, Debug, Default)]
pub struct Matcher {
    params: MatchParams,
}

impl Matcher {
    pub fn new(params: MatchParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &MatchParams {
        &self.params
    }

    fn accepts(&self, count: usize, rate: f32) -> bool {
        if count <= self.params.min_match_count || rate <= self.params.min_match_rate {
            return false;
        }
        !(self.params.reject_perfect_matches && rate >= 1.0)
    }

    /// Match against every target and keep the best-rate one that clears
    /// the floors. Equal rates resolve to the earlier catalog entry.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(frame = frame.len(), targets = library.len()))
    )]
    pub fn match_frame(
        &self,
        frame: &DescriptorSet,
        library: &TargetLibrary,
    ) -> Option<MatchResult> {
        if frame.is_empty() {
            return None;
        }
        let max_hamming = self.params.max_hamming;
        let run = |target: &Arc<EnrolledTarget>| -> Vec<Correspondence> {
            mutual_best(&target.descriptors, frame, max_hamming)
        };

        #[cfg(feature = "rayon")]
        let all: Vec<Vec<Correspondence>> = library.targets().par_iter().map(run).collect();
        #[cfg(not(feature = "rayon"))]
        let all: Vec<Vec<Correspondence>> = library.targets().iter().map(run).collect();

        let mut best: Option<(usize, f32)> = None;
        for (i, (target, corr)) in library.targets().iter().zip(&all).enumerate() {
            let total = target.total_count();
            if total == 0 {
                continue;
            }
            let rate = corr.len() as f32 / total as f32;
            if !self.accepts(corr.len(), rate) {
                continue;
            }
            if best.is_none_or(|(_, r)| rate > r) {
                best = Some((i, rate));
            }
        }

        let (i, rate) = best?;
        let target = Arc::clone(&library.targets()[i]);
        let correspondences = all.into_iter().nth(i).unwrap_or_default();
        debug!(
            "best target '{}' (scale {}, rotation {}): {}/{} matches ({:.3})",
            target.name,
            target.key.scale_power,
            target.key.rotation_degrees,
            correspondences.len(),
            target.total_count(),
            rate
        );
        Some(MatchResult {
            match_count: correspondences.len(),
            target_total_count: target.total_count(),
            target,
            correspondences,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[u64]) -> DescriptorSet {
        DescriptorSet::from_words(64, words.to_vec()).unwrap()
    }

    #[test]
    fn identical_sets_match_fully() {
        let a = set(&[0b0001, 0b0110, 0xff00]);
        let c = mutual_best(&a, &a, None);
        assert_eq!(c.len(), 3);
        assert!(c.iter().all(|c| c.target_index == c.frame_index && c.distance == 0));
    }

    #[test]
    fn many_to_one_collisions_are_deduplicated() {
        // both target descriptors are nearest to frame descriptor 0
        let target = set(&[0b1111, 0b0111]);
        let frame = set(&[0b1111, u64::MAX]);
        let c = mutual_best(&target, &frame, None);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].target_index, 0);
        assert_eq!(c[0].frame_index, 0);
    }

    #[test]
    fn count_never_exceeds_smaller_side() {
        let target = set(&[1, 2, 4, 8, 16, 32]);
        let frame = set(&[1, 2]);
        let c = mutual_best(&target, &frame, None);
        assert!(c.len() <= 2);
    }

    #[test]
    fn hamming_bound_filters_pairs() {
        let target = set(&[0]);
        let frame = set(&[0b111]);
        assert_eq!(mutual_best(&target, &frame, Some(2)).len(), 0);
        assert_eq!(mutual_best(&target, &frame, Some(3)).len(), 1);
    }

    fn checker_library() -> TargetLibrary {
        use crate::extract::FeaturePipeline;
        use crate::library::EnrollmentParams;
        use crate::reference::ReferenceImage;
        use refmatch_core::RgbaImage;

        let mut img = RgbaImage::filled(64, 64, [0, 0, 0, 255]);
        for y in 4..60 {
            for x in 4..60 {
                if ((x / 8) + (y / 8)) % 2 == 0 {
                    img.put_pixel(x, y, [255, 255, 255, 255]);
                }
            }
        }
        let pipeline = FeaturePipeline::new(
            refmatch_core::PreprocessParams::default(),
            refmatch_features::DetectorParams::default(),
            &refmatch_features::DescriptorParams::default(),
        )
        .unwrap();
        let refs = [ReferenceImage::new("checker", img, 0.25)];
        TargetLibrary::enroll(&refs, &EnrollmentParams::single(), &pipeline).unwrap()
    }

    #[test]
    fn empty_frame_matches_nothing() {
        let lib = checker_library();
        let num_bits = lib.targets()[0].descriptors.num_bits();
        let m = Matcher::new(MatchParams {
            min_match_count: 0,
            min_match_rate: 0.0,
            ..MatchParams::default()
        });
        assert!(m.match_frame(&DescriptorSet::empty(num_bits), &lib).is_none());
    }

    #[test]
    fn match_count_is_bounded_by_both_sides() {
        let lib = checker_library();
        let target = &lib.targets()[0];
        let total = target.total_count();
        assert!(total > 4, "checker enrolled only {total} keypoints");
        let num_bits = target.descriptors.num_bits();
        // repeated checker corners share descriptors, so accept any pair
        let m = Matcher::new(MatchParams {
            min_match_count: 0,
            min_match_rate: 0.0,
            ..MatchParams::default()
        });

        // a frame holding a subset of the target's descriptors
        let words: Vec<u64> = (0..4)
            .flat_map(|i| target.descriptors.descriptor(i).to_vec())
            .collect();
        let frame = DescriptorSet::from_words(num_bits, words).unwrap();
        let r = m.match_frame(&frame, &lib).unwrap();
        assert!(r.match_count <= frame.len());
        assert_eq!(r.match_count, r.correspondences.len());
        assert_eq!(r.target_total_count, total);

        // every target descriptor twice over
        let words: Vec<u64> = target
            .descriptors
            .iter()
            .chain(target.descriptors.iter())
            .flat_map(|d| d.to_vec())
            .collect();
        let frame = DescriptorSet::from_words(num_bits, words).unwrap();
        let r = m.match_frame(&frame, &lib).unwrap();
        assert!(r.match_count <= total);
        assert!(r.match_count <= frame.len());
        let mut frame_side: Vec<usize> =
            r.correspondences.iter().map(|c| c.frame_index).collect();
        frame_side.sort_unstable();
        frame_side.dedup();
        assert_eq!(frame_side.len(), r.match_count);
    }

    #[test]
    fn acceptance_floors() {
        let m = Matcher::new(MatchParams::default());
        assert!(!m.accepts(3, 0.5));
        assert!(m.accepts(4, 0.5));
        assert!(m.accepts(4, 1.0));

        let strict = Matcher::new(MatchParams {
            reject_perfect_matches: true,
            ..MatchParams::default()
        });
        assert!(!strict.accepts(10, 1.0));
        assert!(strict.accepts(10, 0.99));
    }
}
