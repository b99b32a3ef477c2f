//! Adaptive-threshold keypoint detector: FAST candidates, Harris scoring,
//! non-maximum suppression and a final strength cap.

use log::debug;
use refmatch_core::GrayImageView;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::collector::CandidateBuffer;
use crate::fast::{detect_candidates, FastParams, CIRCLE_RADIUS};
use crate::harris::{harris_scores, HarrisParams};
use crate::keypoint::Keypoint;
use crate::nms::suppress;

/// Detector configuration. Thresholds are on the `[0, 1]` intensity scale.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorParams {
    /// First segment-test threshold tried.
    pub initial_threshold: f32,
    /// Lowest threshold the schedule may reach.
    pub min_threshold: f32,
    /// Decrement between attempts.
    pub threshold_step: f32,
    /// Candidate buffer capacity.
    pub max_candidates: usize,
    /// Final keypoint cap, also the candidate count the schedule aims for.
    pub max_keypoints: usize,
    /// Half-width of the suppression window.
    pub nms_radius: usize,
    pub fast: FastParams,
    pub harris: HarrisParams,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            initial_threshold: 0.4,
            min_threshold: 0.1,
            threshold_step: 0.05,
            max_candidates: 800,
            max_keypoints: 200,
            nms_radius: 3,
            fast: FastParams::default(),
            harris: HarrisParams::default(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectorParamsError {
    #[error("min_threshold must be positive and finite (got {0})")]
    InvalidMinThreshold(f32),
    #[error("initial_threshold {initial} is below min_threshold {min}")]
    InitialBelowMin { initial: f32, min: f32 },
    #[error("threshold_step must be positive and finite (got {0})")]
    InvalidStep(f32),
    #[error("arc_length must be in 9..=12 (got {0})")]
    InvalidArcLength(usize),
    #[error("edge must be at least {min} pixels (got {got})")]
    EdgeTooSmall { got: usize, min: usize },
    #[error("max_candidates and max_keypoints must be positive")]
    ZeroCapacity,
}

impl DetectorParams {
    pub fn validate(&self) -> Result<(), DetectorParamsError> {
        if !(self.min_threshold.is_finite() && self.min_threshold > 0.0) {
            return Err(DetectorParamsError::InvalidMinThreshold(self.min_threshold));
        }
        if !self.initial_threshold.is_finite() || self.initial_threshold < self.min_threshold {
            return Err(DetectorParamsError::InitialBelowMin {
                initial: self.initial_threshold,
                min: self.min_threshold,
            });
        }
        if !(self.threshold_step.is_finite() && self.threshold_step > 0.0) {
            return Err(DetectorParamsError::InvalidStep(self.threshold_step));
        }
        if !(9..=12).contains(&self.fast.arc_length) {
            return Err(DetectorParamsError::InvalidArcLength(self.fast.arc_length));
        }
        if self.fast.edge < CIRCLE_RADIUS {
            return Err(DetectorParamsError::EdgeTooSmall {
                got: self.fast.edge,
                min: CIRCLE_RADIUS,
            });
        }
        if self.max_candidates == 0 || self.max_keypoints == 0 {
            return Err(DetectorParamsError::ZeroCapacity);
        }
        Ok(())
    }

    /// Threshold schedule from `initial_threshold` down to `min_threshold`.
    ///
    /// Steps are computed from an integer index so the sequence does not
    /// accumulate rounding drift.
    pub fn threshold_schedule(&self) -> Vec<f32> {
        let span = self.initial_threshold - self.min_threshold;
        let steps = (span / self.threshold_step + 1e-4).floor() as usize;
        (0..=steps)
            .map(|i| self.initial_threshold - i as f32 * self.threshold_step)
            .collect()
    }
}

/// Keypoints of one image together with their cornerness.
#[derive(Clone, Debug, Default)]
pub struct Detection {
    /// Final keypoints, in raster order.
    pub keypoints: Vec<Keypoint>,
    /// Harris score of each keypoint.
    pub scores: Vec<f32>,
    /// Threshold the schedule stopped at.
    pub threshold: f32,
    /// Segment-test hits at that threshold, before truncation.
    pub raw_candidates: usize,
}

impl Detection {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Adaptive FAST + Harris + NMS detector.
#[derive(Clone, Debug)]
pub struct KeypointDetector {
    params: DetectorParams,
}

impl KeypointDetector {
    pub fn new(params: DetectorParams) -> Result<Self, DetectorParamsError> {
        params.validate()?;
        Ok(Self { params })
    }

    #[inline]
    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Detect with the configured caps.
    pub fn detect(&self, img: &GrayImageView<'_>) -> Detection {
        self.detect_with_caps(img, self.params.max_keypoints, self.params.max_candidates)
    }

    /// Detect keypoints, yielding at most `target_count` of them.
    ///
    /// The threshold is lowered step by step until the segment test produces
    /// at least `target_count` hits or the floor is reached. At the floor the
    /// detector proceeds with whatever it found, possibly nothing. Only the
    /// first `max_candidates` hits in raster order are scored.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, img), fields(width = img.width, height = img.height))
    )]
    pub fn detect_with_caps(
        &self,
        img: &GrayImageView<'_>,
        target_count: usize,
        max_candidates: usize,
    ) -> Detection {
        let schedule = self.params.threshold_schedule();
        let mut buffer = CandidateBuffer::with_capacity(max_candidates);
        let mut threshold = self.params.initial_threshold;

        for &t in &schedule {
            buffer.clear();
            threshold = t;
            detect_candidates(img, t, &self.params.fast, &mut buffer);
            if buffer.seen() >= target_count {
                break;
            }
        }

        let raw_candidates = buffer.seen();
        if buffer.is_truncated() {
            debug!(
                "candidate buffer full: kept {} of {} at threshold {:.3}",
                buffer.len(),
                raw_candidates,
                threshold
            );
        }
        let candidates = buffer.into_vec();
        if candidates.is_empty() || target_count == 0 {
            return Detection {
                keypoints: Vec::new(),
                scores: Vec::new(),
                threshold,
                raw_candidates,
            };
        }

        let scores = harris_scores(img, &candidates, &self.params.harris);
        let kept = suppress(
            &candidates,
            &scores,
            img.width,
            img.height,
            self.params.nms_radius,
        );

        let mut survivors: Vec<(Keypoint, f32)> =
            kept.into_iter().map(|i| (candidates[i], scores[i])).collect();
        if survivors.len() > target_count {
            survivors.sort_by(|a, b| {
                b.1.total_cmp(&a.1)
                    .then_with(|| a.0.raster_key().cmp(&b.0.raster_key()))
            });
            survivors.truncate(target_count);
            survivors.sort_by_key(|(kp, _)| kp.raster_key());
        }

        debug!(
            "detected {} keypoints from {} candidates (threshold {:.3})",
            survivors.len(),
            candidates.len(),
            threshold
        );

        let (keypoints, scores) = survivors.into_iter().unzip();
        Detection {
            keypoints,
            scores,
            threshold,
            raw_candidates,
        }
    }
}
