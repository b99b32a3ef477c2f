//! Keypoints and binary descriptors for reference-image recognition.
//!
//! - [`KeypointDetector`]: adaptive FAST segment test, Harris scoring and
//!   non-maximum suppression on a normalized intensity field.
//! - [`DescriptorExtractor`]: BRIEF-style pair tests against a shared,
//!   seeded [`SampleOffsets`] table.
//!
//! Parallel stages use `rayon` when the `rayon` feature is enabled (default).

mod brief;
mod collector;
mod detector;
mod fast;
mod harris;
mod keypoint;
mod nms;

pub use brief::{
    hamming, DescriptorError, DescriptorExtractor, DescriptorParams, DescriptorSet, SampleOffsets,
    SamplePair, DEFAULT_SAMPLE_SEED,
};
pub use collector::CandidateBuffer;
pub use detector::{Detection, DetectorParams, DetectorParamsError, KeypointDetector};
pub use fast::{detect_candidates, segment_test, FastParams, CIRCLE_OFFSETS, CIRCLE_RADIUS};
pub use harris::{harris_score, harris_scores, HarrisParams};
pub use keypoint::Keypoint;
pub use nms::suppress;
