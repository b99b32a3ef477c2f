//! Feature-based recognition of known reference images in a live camera feed.
//!
//! Reference images are enrolled once into a [`TargetLibrary`] at several
//! scales and in-plane rotations. Each scanned frame then goes through
//! preprocess, keypoint detection, binary description, brute-force Hamming
//! matching against every enrolled variant and, for the winning variant, an
//! on-screen pose estimate (origin, scale and, with a camera, depth).
//!
//! ```no_run
//! use refmatch::{Engine, EngineParams, Frame, ReferenceImage};
//! use refmatch::core::RgbaImage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let poster = ReferenceImage::new("poster", RgbaImage::new(256, 256), 0.5);
//! let mut engine = Engine::new(EngineParams::default(), &[poster])?;
//!
//! let camera_frame = RgbaImage::new(640, 480);
//! if let Some(hit) = engine.on_frame(&Frame::new(camera_frame.view())).recognized() {
//!     println!("{hit}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The building blocks live in [`core`] (buffers, preprocessing, camera) and
//! [`features`] (keypoints and descriptors).

pub use refmatch_core as core;
pub use refmatch_features as features;

pub mod engine;
pub mod extract;
pub mod io;
pub mod library;
pub mod matcher;
pub mod pose;
pub mod reference;

#[cfg(feature = "image")]
pub mod detect;

pub use engine::{
    Engine, EngineError, EngineParams, Frame, RecognitionEvent, RecognitionHold,
    RecognitionObserver, ScanJob, ScanOutcome, ScanReply, ScanStats, ScanWorker, WorkerError,
};
pub use extract::{FeaturePipeline, FrameFeatures};
pub use library::{
    EnrollError, EnrolledTarget, EnrollmentParams, RotationSet, TargetKey, TargetLibrary,
};
pub use matcher::{Correspondence, MatchParams, MatchResult, Matcher};
pub use pose::{PoseEstimator, PoseParams, RecognizedTarget, ViewGeometry};
pub use reference::ReferenceImage;
