use refmatch_core::PreprocessParams;
use refmatch_features::{DescriptorParams, DetectorParams};
use serde::{Deserialize, Serialize};

use super::EngineError;
use crate::library::EnrollmentParams;
use crate::matcher::MatchParams;
use crate::pose::PoseParams;

/// Full engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineParams {
    pub preprocess: PreprocessParams,
    pub detector: DetectorParams,
    pub descriptor: DescriptorParams,
    pub enrollment: EnrollmentParams,
    pub matching: MatchParams,
    pub pose: PoseParams,
    /// Frames between scan attempts; `1` scans every frame.
    pub scan_interval: u32,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            preprocess: PreprocessParams::default(),
            detector: DetectorParams::default(),
            descriptor: DescriptorParams::default(),
            enrollment: EnrollmentParams::default(),
            matching: MatchParams::default(),
            pose: PoseParams::default(),
            scan_interval: 5,
        }
    }
}

impl EngineParams {
    /// Check everything that does not need reference images.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.scan_interval == 0 {
            return Err(EngineError::InvalidScanInterval);
        }
        if !(self.pose.max_depth.is_finite() && self.pose.max_depth > 0.0) {
            return Err(EngineError::InvalidMaxDepth(self.pose.max_depth));
        }
        self.detector.validate()?;
        self.enrollment.scale_powers()?;
        self.enrollment.rotations.degrees()?;
        Ok(())
    }
}
