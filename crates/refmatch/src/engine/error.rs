use refmatch_core::{ImageError, PreprocessError};
use refmatch_features::{DescriptorError, DetectorParamsError};

use crate::library::EnrollError;

/// Errors raised while building an engine. Per-frame failures are not errors.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Detector(#[from] DetectorParamsError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("scan_interval must be at least 1 frame")]
    InvalidScanInterval,
    #[error("max_depth must be positive (got {0})")]
    InvalidMaxDepth(f64),
    #[error("library was enrolled with a different descriptor sample table")]
    SampleTableMismatch,
}
