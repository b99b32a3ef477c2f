//! Shared preprocess -> detect -> describe chain.
//!
//! Enrollment and live frames must run the same chain with the same sample
//! table, so both go through [`FeaturePipeline`].

use std::sync::Arc;

use refmatch_core::{GrayImage, PreprocessParams, Preprocessor, RgbaImageView};
use refmatch_features::{
    DescriptorExtractor, DescriptorParams, DescriptorSet, DetectorParams, Keypoint,
    KeypointDetector, SampleOffsets,
};

use crate::engine::EngineError;

/// Keypoints and descriptors of one image.
#[derive(Clone, Debug)]
pub struct FrameFeatures {
    /// Working-resolution intensity field the features were computed on.
    pub gray: GrayImage,
    pub keypoints: Vec<Keypoint>,
    pub scores: Vec<f32>,
    pub descriptors: DescriptorSet,
}

impl FrameFeatures {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct FeaturePipeline {
    preprocessor: Preprocessor,
    detector: KeypointDetector,
    extractor: DescriptorExtractor,
}

impl FeaturePipeline {
    pub fn new(
        preprocess: PreprocessParams,
        detector: DetectorParams,
        descriptor: &DescriptorParams,
    ) -> Result<Self, EngineError> {
        let offsets = Arc::new(SampleOffsets::generate(descriptor)?);
        Self::with_offsets(preprocess, detector, offsets)
    }

    /// Build a pipeline around an existing sample table.
    pub fn with_offsets(
        preprocess: PreprocessParams,
        detector: DetectorParams,
        offsets: Arc<SampleOffsets>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            preprocessor: Preprocessor::new(preprocess)?,
            detector: KeypointDetector::new(detector)?,
            extractor: DescriptorExtractor::new(offsets),
        })
    }

    /// Same chain without camera-to-working downscaling, for reference rasters.
    pub fn for_enrollment(&self) -> Result<Self, EngineError> {
        Self::with_offsets(
            self.preprocessor.params().without_downscale(),
            self.detector.params().clone(),
            Arc::clone(self.extractor.offsets()),
        )
    }

    #[inline]
    pub fn offsets(&self) -> &Arc<SampleOffsets> {
        self.extractor.offsets()
    }

    #[inline]
    pub fn view_scale(&self) -> usize {
        self.preprocessor.params().view_scale
    }

    pub fn extract(&self, image: &RgbaImageView<'_>) -> FrameFeatures {
        let gray = self.preprocessor.run(image);
        let detection = self.detector.detect(&gray.view());
        let descriptors = self.extractor.describe(&gray.view(), &detection.keypoints);
        FrameFeatures {
            gray,
            keypoints: detection.keypoints,
            scores: detection.scores,
            descriptors,
        }
    }
}
