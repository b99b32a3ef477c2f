use std::sync::Arc;

use log::{debug, info, warn};
use refmatch_core::{CameraRays, RgbaImageView};
use refmatch_features::SampleOffsets;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{EngineError, EngineParams, RecognitionObserver};
use crate::extract::{FeaturePipeline, FrameFeatures};
use crate::library::TargetLibrary;
use crate::matcher::Matcher;
use crate::pose::{PoseEstimator, RecognizedTarget, ViewGeometry};
use crate::reference::ReferenceImage;

/// One captured frame at camera resolution.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    pub image: RgbaImageView<'a>,
    /// Ray caster for depth; `None` skips depth recovery.
    pub camera: Option<&'a dyn CameraRays>,
}

impl<'a> Frame<'a> {
    pub fn new(image: RgbaImageView<'a>) -> Self {
        Self {
            image,
            camera: None,
        }
    }

    pub fn with_camera(mut self, camera: &'a dyn CameraRays) -> Self {
        self.camera = Some(camera);
        self
    }
}

/// Result of handing a frame to the engine.
#[derive(Clone, Debug)]
pub enum ScanOutcome {
    /// Not a scan frame; no work was done.
    Skipped,
    /// A scan ran and recognized nothing.
    Empty,
    Recognized(RecognizedTarget),
}

impl ScanOutcome {
    pub fn recognized(&self) -> Option<&RecognizedTarget> {
        match self {
            Self::Recognized(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_recognized(self) -> Option<RecognizedTarget> {
        match self {
            Self::Recognized(r) => Some(r),
            _ => None,
        }
    }

    pub fn was_scanned(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub frames: u64,
    pub scans: u64,
    pub recognitions: u64,
}

/// Enrolled catalog plus the per-frame recognition pipeline.
pub struct Engine {
    params: EngineParams,
    pipeline: FeaturePipeline,
    library: Arc<TargetLibrary>,
    matcher: Matcher,
    pose: PoseEstimator,
    observers: Vec<Box<dyn RecognitionObserver>>,
    frames_until_scan: u32,
    stats: ScanStats,
}

impl Engine {
    /// Validate `params`, enroll `references` and build the engine.
    pub fn new(params: EngineParams, references: &[ReferenceImage]) -> Result<Self, EngineError> {
        params.validate()?;
        let pipeline = FeaturePipeline::new(
            params.preprocess.clone(),
            params.detector.clone(),
            &params.descriptor,
        )?;
        let library = TargetLibrary::enroll(
            references,
            &params.enrollment,
            &pipeline.for_enrollment()?,
        )?;
        info!("engine ready: {} enrolled targets", library.len());
        Ok(Self::assemble(params, pipeline, Arc::new(library)))
    }

    /// Build an engine around an already enrolled catalog.
    ///
    /// The catalog's sample table is reused; `params.descriptor` must
    /// describe the same table.
    pub fn with_library(
        params: EngineParams,
        library: Arc<TargetLibrary>,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        let expected = SampleOffsets::generate(&params.descriptor)?;
        if &expected != library.offsets().as_ref() {
            return Err(EngineError::SampleTableMismatch);
        }
        let pipeline = FeaturePipeline::with_offsets(
            params.preprocess.clone(),
            params.detector.clone(),
            Arc::clone(library.offsets()),
        )?;
        Ok(Self::assemble(params, pipeline, library))
    }

    fn assemble(
        params: EngineParams,
        pipeline: FeaturePipeline,
        library: Arc<TargetLibrary>,
    ) -> Self {
        Self {
            matcher: Matcher::new(params.matching.clone()),
            pose: PoseEstimator::new(params.pose.clone()),
            params,
            pipeline,
            library,
            observers: Vec::new(),
            frames_until_scan: 0,
            stats: ScanStats::default(),
        }
    }

    #[inline]
    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    #[inline]
    pub fn library(&self) -> &Arc<TargetLibrary> {
        &self.library
    }

    #[inline]
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn subscribe(&mut self, observer: Box<dyn RecognitionObserver>) {
        self.observers.push(observer);
    }

    /// Feature extraction for a single frame, as the engine sees it.
    pub fn extract(&self, image: &RgbaImageView<'_>) -> FrameFeatures {
        self.pipeline.extract(image)
    }

    /// Run the full pipeline on `frame` without touching counters or
    /// observers. A view whose buffer does not match its dimensions yields
    /// `None`.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip_all,
            fields(width = frame.image.width, height = frame.image.height)
        )
    )]
    pub fn recognize(&self, frame: &Frame<'_>) -> Option<RecognizedTarget> {
        let image = &frame.image;
        if let Err(e) = RgbaImageView::new(image.width, image.height, image.data) {
            warn!("rejecting frame: {e}");
            return None;
        }
        let features = self.pipeline.extract(&frame.image);
        if features.is_empty() {
            debug!("no keypoints in frame");
            return None;
        }
        let matched = self.matcher.match_frame(&features.descriptors, &self.library)?;
        let view = ViewGeometry::new(
            features.gray.width,
            features.gray.height,
            self.pipeline.view_scale(),
        );
        self.pose
            .estimate(&matched, &features.keypoints, view, frame.camera)
    }

    /// Scan now, regardless of the interval, and notify observers.
    pub fn scan(&mut self, frame: &Frame<'_>) -> ScanOutcome {
        self.stats.scans += 1;
        match self.recognize(frame) {
            Some(r) => {
                self.stats.recognitions += 1;
                for o in &mut self.observers {
                    o.on_recognized(&r);
                }
                ScanOutcome::Recognized(r)
            }
            None => {
                for o in &mut self.observers {
                    o.on_empty();
                }
                ScanOutcome::Empty
            }
        }
    }

    /// Per-frame entry point: scans the first frame and then every
    /// `scan_interval`-th frame; all other frames are skipped untouched.
    pub fn on_frame(&mut self, frame: &Frame<'_>) -> ScanOutcome {
        let index = self.stats.frames;
        self.stats.frames += 1;
        for o in &mut self.observers {
            o.on_frame(index);
        }
        if self.frames_until_scan > 0 {
            self.frames_until_scan -= 1;
            return ScanOutcome::Skipped;
        }
        self.frames_until_scan = self.params.scan_interval.saturating_sub(1);
        self.scan(frame)
    }
}
