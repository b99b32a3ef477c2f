//! Enrollment: the immutable catalog of reference variants.
//!
//! Every reference image is rasterized at each configured scale power and
//! rotation, run through the shared feature pipeline, and stored as an
//! [`EnrolledTarget`]. The catalog is built once and only read afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{info, warn};
use refmatch_core::{resize_rgba, rotate_rgba, RgbaImage};
use refmatch_features::{DescriptorSet, Keypoint, SampleOffsets};
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::extract::FeaturePipeline;
use crate::reference::ReferenceImage;

/// Discrete rotation set near the axis-aligned orientations.
pub const AXIS_ROTATION_SET: [i32; 12] = [350, 0, 10, 80, 90, 100, 170, 180, 190, 260, 270, 280];

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EnrollError {
    #[error("no reference images supplied")]
    NoReferenceImages,
    #[error("reference image '{name}' has no texture data")]
    MissingTextureData { name: String },
    #[error("reference image '{name}' has invalid physical width {width_m} m")]
    InvalidPhysicalWidth { name: String, width_m: f64 },
    #[error("num_scales must be at least 1")]
    NoScales,
    #[error("scale power {scale_power} rasterizes '{name}' to an empty image")]
    EmptyRaster { name: String, scale_power: i32 },
    #[error("rotation set is empty")]
    NoRotations,
    #[error("rotation step must be in 1..=180 degrees (got {0})")]
    InvalidRotationStep(u32),
    #[error("rotation {0} degrees appears more than once")]
    DuplicateRotation(i32),
    #[error("no enrolled target produced any keypoints")]
    ZeroTargets,
}

/// Rotations to enroll, in degrees.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RotationSet {
    /// Exactly these rotations.
    Explicit(Vec<i32>),
    /// `0, step, 2 * step, ...` below 360.
    Step(u32),
}

impl RotationSet {
    pub fn axis_aligned() -> Self {
        Self::Explicit(AXIS_ROTATION_SET.to_vec())
    }

    /// Resolve to a validated list of distinct rotations.
    pub fn degrees(&self) -> Result<Vec<i32>, EnrollError> {
        let list: Vec<i32> = match self {
            Self::Explicit(v) => v.clone(),
            Self::Step(step) => {
                if !(1..=180).contains(step) {
                    return Err(EnrollError::InvalidRotationStep(*step));
                }
                (0..360 / step).map(|i| (i * step) as i32).collect()
            }
        };
        if list.is_empty() {
            return Err(EnrollError::NoRotations);
        }
        let mut seen = HashSet::new();
        for &r in &list {
            if !seen.insert(r.rem_euclid(360)) {
                return Err(EnrollError::DuplicateRotation(r));
            }
        }
        Ok(list)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnrollmentParams {
    /// Number of scale powers to enroll.
    pub num_scales: usize,
    /// Largest scale power; powers run `max, max - 1, ...`.
    pub max_scale_power: i32,
    pub rotations: RotationSet,
}

impl Default for EnrollmentParams {
    fn default() -> Self {
        Self {
            num_scales: 5,
            max_scale_power: 0,
            rotations: RotationSet::Step(5),
        }
    }
}

impl EnrollmentParams {
    /// Single variant: native scale, no rotation.
    pub fn single() -> Self {
        Self {
            num_scales: 1,
            max_scale_power: 0,
            rotations: RotationSet::Explicit(vec![0]),
        }
    }

    pub fn scale_powers(&self) -> Result<Vec<i32>, EnrollError> {
        if self.num_scales == 0 {
            return Err(EnrollError::NoScales);
        }
        Ok((0..self.num_scales)
            .map(|j| self.max_scale_power - j as i32)
            .collect())
    }
}

/// Identity of one catalog entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey {
    pub image_id: usize,
    pub scale_power: i32,
    pub rotation_degrees: i32,
}

/// Raster size of a reference at `scale_power`.
pub fn raster_size(width: usize, height: usize, scale_power: i32) -> (usize, usize) {
    let f = 2f64.powi(scale_power);
    (
        (width as f64 * f).floor() as usize,
        (height as f64 * f).floor() as usize,
    )
}

/// One (image, scale, rotation) variant with its features.
#[derive(Clone, Debug)]
pub struct EnrolledTarget {
    pub key: TargetKey,
    pub name: String,
    /// Native reference size in pixels.
    pub reference_width: usize,
    pub reference_height: usize,
    pub physical_width_m: f64,
    /// Size of the enrolled raster.
    pub raster_width: usize,
    pub raster_height: usize,
    pub keypoints: Vec<Keypoint>,
    pub descriptors: DescriptorSet,
}

impl EnrolledTarget {
    #[inline]
    pub fn total_count(&self) -> usize {
        self.keypoints.len()
    }

    /// `2^scale_power`.
    #[inline]
    pub fn scale_factor(&self) -> f64 {
        2f64.powi(self.key.scale_power)
    }
}

/// Read-only catalog of enrolled targets, in `(image, scale, rotation)` order.
#[derive(Clone, Debug)]
pub struct TargetLibrary {
    targets: Vec<Arc<EnrolledTarget>>,
    index: HashMap<TargetKey, usize>,
    offsets: Arc<SampleOffsets>,
}

struct Job<'a> {
    key: TargetKey,
    reference: &'a ReferenceImage,
    raster: &'a RgbaImage,
}

impl TargetLibrary {
    /// Enroll every reference at every scale power and rotation.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(references = references.len()))
    )]
    pub fn enroll(
        references: &[ReferenceImage],
        params: &EnrollmentParams,
        pipeline: &FeaturePipeline,
    ) -> Result<Self, EnrollError> {
        if references.is_empty() {
            return Err(EnrollError::NoReferenceImages);
        }
        let powers = params.scale_powers()?;
        let rotations = params.rotations.degrees()?;

        // rasterize each (image, scale) once; rotations reuse it
        let mut rasters: Vec<(usize, i32, RgbaImage)> = Vec::new();
        for (image_id, reference) in references.iter().enumerate() {
            if reference.is_missing_texture() {
                return Err(EnrollError::MissingTextureData {
                    name: reference.name.clone(),
                });
            }
            if !(reference.physical_width_m.is_finite() && reference.physical_width_m > 0.0) {
                return Err(EnrollError::InvalidPhysicalWidth {
                    name: reference.name.clone(),
                    width_m: reference.physical_width_m,
                });
            }
            for &p in &powers {
                let (w, h) = raster_size(reference.width(), reference.height(), p);
                if w == 0 || h == 0 {
                    return Err(EnrollError::EmptyRaster {
                        name: reference.name.clone(),
                        scale_power: p,
                    });
                }
                rasters.push((image_id, p, resize_rgba(&reference.image.view(), w, h)));
            }
        }

        let jobs: Vec<Job<'_>> = rasters
            .iter()
            .flat_map(|(image_id, p, raster)| {
                rotations.iter().map(move |&r| Job {
                    key: TargetKey {
                        image_id: *image_id,
                        scale_power: *p,
                        rotation_degrees: r,
                    },
                    reference: &references[*image_id],
                    raster,
                })
            })
            .collect();

        let build = |job: &Job<'_>| -> EnrolledTarget {
            let rotated = rotate_rgba(&job.raster.view(), job.key.rotation_degrees);
            let features = pipeline.extract(&rotated.view());
            EnrolledTarget {
                key: job.key,
                name: job.reference.name.clone(),
                reference_width: job.reference.width(),
                reference_height: job.reference.height(),
                physical_width_m: job.reference.physical_width_m,
                raster_width: rotated.width,
                raster_height: rotated.height,
                keypoints: features.keypoints,
                descriptors: features.descriptors,
            }
        };

        #[cfg(feature = "rayon")]
        let targets: Vec<EnrolledTarget> = jobs.par_iter().map(build).collect();
        #[cfg(not(feature = "rayon"))]
        let targets: Vec<EnrolledTarget> = jobs.iter().map(build).collect();

        for t in targets.iter().filter(|t| t.keypoints.is_empty()) {
            warn!(
                "target '{}' (scale power {}, rotation {}) has no keypoints",
                t.name, t.key.scale_power, t.key.rotation_degrees
            );
        }
        if targets.iter().all(|t| t.keypoints.is_empty()) {
            return Err(EnrollError::ZeroTargets);
        }

        let total_kp: usize = targets.iter().map(|t| t.total_count()).sum();
        info!(
            "enrolled {} targets ({} images x {} scales x {} rotations), {} keypoints",
            targets.len(),
            references.len(),
            powers.len(),
            rotations.len(),
            total_kp
        );

        let targets: Vec<Arc<EnrolledTarget>> = targets.into_iter().map(Arc::new).collect();
        let index = targets
            .iter()
            .enumerate()
            .map(|(i, t)| (t.key, i))
            .collect();
        Ok(Self {
            targets,
            index,
            offsets: Arc::clone(pipeline.offsets()),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    #[inline]
    pub fn targets(&self) -> &[Arc<EnrolledTarget>] {
        &self.targets
    }

    pub fn get(&self, key: &TargetKey) -> Option<&Arc<EnrolledTarget>> {
        self.index.get(key).map(|&i| &self.targets[i])
    }

    /// Sample table the catalog descriptors were built with.
    #[inline]
    pub fn offsets(&self) -> &Arc<SampleOffsets> {
        &self.offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_rotations_cover_full_turn() {
        let r = RotationSet::Step(5).degrees().unwrap();
        assert_eq!(r.len(), 72);
        assert_eq!(r[0], 0);
        assert_eq!(r[71], 355);
    }

    #[test]
    fn axis_set_has_twelve_entries() {
        let r = RotationSet::axis_aligned().degrees().unwrap();
        assert_eq!(r.len(), 12);
        assert!(r.contains(&350) && r.contains(&0));
    }

    #[test]
    fn bad_rotation_configs_are_rejected() {
        assert_eq!(
            RotationSet::Step(0).degrees().unwrap_err(),
            EnrollError::InvalidRotationStep(0)
        );
        assert_eq!(
            RotationSet::Explicit(vec![]).degrees().unwrap_err(),
            EnrollError::NoRotations
        );
        assert_eq!(
            RotationSet::Explicit(vec![0, 360]).degrees().unwrap_err(),
            EnrollError::DuplicateRotation(360)
        );
    }

    #[test]
    fn scale_powers_descend_from_max() {
        let p = EnrollmentParams {
            num_scales: 3,
            max_scale_power: 1,
            ..EnrollmentParams::default()
        };
        assert_eq!(p.scale_powers().unwrap(), vec![1, 0, -1]);
        let p = EnrollmentParams {
            num_scales: 0,
            ..EnrollmentParams::default()
        };
        assert_eq!(p.scale_powers().unwrap_err(), EnrollError::NoScales);
    }

    #[test]
    fn raster_size_floors() {
        assert_eq!(raster_size(64, 48, 0), (64, 48));
        assert_eq!(raster_size(65, 47, -1), (32, 23));
        assert_eq!(raster_size(10, 10, 1), (20, 20));
        assert_eq!(raster_size(3, 3, -2), (0, 0));
    }

    fn pipeline() -> FeaturePipeline {
        FeaturePipeline::new(
            refmatch_core::PreprocessParams::default(),
            refmatch_features::DetectorParams::default(),
            &refmatch_features::DescriptorParams::default(),
        )
        .unwrap()
    }

    /// Checkerboard of 8 px cells inside a 4 px black border.
    fn checker(name: &str, size: usize) -> ReferenceImage {
        let mut img = RgbaImage::filled(size, size, [0, 0, 0, 255]);
        for y in 4..size - 4 {
            for x in 4..size - 4 {
                if ((x / 8) + (y / 8)) % 2 == 0 {
                    img.put_pixel(x, y, [255, 255, 255, 255]);
                }
            }
        }
        ReferenceImage::new(name, img, 0.25)
    }

    #[test]
    fn catalog_is_ordered_by_image_scale_rotation() {
        let params = EnrollmentParams {
            num_scales: 2,
            max_scale_power: 0,
            rotations: RotationSet::Explicit(vec![0, 90]),
        };
        let refs = [checker("a", 64), checker("b", 48)];
        let lib = TargetLibrary::enroll(&refs, &params, &pipeline()).unwrap();
        assert_eq!(lib.len(), 8);

        let keys: Vec<(usize, i32, i32)> = lib
            .targets()
            .iter()
            .map(|t| (t.key.image_id, t.key.scale_power, t.key.rotation_degrees))
            .collect();
        assert_eq!(keys[0], (0, 0, 0));
        assert_eq!(keys[1], (0, 0, 90));
        assert_eq!(keys[2], (0, -1, 0));
        assert_eq!(keys[4], (1, 0, 0));

        let half = lib
            .get(&TargetKey {
                image_id: 0,
                scale_power: -1,
                rotation_degrees: 90,
            })
            .unwrap();
        assert_eq!((half.raster_width, half.raster_height), (32, 32));
        assert_eq!(half.reference_width, 64);
        assert_eq!(half.name, "a");
        assert!(lib
            .targets()
            .iter()
            .all(|t| t.descriptors.len() == t.keypoints.len()));
    }

    #[test]
    fn configuration_errors_name_the_reference() {
        let p = pipeline();
        let single = EnrollmentParams::single();

        assert_eq!(
            TargetLibrary::enroll(&[], &single, &p).unwrap_err(),
            EnrollError::NoReferenceImages
        );

        let blank = ReferenceImage::new("blank", RgbaImage::new(0, 0), 0.2);
        assert_eq!(
            TargetLibrary::enroll(&[blank], &single, &p).unwrap_err(),
            EnrollError::MissingTextureData {
                name: "blank".into()
            }
        );

        let mut bad_width = checker("w", 32);
        bad_width.physical_width_m = 0.0;
        assert!(matches!(
            TargetLibrary::enroll(&[bad_width], &single, &p).unwrap_err(),
            EnrollError::InvalidPhysicalWidth { .. }
        ));

        let tiny = EnrollmentParams {
            num_scales: 1,
            max_scale_power: -6,
            ..EnrollmentParams::single()
        };
        assert_eq!(
            TargetLibrary::enroll(&[checker("t", 32)], &tiny, &p).unwrap_err(),
            EnrollError::EmptyRaster {
                name: "t".into(),
                scale_power: -6
            }
        );
    }

    #[test]
    fn featureless_references_give_zero_targets() {
        let flat = ReferenceImage::new("flat", RgbaImage::filled(32, 32, [9, 9, 9, 255]), 0.1);
        assert_eq!(
            TargetLibrary::enroll(&[flat], &EnrollmentParams::single(), &pipeline()).unwrap_err(),
            EnrollError::ZeroTargets
        );
    }

    #[test]
    fn rotation_set_json_shape() {
        let json = serde_json::to_string(&RotationSet::Step(5)).unwrap();
        assert_eq!(json, r#"{"step":5}"#);
        let back: RotationSet = serde_json::from_str(r#"{"explicit":[0,90]}"#).unwrap();
        assert_eq!(back, RotationSet::Explicit(vec![0, 90]));
    }
}
