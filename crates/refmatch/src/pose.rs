//! Origin, scale and depth from matched correspondences.
//!
//! All sanity checks reject by returning `None`; a rejected pose is a normal
//! per-frame outcome, not an error.

use std::fmt;
use std::sync::Arc;

use log::debug;
use nalgebra::{Point2, Point3, UnitQuaternion};
use refmatch_core::CameraRays;
use refmatch_features::Keypoint;
use serde::{Deserialize, Serialize};

use crate::library::EnrolledTarget;
use crate::matcher::{Correspondence, MatchResult};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoseParams {
    /// Depths beyond this many meters are rejected.
    pub max_depth: f64,
    /// When set, correspondences whose offset is farther than this many
    /// pixels from the per-axis median offset are ignored.
    pub max_offset_deviation: Option<f64>,
}

impl Default for PoseParams {
    fn default() -> Self {
        Self {
            max_depth: 100.0,
            max_offset_deviation: None,
        }
    }
}

/// Frame size at working resolution plus the camera-to-working factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewGeometry {
    pub width: usize,
    pub height: usize,
    pub view_scale: usize,
}

impl ViewGeometry {
    pub fn new(width: usize, height: usize, view_scale: usize) -> Self {
        Self {
            width,
            height,
            view_scale,
        }
    }
}

/// A recognition event.
#[derive(Clone, Debug)]
pub struct RecognizedTarget {
    pub target: Arc<EnrolledTarget>,
    pub match_count: usize,
    pub target_total_count: usize,
    /// Top-left of the target in working-resolution pixels.
    pub origin: Point2<i32>,
    pub scale: f64,
    /// On-screen size in working-resolution pixels.
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub depth_m: Option<f64>,
    pub world_position: Option<Point3<f64>>,
    /// Identity; rotation is only known up to the enrolled rotation bucket.
    pub world_orientation: UnitQuaternion<f64>,
}

impl RecognizedTarget {
    pub fn match_rate(&self) -> f64 {
        if self.target_total_count == 0 {
            0.0
        } else {
            self.match_count as f64 / self.target_total_count as f64
        }
    }
}

impl fmt::Display for RecognizedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | scale power {} scale {:.3} | origin ({}, {}) | rotation {} | matches {}/{} ({:.1}%)",
            self.target.name,
            self.target.key.scale_power,
            self.scale,
            self.origin.x,
            self.origin.y,
            self.target.key.rotation_degrees,
            self.match_count,
            self.target_total_count,
            self.match_rate() * 100.0
        )?;
        if let Some(d) = self.depth_m {
            write!(f, " | depth {d:.2} m")?;
        }
        Ok(())
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

#[derive(Clone, Debug, Default)]
pub struct PoseEstimator {
    params: PoseParams,
}

impl PoseEstimator {
    pub fn new(params: PoseParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &PoseParams {
        &self.params
    }

    /// Pairs of (target keypoint, frame keypoint), after the optional
    /// median-offset filter.
    fn pairs(
        &self,
        target: &EnrolledTarget,
        correspondences: &[Correspondence],
        frame_keypoints: &[Keypoint],
    ) -> Vec<(Keypoint, Keypoint)> {
        let pairs: Vec<(Keypoint, Keypoint)> = correspondences
            .iter()
            .filter_map(|c| {
                Some((
                    *target.keypoints.get(c.target_index)?,
                    *frame_keypoints.get(c.frame_index)?,
                ))
            })
            .collect();

        let Some(max_dev) = self.params.max_offset_deviation else {
            return pairs;
        };
        if pairs.is_empty() {
            return pairs;
        }
        let mut dx: Vec<f64> = pairs.iter().map(|(t, f)| (f.x - t.x) as f64).collect();
        let mut dy: Vec<f64> = pairs.iter().map(|(t, f)| (f.y - t.y) as f64).collect();
        let mx = median(&mut dx);
        let my = median(&mut dy);
        pairs
            .into_iter()
            .filter(|(t, f)| {
                ((f.x - t.x) as f64 - mx).abs() <= max_dev
                    && ((f.y - t.y) as f64 - my).abs() <= max_dev
            })
            .collect()
    }

    /// Estimate the on-screen pose of a match.
    ///
    /// `camera`, when present, enables depth and world position. Without it
    /// the result carries origin and scale only.
    pub fn estimate(
        &self,
        matched: &MatchResult,
        frame_keypoints: &[Keypoint],
        view: ViewGeometry,
        camera: Option<&dyn CameraRays>,
    ) -> Option<RecognizedTarget> {
        let target = &matched.target;
        let pairs = self.pairs(target, &matched.correspondences, frame_keypoints);
        if pairs.is_empty() {
            return None;
        }
        let n = pairs.len() as f64;
        let vw = view.width as f64;
        let vh = view.height as f64;

        // origin: mean frame - target offset, truncated toward zero
        let (sx, sy) = pairs.iter().fold((0.0, 0.0), |(ax, ay), (t, f)| {
            (ax + (f.x - t.x) as f64, ay + (f.y - t.y) as f64)
        });
        let (ox, oy) = ((sx / n).trunc(), (sy / n).trunc());
        if !(ox.is_finite() && oy.is_finite()) || ox < -vw || ox >= vw || oy < -vh || oy >= vh {
            debug!("pose rejected: origin ({ox}, {oy}) outside view");
            return None;
        }

        // scale: mean of target / (frame - origin) over both axes
        let mut acc = 0.0;
        let mut terms = 0usize;
        for (t, f) in &pairs {
            let ddx = f.x as f64 - ox;
            let ddy = f.y as f64 - oy;
            if ddx != 0.0 {
                acc += t.x as f64 / ddx;
                terms += 1;
            }
            if ddy != 0.0 {
                acc += t.y as f64 / ddy;
                terms += 1;
            }
        }
        if terms == 0 {
            return None;
        }
        let scale = acc / terms as f64;
        if !scale.is_finite() || scale <= 0.0 {
            debug!("pose rejected: scale {scale}");
            return None;
        }

        let factor = target.scale_factor();
        let pixel_width = scale * target.reference_width as f64 * factor;
        let pixel_height = scale * target.reference_height as f64 * factor;
        if ox + pixel_width >= 2.0 * vw || oy + pixel_height >= 2.0 * vh {
            debug!("pose rejected: {pixel_width}x{pixel_height} box at ({ox}, {oy}) too large");
            return None;
        }

        let (depth_m, world_position) = match camera {
            Some(cam) => {
                let (d, p) = self.depth(target, ox, oy, pixel_width, pixel_height, view, cam)?;
                (Some(d), Some(p))
            }
            None => (None, None),
        };

        Some(RecognizedTarget {
            target: Arc::clone(target),
            match_count: matched.match_count,
            target_total_count: matched.target_total_count,
            origin: Point2::new(ox as i32, oy as i32),
            scale,
            pixel_width,
            pixel_height,
            depth_m,
            world_position,
            world_orientation: UnitQuaternion::identity(),
        })
    }

    /// Depth from the angle between the ray through the left edge and the ray
    /// through the center, both at the target's vertical center.
    #[allow(clippy::too_many_arguments)]
    fn depth(
        &self,
        target: &EnrolledTarget,
        ox: f64,
        oy: f64,
        pixel_width: f64,
        pixel_height: f64,
        view: ViewGeometry,
        camera: &dyn CameraRays,
    ) -> Option<(f64, Point3<f64>)> {
        let meters_per_pixel = target.physical_width_m / pixel_width;
        let opposite = 0.5 * pixel_height * meters_per_pixel;

        let s = view.view_scale.max(1) as f64;
        let cy = oy + 0.5 * pixel_height;
        let cx = ox + 0.5 * pixel_width;
        let edge_dir = camera.ray_direction(Point2::new(ox * s, cy * s))?;
        let center_dir = camera.ray_direction(Point2::new(cx * s, cy * s))?;

        let angle = edge_dir.angle(&center_dir);
        let depth = opposite / angle.tan();
        if !depth.is_finite() || depth <= 0.0 || depth > self.params.max_depth {
            debug!("pose rejected: depth {depth}");
            return None;
        }
        let position = camera.position() + center_dir.normalize() * depth;
        Some((depth, position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::TargetKey;
    use approx::assert_relative_eq;
    use refmatch_core::{CameraIntrinsics, PinholeCamera};
    use refmatch_features::DescriptorSet;

    fn target(keypoints: Vec<Keypoint>, size: usize) -> Arc<EnrolledTarget> {
        Arc::new(EnrolledTarget {
            key: TargetKey {
                image_id: 0,
                scale_power: 0,
                rotation_degrees: 0,
            },
            name: "poster".into(),
            reference_width: size,
            reference_height: size,
            physical_width_m: 0.2,
            raster_width: size,
            raster_height: size,
            keypoints,
            descriptors: DescriptorSet::empty(128),
        })
    }

    fn identity_match(t: &Arc<EnrolledTarget>) -> MatchResult {
        let correspondences: Vec<Correspondence> = (0..t.keypoints.len())
            .map(|i| Correspondence {
                target_index: i,
                frame_index: i,
                distance: 0,
            })
            .collect();
        MatchResult {
            target: Arc::clone(t),
            match_count: correspondences.len(),
            target_total_count: t.keypoints.len(),
            correspondences,
        }
    }

    fn target_keypoints() -> Vec<Keypoint> {
        vec![
            Keypoint::new(10, 12),
            Keypoint::new(40, 15),
            Keypoint::new(30, 50),
            Keypoint::new(55, 44),
        ]
    }

    #[test]
    fn pure_translation_gives_unit_scale() {
        let t = target(target_keypoints(), 64);
        let frame: Vec<Keypoint> = t
            .keypoints
            .iter()
            .map(|k| Keypoint::new(k.x + 100, k.y + 50))
            .collect();
        let est = PoseEstimator::default();
        let r = est
            .estimate(&identity_match(&t), &frame, ViewGeometry::new(320, 240, 1), None)
            .unwrap();
        assert_eq!(r.origin, Point2::new(100, 50));
        assert_relative_eq!(r.scale, 1.0, epsilon = 1e-12);
        assert!(r.depth_m.is_none());
        assert_eq!(r.world_orientation, UnitQuaternion::identity());
    }

    #[test]
    fn fractional_origin_truncates_toward_zero() {
        let t = target(target_keypoints(), 64);
        let est = PoseEstimator::default();

        // offsets alternate (100, 50) and (101, 51): mean (100.5, 50.5)
        let frame: Vec<Keypoint> = t
            .keypoints
            .iter()
            .enumerate()
            .map(|(i, k)| {
                let d = (i % 2) as i32;
                Keypoint::new(k.x + 100 + d, k.y + 50 + d)
            })
            .collect();
        let r = est
            .estimate(&identity_match(&t), &frame, ViewGeometry::new(320, 240, 1), None)
            .unwrap();
        assert_eq!(r.origin, Point2::new(100, 50));

        // offsets alternate (-10, -20) and (-11, -21): mean (-10.5, -20.5)
        let frame: Vec<Keypoint> = t
            .keypoints
            .iter()
            .enumerate()
            .map(|(i, k)| {
                let d = (i % 2) as i32;
                Keypoint::new(k.x - 10 - d, k.y - 20 - d)
            })
            .collect();
        let r = est
            .estimate(&identity_match(&t), &frame, ViewGeometry::new(320, 240, 1), None)
            .unwrap();
        assert_eq!(r.origin, Point2::new(-10, -20));
    }

    #[test]
    fn negative_scale_is_rejected() {
        let t = target(vec![Keypoint::new(40, 40), Keypoint::new(4, 4)], 64);
        // offsets (-40, -40) and (56, 56) average to origin (8, 8); the
        // first pair then has frame - origin = (-8, -8), giving scale -5
        let frame = vec![Keypoint::new(0, 0), Keypoint::new(60, 60)];
        let est = PoseEstimator::default();
        assert!(est
            .estimate(&identity_match(&t), &frame, ViewGeometry::new(320, 240, 1), None)
            .is_none());
    }

    #[test]
    fn origin_outside_view_is_rejected() {
        let t = target(target_keypoints(), 64);
        let frame: Vec<Keypoint> = t
            .keypoints
            .iter()
            .map(|k| Keypoint::new(k.x + 400, k.y))
            .collect();
        let est = PoseEstimator::default();
        assert!(est
            .estimate(&identity_match(&t), &frame, ViewGeometry::new(320, 240, 1), None)
            .is_none());
    }

    #[test]
    fn oversized_box_is_rejected() {
        let t = target(target_keypoints(), 600);
        let frame: Vec<Keypoint> = t
            .keypoints
            .iter()
            .map(|k| Keypoint::new(k.x + 100, k.y + 50))
            .collect();
        let est = PoseEstimator::default();
        assert!(est
            .estimate(&identity_match(&t), &frame, ViewGeometry::new(320, 240, 1), None)
            .is_none());
    }

    #[test]
    fn depth_from_pinhole_rays() {
        let t = target(target_keypoints(), 64);
        let frame: Vec<Keypoint> = t
            .keypoints
            .iter()
            .map(|k| Keypoint::new(k.x + 288, k.y + 208))
            .collect();
        let cam = PinholeCamera::at_origin(CameraIntrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
        });
        let est = PoseEstimator::default();
        let r = est
            .estimate(
                &identity_match(&t),
                &frame,
                ViewGeometry::new(640, 480, 1),
                Some(&cam as &dyn CameraRays),
            )
            .unwrap();
        // half-width 0.1 m subtends atan(32 / 500) from the optical axis
        let depth = r.depth_m.unwrap();
        assert_relative_eq!(depth, 0.1 * 500.0 / 32.0, epsilon = 1e-9);
        let p = r.world_position.unwrap();
        assert_relative_eq!(p, Point3::new(0.0, 0.0, depth), epsilon = 1e-9);
    }

    #[test]
    fn depth_beyond_limit_is_rejected() {
        let t = target(target_keypoints(), 64);
        let frame: Vec<Keypoint> = t
            .keypoints
            .iter()
            .map(|k| Keypoint::new(k.x + 288, k.y + 208))
            .collect();
        let cam = PinholeCamera::at_origin(CameraIntrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
        });
        let est = PoseEstimator::new(PoseParams {
            max_depth: 1.0,
            ..PoseParams::default()
        });
        assert!(est
            .estimate(
                &identity_match(&t),
                &frame,
                ViewGeometry::new(640, 480, 1),
                Some(&cam as &dyn CameraRays)
            )
            .is_none());
    }

    #[test]
    fn median_filter_drops_outlier() {
        let mut kps = target_keypoints();
        kps.push(Keypoint::new(5, 5));
        let t = target(kps, 64);
        let mut frame: Vec<Keypoint> = t
            .keypoints
            .iter()
            .map(|k| Keypoint::new(k.x + 100, k.y + 50))
            .collect();
        frame[4] = Keypoint::new(300, 10);
        let est = PoseEstimator::new(PoseParams {
            max_offset_deviation: Some(2.0),
            ..PoseParams::default()
        });
        let r = est
            .estimate(&identity_match(&t), &frame, ViewGeometry::new(320, 240, 1), None)
            .unwrap();
        assert_eq!(r.origin, Point2::new(100, 50));
    }

    #[test]
    fn display_summarizes_recognition() {
        let t = target(target_keypoints(), 64);
        let frame: Vec<Keypoint> = t
            .keypoints
            .iter()
            .map(|k| Keypoint::new(k.x + 100, k.y + 50))
            .collect();
        let r = PoseEstimator::default()
            .estimate(&identity_match(&t), &frame, ViewGeometry::new(320, 240, 1), None)
            .unwrap();
        let s = r.to_string();
        assert!(s.starts_with("poster |"));
        assert!(s.contains("origin (100, 50)"));
        assert!(s.contains("matches 4/4 (100.0%)"));
    }
}
