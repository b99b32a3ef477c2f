//! Camera ray casting used for monocular depth recovery.
//!
//! The camera frame is x right, y down, z forward. Pixel coordinates passed
//! to [`CameraRays`] are in camera (full) resolution.

use nalgebra::{Point2, Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Host-side camera collaborator: maps pixels to world-space rays.
pub trait CameraRays {
    /// Camera center in world coordinates.
    fn position(&self) -> Point3<f64>;

    /// Unit world-space direction of the ray through `pixel`, or `None` when
    /// the pixel cannot be back-projected.
    fn ray_direction(&self, pixel: Point2<f64>) -> Option<Vector3<f64>>;
}

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn is_valid(self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    /// Convert pixel coordinates to normalized pinhole coordinates.
    pub fn pixel_to_normalized(self, pixel: Point2<f64>) -> Option<Point2<f64>> {
        if !self.is_valid() {
            return None;
        }
        let x = (pixel.x - self.cx) / self.fx;
        let y = (pixel.y - self.cy) / self.fy;
        (x.is_finite() && y.is_finite()).then(|| Point2::new(x, y))
    }
}

/// Pinhole camera with a world pose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PinholeCamera {
    pub intrinsics: CameraIntrinsics,
    /// Camera center in world coordinates.
    pub position: Point3<f64>,
    /// Camera-to-world rotation.
    pub rotation: UnitQuaternion<f64>,
}

impl PinholeCamera {
    /// Camera at the world origin looking down +z.
    pub fn at_origin(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }
}

impl CameraRays for PinholeCamera {
    fn position(&self) -> Point3<f64> {
        self.position
    }

    fn ray_direction(&self, pixel: Point2<f64>) -> Option<Vector3<f64>> {
        let n = self.intrinsics.pixel_to_normalized(pixel)?;
        let d = Vector3::new(n.x, n.y, 1.0).normalize();
        Some(self.rotation * d)
    }
}

impl<C: CameraRays + ?Sized> CameraRays for &C {
    fn position(&self) -> Point3<f64> {
        (**self).position()
    }

    fn ray_direction(&self, pixel: Point2<f64>) -> Option<Vector3<f64>> {
        (**self).ray_direction(pixel)
    }
}
