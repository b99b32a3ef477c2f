//! Harris cornerness evaluated at candidate locations.
//!
//! `R = det(M) - k * trace(M)^2`, with `M` the Sobel structure tensor summed
//! over a square window. Reads outside the image are clamped.

use refmatch_core::GrayImageView;
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::keypoint::Keypoint;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarrisParams {
    /// Harris sensitivity constant.
    pub k: f32,
    /// Half-width of the summation window.
    pub window_radius: usize,
}

impl Default for HarrisParams {
    fn default() -> Self {
        Self {
            k: 0.04,
            window_radius: 2,
        }
    }
}

#[inline]
fn sobel(img: &GrayImageView<'_>, x: i32, y: i32) -> (f32, f32) {
    let p = |dx: i32, dy: i32| img.get_clamped(x + dx, y + dy);
    let gx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
    let gy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
    (gx * 0.125, gy * 0.125)
}

/// Harris response at a single pixel.
pub fn harris_score(img: &GrayImageView<'_>, kp: Keypoint, params: &HarrisParams) -> f32 {
    let r = params.window_radius as i32;
    let (mut sxx, mut syy, mut sxy) = (0.0f32, 0.0f32, 0.0f32);
    for dy in -r..=r {
        for dx in -r..=r {
            let (gx, gy) = sobel(img, kp.x + dx, kp.y + dy);
            sxx += gx * gx;
            syy += gy * gy;
            sxy += gx * gy;
        }
    }
    let det = sxx * syy - sxy * sxy;
    let trace = sxx + syy;
    det - params.k * trace * trace
}

/// Scores for every keypoint, in input order.
pub fn harris_scores(
    img: &GrayImageView<'_>,
    kps: &[Keypoint],
    params: &HarrisParams,
) -> Vec<f32> {
    #[cfg(feature = "rayon")]
    {
        kps.par_iter()
            .map(|&kp| harris_score(img, kp, params))
            .collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        kps.iter().map(|&kp| harris_score(img, kp, params)).collect()
    }
}
