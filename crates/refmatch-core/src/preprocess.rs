//! Frame preprocessing: RGBA8 -> normalized luma -> working resolution -> blur.
//!
//! Luma conversion is linear, so converting before blurring gives the same
//! field as blurring the color channels first.

use serde::{Deserialize, Serialize};

use crate::image::{GrayImage, GrayImageView, RgbaImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessParams {
    /// Integer reduction from camera resolution to working resolution.
    pub view_scale: usize,
    /// Gaussian half-width in pixels. `0` disables blurring.
    pub blur_radius: usize,
    /// Gaussian sigma. Defaults to `blur_radius / 1.5` when unset.
    pub blur_sigma: Option<f32>,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            view_scale: 1,
            blur_radius: 2,
            blur_sigma: None,
        }
    }
}

impl PreprocessParams {
    /// Parameters for already-rasterized reference images.
    pub fn without_downscale(&self) -> Self {
        Self {
            view_scale: 1,
            ..self.clone()
        }
    }

    pub fn effective_sigma(&self) -> f32 {
        self.blur_sigma.unwrap_or(self.blur_radius as f32 / 1.5)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("view_scale must be at least 1")]
    InvalidViewScale,
    #[error("blur sigma must be positive and finite (got {0})")]
    InvalidSigma(f32),
}

/// Normalized Gaussian kernel of length `2 * radius + 1`.
pub fn gaussian_kernel_1d(radius: usize, sigma: f32) -> Vec<f32> {
    let len = 2 * radius + 1;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Separable convolution with clamp-to-edge borders.
pub fn convolve_separable(src: &GrayImageView<'_>, kernel: &[f32]) -> GrayImage {
    let w = src.width;
    let h = src.height;
    let half = (kernel.len() / 2) as i32;

    let mut tmp = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                acc += src.get_clamped(x as i32 + ki as i32 - half, y as i32) * kv;
            }
            tmp.set(x, y, acc);
        }
    }

    let tv = tmp.view();
    let mut dst = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                acc += tv.get_clamped(x as i32, y as i32 + ki as i32 - half) * kv;
            }
            dst.set(x, y, acc);
        }
    }
    dst
}

/// Rec. 601 luma in `[0, 1]`. Alpha is ignored.
pub fn to_gray(src: &RgbaImageView<'_>) -> GrayImage {
    let data = src
        .data
        .chunks_exact(4)
        .map(|px| {
            (LUMA_R * px[0] as f32 + LUMA_G * px[1] as f32 + LUMA_B * px[2] as f32) / 255.0
        })
        .collect();
    GrayImage {
        width: src.width,
        height: src.height,
        data,
    }
}

/// Box-average reduction by an integer factor. Output dimensions are
/// `max(1, dim / factor)`.
pub fn downscale(src: &GrayImageView<'_>, factor: usize) -> GrayImage {
    if factor <= 1 {
        return GrayImage {
            width: src.width,
            height: src.height,
            data: src.data.to_vec(),
        };
    }
    let ow = (src.width / factor).max(1);
    let oh = (src.height / factor).max(1);
    GrayImage::from_fn(ow, oh, |ox, oy| {
        let x0 = ox * factor;
        let y0 = oy * factor;
        let x1 = (x0 + factor).min(src.width);
        let y1 = (y0 + factor).min(src.height);
        let mut acc = 0.0f32;
        for y in y0..y1 {
            for x in x0..x1 {
                acc += src.get(x, y);
            }
        }
        acc / ((x1 - x0) * (y1 - y0)) as f32
    })
}

/// Converts color frames into the blurred intensity field the detector runs on.
#[derive(Clone, Debug)]
pub struct Preprocessor {
    params: PreprocessParams,
    kernel: Option<Vec<f32>>,
}

impl Preprocessor {
    pub fn new(params: PreprocessParams) -> Result<Self, PreprocessError> {
        if params.view_scale == 0 {
            return Err(PreprocessError::InvalidViewScale);
        }
        let kernel = if params.blur_radius == 0 {
            None
        } else {
            let sigma = params.effective_sigma();
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(PreprocessError::InvalidSigma(sigma));
            }
            Some(gaussian_kernel_1d(params.blur_radius, sigma))
        };
        Ok(Self { params, kernel })
    }

    #[inline]
    pub fn params(&self) -> &PreprocessParams {
        &self.params
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn run(&self, frame: &RgbaImageView<'_>) -> GrayImage {
        let gray = to_gray(frame);
        let reduced = if self.params.view_scale > 1 {
            downscale(&gray.view(), self.params.view_scale)
        } else {
            gray
        };
        match &self.kernel {
            Some(k) => convolve_separable(&reduced.view(), k),
            None => reduced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::RgbaImage;
    use approx::assert_abs_diff_eq;

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel_1d(2, 2.0 / 1.5);
        assert_eq!(k.len(), 5);
        assert_abs_diff_eq!(k.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(k[0], k[4], epsilon = 1e-7);
        assert!(k[2] > k[1] && k[1] > k[0]);
    }

    #[test]
    fn luma_weights() {
        let img = RgbaImage::filled(2, 1, [255, 255, 255, 255]);
        let g = to_gray(&img.view());
        assert_abs_diff_eq!(g.get(0, 0), 1.0, epsilon = 1e-5);

        let red = RgbaImage::filled(1, 1, [255, 0, 0, 0]);
        assert_abs_diff_eq!(to_gray(&red.view()).get(0, 0), LUMA_R, epsilon = 1e-6);
    }

    #[test]
    fn blur_preserves_constant_field() {
        let img = GrayImage::from_fn(7, 5, |_, _| 0.25);
        let out = convolve_separable(&img.view(), &gaussian_kernel_1d(2, 1.0));
        for v in out.data {
            assert_abs_diff_eq!(v, 0.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn downscale_averages_blocks() {
        let img = GrayImage::from_fn(4, 2, |x, _| if x < 2 { 0.0 } else { 1.0 });
        let out = downscale(&img.view(), 2);
        assert_eq!((out.width, out.height), (2, 1));
        assert_abs_diff_eq!(out.get(0, 0), 0.0);
        assert_abs_diff_eq!(out.get(1, 0), 1.0);
    }

    #[test]
    fn zero_view_scale_is_rejected() {
        let params = PreprocessParams {
            view_scale: 0,
            ..PreprocessParams::default()
        };
        assert_eq!(
            Preprocessor::new(params).unwrap_err(),
            PreprocessError::InvalidViewScale
        );
    }

    #[test]
    fn run_without_blur_is_plain_luma() {
        let params = PreprocessParams {
            blur_radius: 0,
            ..PreprocessParams::default()
        };
        let pre = Preprocessor::new(params).unwrap();
        let mut img = RgbaImage::new(3, 3);
        img.put_pixel(1, 1, [255, 255, 255, 255]);
        let g = pre.run(&img.view());
        assert_abs_diff_eq!(g.get(1, 1), 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(g.get(0, 0), 0.0);
    }
}
