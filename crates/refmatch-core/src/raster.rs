//! Rasterization of reference images into enrollment variants.

use crate::image::{RgbaImage, RgbaImageView};

#[inline]
fn tap(src: &RgbaImageView<'_>, x: i64, y: i64) -> [f32; 4] {
    let xc = x.clamp(0, src.width as i64 - 1) as usize;
    let yc = y.clamp(0, src.height as i64 - 1) as usize;
    let p = src.pixel(xc, yc);
    [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
}

/// Bilinear RGBA sample with clamp-to-edge taps.
pub fn sample_bilinear_rgba(src: &RgbaImageView<'_>, x: f64, y: f64) -> [u8; 4] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = (x - x0) as f32;
    let fy = (y - y0) as f32;
    let (xi, yi) = (x0 as i64, y0 as i64);

    let p00 = tap(src, xi, yi);
    let p10 = tap(src, xi + 1, yi);
    let p01 = tap(src, xi, yi + 1);
    let p11 = tap(src, xi + 1, yi + 1);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let a = p00[c] + fx * (p10[c] - p00[c]);
        let b = p01[c] + fx * (p11[c] - p01[c]);
        out[c] = (a + fy * (b - a)).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Bilinear resize using pixel-center alignment.
pub fn resize_rgba(src: &RgbaImageView<'_>, width: usize, height: usize) -> RgbaImage {
    if width == src.width && height == src.height {
        return src.to_owned_image();
    }
    let sx = src.width as f64 / width as f64;
    let sy = src.height as f64 / height as f64;
    let mut dst = RgbaImage::new(width, height);
    for y in 0..height {
        let v = (y as f64 + 0.5) * sy - 0.5;
        for x in 0..width {
            let u = (x as f64 + 0.5) * sx - 0.5;
            dst.put_pixel(x, y, sample_bilinear_rgba(src, u, v));
        }
    }
    dst
}

/// Rotate about the image center by `degrees`, clockwise in image
/// coordinates (y down). The canvas keeps its size; uncovered pixels are
/// transparent black.
pub fn rotate_rgba(src: &RgbaImageView<'_>, degrees: i32) -> RgbaImage {
    let deg = degrees.rem_euclid(360);
    if deg == 0 {
        return src.to_owned_image();
    }
    let theta = (deg as f64).to_radians();
    let (s, c) = theta.sin_cos();
    let cx = (src.width as f64 - 1.0) * 0.5;
    let cy = (src.height as f64 - 1.0) * 0.5;
    let max_x = src.width as f64 - 0.5;
    let max_y = src.height as f64 - 0.5;

    let mut dst = RgbaImage::new(src.width, src.height);
    for y in 0..src.height {
        let dy = y as f64 - cy;
        for x in 0..src.width {
            let dx = x as f64 - cx;
            // inverse rotation
            let u = c * dx + s * dy + cx;
            let v = -s * dx + c * dy + cy;
            if u < -0.5 || v < -0.5 || u > max_x || v > max_y {
                continue;
            }
            dst.put_pixel(x, y, sample_bilinear_rgba(src, u, v));
        }
    }
    dst
}
