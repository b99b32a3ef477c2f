//! Lightweight owned/borrowed image buffers.
//!
//! Color frames are packed RGBA8, row-major. Intensity fields are `f32`
//! row-major with values normalized to `[0, 1]`.

/// Errors raised when wrapping raw pixel buffers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("invalid image buffer length (expected {expected} elements, got {got})")]
    BufferSizeMismatch { expected: usize, got: usize },

    #[error("invalid image dimensions (width={width}, height={height})")]
    InvalidDimensions { width: usize, height: usize },
}

fn check_len(width: usize, height: usize, channels: usize, got: usize) -> Result<(), ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::InvalidDimensions { width, height });
    }
    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or(ImageError::InvalidDimensions { width, height })?;
    if expected != got {
        return Err(ImageError::BufferSizeMismatch { expected, got });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
pub struct RgbaImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h*4
}

impl<'a> RgbaImageView<'a> {
    /// Wrap a packed RGBA8 buffer, validating its length.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Result<Self, ImageError> {
        check_len(width, height, 4, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * self.width + x) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn to_owned_image(&self) -> RgbaImage {
        RgbaImage {
            width: self.width,
            height: self.height,
            data: self.data.to_vec(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbaImage {
    /// Transparent black image.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 4],
        }
    }

    /// Single-color image.
    pub fn filled(width: usize, height: usize, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self, ImageError> {
        check_len(width, height, 4, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn view(&self) -> RgbaImageView<'_> {
        RgbaImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        self.view().pixel(x, y)
    }

    #[inline]
    pub fn put_pixel(&mut self, x: usize, y: usize, rgba: [u8; 4]) {
        let i = (y * self.width + x) * 4;
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Copy `src` into this image with its top-left corner at `(x0, y0)`.
    /// Pixels falling outside the destination are dropped.
    pub fn blit(&mut self, src: &RgbaImageView<'_>, x0: i64, y0: i64) {
        for sy in 0..src.height {
            let dy = y0 + sy as i64;
            if dy < 0 || dy >= self.height as i64 {
                continue;
            }
            for sx in 0..src.width {
                let dx = x0 + sx as i64;
                if dx < 0 || dx >= self.width as i64 {
                    continue;
                }
                self.put_pixel(dx as usize, dy as usize, src.pixel(sx, sy));
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [f32], // row-major, len = w*h
}

impl<'a> GrayImageView<'a> {
    pub fn new(width: usize, height: usize, data: &'a [f32]) -> Result<Self, ImageError> {
        check_len(width, height, 1, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Read a pixel with coordinates clamped to the image.
    #[inline]
    pub fn get_clamped(&self, x: i32, y: i32) -> f32 {
        let xc = x.clamp(0, self.width as i32 - 1) as usize;
        let yc = y.clamp(0, self.height as i32 - 1) as usize;
        self.data[yc * self.width + xc]
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<f32>) -> Result<Self, ImageError> {
        check_len(width, height, 1, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.width + x] = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_view_rejects_wrong_length() {
        let data = vec![0u8; 10];
        let err = RgbaImageView::new(2, 2, &data).unwrap_err();
        assert_eq!(
            err,
            ImageError::BufferSizeMismatch {
                expected: 16,
                got: 10
            }
        );
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let err = GrayImage::from_raw(0, 3, Vec::new()).unwrap_err();
        assert_eq!(
            err,
            ImageError::InvalidDimensions {
                width: 0,
                height: 3
            }
        );
    }

    #[test]
    fn clamped_reads_stay_in_bounds() {
        let img = GrayImage::from_fn(3, 2, |x, y| (y * 3 + x) as f32);
        let v = img.view();
        assert_eq!(v.get_clamped(-5, -5), 0.0);
        assert_eq!(v.get_clamped(10, 0), 2.0);
        assert_eq!(v.get_clamped(10, 10), 5.0);
        assert_eq!(v.get_clamped(1, 1), 4.0);
    }

    #[test]
    fn blit_clips_to_destination() {
        let src = RgbaImage::filled(4, 4, [255, 0, 0, 255]);
        let mut dst = RgbaImage::new(6, 6);
        dst.blit(&src.view(), 4, -2);
        assert_eq!(dst.pixel(4, 0), [255, 0, 0, 255]);
        assert_eq!(dst.pixel(5, 1), [255, 0, 0, 255]);
        assert_eq!(dst.pixel(3, 0), [0, 0, 0, 0]);
        assert_eq!(dst.pixel(4, 2), [0, 0, 0, 0]);
    }
}
