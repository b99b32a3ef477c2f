//! Core types for reference-image recognition.
//!
//! This crate holds the pieces that do not depend on any feature detector:
//! image buffers, frame preprocessing, enrollment rasterization and the
//! camera ray-casting interface used for depth recovery.

mod camera;
mod image;
mod logger;
mod preprocess;
mod raster;

pub use camera::{CameraIntrinsics, CameraRays, PinholeCamera};
pub use image::{GrayImage, GrayImageView, ImageError, RgbaImage, RgbaImageView};
pub use preprocess::{
    convolve_separable, downscale, gaussian_kernel_1d, to_gray, PreprocessError,
    PreprocessParams, Preprocessor,
};
pub use raster::{resize_rgba, rotate_rgba, sample_bilinear_rgba};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, parse_level};
