//! Adapters between the `image` crate and the engine's buffer types.

use std::path::Path;

use refmatch_core::{ImageError, RgbaImage, RgbaImageView};

use crate::io::ReferenceConfig;
use crate::reference::ReferenceImage;

#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("failed to load image {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: ::image::ImageError,
    },
    #[error(transparent)]
    Buffer(#[from] ImageError),
}

/// Borrow an `image::RgbaImage` as an engine view.
pub fn rgba_view(img: &::image::RgbaImage) -> RgbaImageView<'_> {
    RgbaImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Load any supported image file as RGBA8.
pub fn load_rgba(path: impl AsRef<Path>) -> Result<RgbaImage, DetectError> {
    let path = path.as_ref();
    let img = ::image::open(path)
        .map_err(|source| DetectError::Load {
            path: path.display().to_string(),
            source,
        })?
        .to_rgba8();
    let (w, h) = img.dimensions();
    Ok(RgbaImage::from_raw(w as usize, h as usize, img.into_raw())?)
}

pub fn load_reference(cfg: &ReferenceConfig) -> Result<ReferenceImage, DetectError> {
    let image = load_rgba(&cfg.path)?;
    log::debug!(
        "loaded reference '{}' ({}x{}) from {}",
        cfg.name,
        image.width,
        image.height,
        cfg.path.display()
    );
    Ok(ReferenceImage::new(
        cfg.name.clone(),
        image,
        cfg.physical_width_m,
    ))
}

pub fn load_references(cfgs: &[ReferenceConfig]) -> Result<Vec<ReferenceImage>, DetectError> {
    cfgs.iter().map(load_reference).collect()
}
