use refmatch_core::RgbaImage;

/// A known image the engine can recognize.
#[derive(Clone, Debug)]
pub struct ReferenceImage {
    /// Display name, carried into recognition events.
    pub name: String,
    /// Source pixels at native resolution.
    pub image: RgbaImage,
    /// Physical width of the printed/displayed image in meters. Used for depth.
    pub physical_width_m: f64,
}

impl ReferenceImage {
    pub fn new(name: impl Into<String>, image: RgbaImage, physical_width_m: f64) -> Self {
        Self {
            name: name.into(),
            image,
            physical_width_m,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.image.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.image.height
    }

    /// `true` when the image carries no pixel data.
    pub fn is_missing_texture(&self) -> bool {
        self.image.is_empty() || self.image.data.len() != self.image.width * self.image.height * 4
    }
}
