use serde::{Deserialize, Serialize};

/// Integer pixel location at working resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: i32,
    pub y: i32,
}

impl Keypoint {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Sort key for raster order (row-major, top-left first).
    #[inline]
    pub fn raster_key(&self) -> (i32, i32) {
        (self.y, self.x)
    }
}
