//! FAST segment test on normalized intensity.
//!
//! A pixel is a candidate when at least `arc_length` contiguous pixels of the
//! radius-3 Bresenham circle are all brighter than `center + t` or all darker
//! than `center - t`.

use refmatch_core::GrayImageView;
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::collector::CandidateBuffer;
use crate::keypoint::Keypoint;

/// Radius of the sampling circle.
pub const CIRCLE_RADIUS: usize = 3;

/// Bresenham circle of radius 3, clockwise from 12 o'clock.
pub const CIRCLE_OFFSETS: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FastParams {
    /// Minimum contiguous arc, in circle pixels (FAST-N).
    pub arc_length: usize,
    /// Border excluded from candidacy, in pixels. At least the circle radius.
    pub edge: usize,
}

impl Default for FastParams {
    fn default() -> Self {
        Self {
            arc_length: 9,
            edge: 3,
        }
    }
}

#[inline]
fn has_arc(mask: u16, n: usize) -> bool {
    // doubling the mask makes runs that wrap past index 15 contiguous
    let mut run = (mask as u32) | ((mask as u32) << 16);
    for _ in 1..n {
        run &= run >> 1;
    }
    run != 0
}

/// Segment test at `(x, y)`. The caller guarantees the circle is in bounds.
#[inline]
pub fn segment_test(
    img: &GrayImageView<'_>,
    x: usize,
    y: usize,
    threshold: f32,
    arc: usize,
) -> bool {
    let center = img.get(x, y);
    let hi = center + threshold;
    let lo = center - threshold;

    let mut bright: u16 = 0;
    let mut dark: u16 = 0;
    for (i, &(dx, dy)) in CIRCLE_OFFSETS.iter().enumerate() {
        let p = img.get((x as i32 + dx) as usize, (y as i32 + dy) as usize);
        if p > hi {
            bright |= 1 << i;
        } else if p < lo {
            dark |= 1 << i;
        }
    }
    if (bright.count_ones() as usize) < arc && (dark.count_ones() as usize) < arc {
        return false;
    }
    has_arc(bright, arc) || has_arc(dark, arc)
}

fn scan_row(
    img: &GrayImageView<'_>,
    y: usize,
    threshold: f32,
    params: &FastParams,
) -> Vec<Keypoint> {
    let edge = params.edge.max(CIRCLE_RADIUS);
    (edge..img.width - edge)
        .filter(|&x| segment_test(img, x, y, threshold, params.arc_length))
        .map(|x| Keypoint::new(x as i32, y as i32))
        .collect()
}

/// Run the segment test over the whole image, pushing candidates into `out`
/// in raster order. Rows may be evaluated in parallel; the merge order is
/// fixed so truncation at capacity is deterministic.
pub fn detect_candidates(
    img: &GrayImageView<'_>,
    threshold: f32,
    params: &FastParams,
    out: &mut CandidateBuffer<Keypoint>,
) {
    let edge = params.edge.max(CIRCLE_RADIUS);
    if img.width <= 2 * edge || img.height <= 2 * edge {
        return;
    }
    let ys = edge..img.height - edge;

    #[cfg(feature = "rayon")]
    let rows: Vec<Vec<Keypoint>> = ys
        .into_par_iter()
        .map(|y| scan_row(img, y, threshold, params))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let rows: Vec<Vec<Keypoint>> = ys.map(|y| scan_row(img, y, threshold, params)).collect();

    for row in rows {
        out.extend(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refmatch_core::GrayImage;

    fn square(size: usize, lo: usize, hi: usize) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (lo..=hi).contains(&x) && (lo..=hi).contains(&y) {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn arc_detection_wraps_around() {
        // bits 12..15 and 0..4 form a 9-long run across the wrap
        let mask: u16 = 0b0000_0000_0001_1111 | 0b1111_0000_0000_0000;
        assert!(has_arc(mask, 9));
        assert!(!has_arc(mask, 10));
        assert!(!has_arc(0b0101_0101_0101_0101, 2));
    }

    #[test]
    fn square_corner_is_a_candidate_but_edge_is_not() {
        let img = square(64, 20, 39);
        let v = img.view();
        assert!(segment_test(&v, 20, 20, 0.3, 9));
        assert!(!segment_test(&v, 30, 20, 0.3, 9));
        assert!(!segment_test(&v, 30, 30, 0.3, 9));
    }

    #[test]
    fn candidates_come_out_in_raster_order() {
        let img = square(64, 20, 39);
        let mut buf = CandidateBuffer::with_capacity(1000);
        detect_candidates(&img.view(), 0.3, &FastParams::default(), &mut buf);
        assert!(!buf.is_empty());
        let keys: Vec<_> = buf.as_slice().iter().map(|k| k.raster_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn tiny_image_yields_nothing() {
        let img = GrayImage::new(6, 6);
        let mut buf = CandidateBuffer::with_capacity(10);
        detect_candidates(&img.view(), 0.1, &FastParams::default(), &mut buf);
        assert_eq!(buf.seen(), 0);
    }
}
