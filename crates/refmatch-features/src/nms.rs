//! Local non-maximum suppression over scored keypoints.

use crate::keypoint::Keypoint;

/// `a` outranks `b`: higher score wins, ties go to the earlier raster position.
#[inline]
fn outranks(a: (f32, Keypoint), b: (f32, Keypoint)) -> bool {
    a.0 > b.0 || (a.0 == b.0 && a.1.raster_key() < b.1.raster_key())
}

/// Indices of keypoints that are the strongest within a square window of
/// half-width `radius`. Output preserves input order.
///
/// Keypoints must lie inside `width x height`; scores that are NaN never
/// survive.
pub fn suppress(
    keypoints: &[Keypoint],
    scores: &[f32],
    width: usize,
    height: usize,
    radius: usize,
) -> Vec<usize> {
    debug_assert_eq!(keypoints.len(), scores.len());
    if keypoints.is_empty() {
        return Vec::new();
    }

    let mut grid: Vec<Option<u32>> = vec![None; width * height];
    for (i, kp) in keypoints.iter().enumerate() {
        if kp.x >= 0 && kp.y >= 0 && (kp.x as usize) < width && (kp.y as usize) < height {
            grid[kp.y as usize * width + kp.x as usize] = Some(i as u32);
        }
    }

    let r = radius as i32;
    let mut kept = Vec::new();
    'candidates: for (i, (&kp, &score)) in keypoints.iter().zip(scores).enumerate() {
        if score.is_nan() {
            continue;
        }
        let y0 = (kp.y - r).max(0);
        let y1 = (kp.y + r).min(height as i32 - 1);
        let x0 = (kp.x - r).max(0);
        let x1 = (kp.x + r).min(width as i32 - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let Some(j) = grid[y as usize * width + x as usize] else {
                    continue;
                };
                let j = j as usize;
                if j != i && outranks((scores[j], keypoints[j]), (score, kp)) {
                    continue 'candidates;
                }
            }
        }
        kept.push(i);
    }
    kept
}
