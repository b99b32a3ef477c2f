//! Keypoints and descriptors follow a pure translation of the content.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use refmatch_core::GrayImage;
use refmatch_features::{
    hamming, DescriptorExtractor, DescriptorParams, DetectorParams, Keypoint, KeypointDetector,
};

/// 64x64 patch of random 4x4 blocks inside an 8 px black margin.
fn blocky_patch(seed: u64) -> GrayImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let blocks: Vec<f32> = (0..12 * 12).map(|_| rng.random_range(0.0..1.0)).collect();
    GrayImage::from_fn(64, 64, |x, y| {
        if !(8..56).contains(&x) || !(8..56).contains(&y) {
            return 0.0;
        }
        blocks[((y - 8) / 4) * 12 + (x - 8) / 4]
    })
}

fn paste(patch: &GrayImage, w: usize, h: usize, ox: usize, oy: usize) -> GrayImage {
    GrayImage::from_fn(w, h, |x, y| {
        if x >= ox && y >= oy && x < ox + patch.width && y < oy + patch.height {
            patch.get(x - ox, y - oy)
        } else {
            0.0
        }
    })
}

#[test]
fn translated_patch_gives_shifted_keypoints_and_equal_descriptors() {
    let patch = blocky_patch(11);
    let frame = paste(&patch, 200, 150, 70, 40);

    let detector = KeypointDetector::new(DetectorParams::default()).unwrap();
    let extractor = DescriptorExtractor::from_params(&DescriptorParams::default()).unwrap();

    let ref_det = detector.detect(&patch.view());
    let frame_det = detector.detect(&frame.view());
    assert!(!ref_det.is_empty());

    let shifted: Vec<Keypoint> = ref_det
        .keypoints
        .iter()
        .map(|k| Keypoint::new(k.x + 70, k.y + 40))
        .collect();
    assert_eq!(frame_det.keypoints, shifted);
    assert_eq!(frame_det.threshold, ref_det.threshold);

    let ref_desc = extractor.describe(&patch.view(), &ref_det.keypoints);
    let frame_desc = extractor.describe(&frame.view(), &frame_det.keypoints);
    for i in 0..ref_desc.len() {
        assert_eq!(hamming(ref_desc.descriptor(i), frame_desc.descriptor(i)), 0);
    }
}

#[test]
fn final_keypoint_cap_holds_on_busy_images() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let noise = GrayImage::from_fn(160, 120, |_, _| rng.random_range(0.0..1.0));
    let params = DetectorParams {
        max_keypoints: 25,
        max_candidates: 100,
        ..DetectorParams::default()
    };
    let detector = KeypointDetector::new(params).unwrap();
    let det = detector.detect(&noise.view());
    assert!(det.len() <= 25);
    assert_eq!(det.keypoints.len(), det.scores.len());
}
