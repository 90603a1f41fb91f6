use klt::{FeatureTracker, GoodFeatures, GrayFloatImage, KeyPoint, KeyPoints, ShiTomasiTracker};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

const WIDTH: usize = 200;
const HEIGHT: usize = 150;
const BLOB_SIGMA: f32 = 5.0;

struct Blob {
    x: f32,
    y: f32,
    amplitude: f32,
}

fn blobs(count: usize) -> Vec<Blob> {
    let mut rng = Pcg64::from_seed([5; 32]);
    (0..count)
        .map(|_| Blob {
            x: rng.gen_range(-10.0..WIDTH as f32 + 10.0),
            y: rng.gen_range(-10.0..HEIGHT as f32 + 10.0),
            amplitude: rng.gen_range(0.2..0.6),
        })
        .collect()
}

/// Renders the blob field moved by `(dx, dy)`.
fn render(blobs: &[Blob], dx: f32, dy: f32) -> GrayFloatImage {
    let mut image = GrayFloatImage::new(WIDTH, HEIGHT);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let value: f32 = blobs
                .iter()
                .map(|blob| {
                    let (ox, oy) = (x as f32 - blob.x - dx, y as f32 - blob.y - dy);
                    blob.amplitude
                        * (-(ox * ox + oy * oy) / (2.0 * BLOB_SIGMA * BLOB_SIGMA)).exp()
                })
                .sum();
            image.put(x, y, value.min(1.0));
        }
    }
    image
}

#[test]
fn blank_image_has_no_keypoints() {
    let _ = pretty_env_logger::try_init_timed();
    let tracker = ShiTomasiTracker::default();
    assert!(tracker.detect(&GrayFloatImage::new(WIDTH, HEIGHT)).is_empty());
}

#[test]
fn detection_is_capped_and_spread_out() {
    let image = render(&blobs(80), 0.0, 0.0);
    let detector = GoodFeatures {
        num_features: 40,
        min_distance: 10.0,
        ..Default::default()
    };
    let keypoints = detector.detect(&image);
    assert!(!keypoints.is_empty());
    assert!(keypoints.len() <= 40);
    for (i, a) in keypoints.iter().enumerate() {
        for b in &keypoints[i + 1..] {
            assert!((a.0 - b.0).norm() >= 10.0, "{:?} and {:?} too close", a, b);
        }
    }
}

#[test]
fn recovers_a_global_shift() {
    let _ = pretty_env_logger::try_init_timed();
    let field = blobs(80);
    let previous = render(&field, 0.0, 0.0);
    let current = render(&field, 2.3, -1.4);
    let tracker = ShiTomasiTracker::default();
    let keypoints: KeyPoints = tracker
        .detect(&previous)
        .iter()
        .copied()
        .filter(|kp| {
            kp.0.x > 20.0
                && kp.0.y > 20.0
                && kp.0.x < (WIDTH - 20) as f64
                && kp.0.y < (HEIGHT - 20) as f64
        })
        .collect();
    assert!(keypoints.len() > 20);

    let correspondences = tracker.track(&previous, &current, &keypoints);
    assert_eq!(
        correspondences.reference().len(),
        correspondences.current().len()
    );
    assert!(correspondences.len() * 2 >= keypoints.len());
    let accurate = correspondences
        .iter()
        .filter(|(reference, current)| {
            let moved = current.0 - reference.0;
            (moved.x - 2.3).abs() < 0.15 && (moved.y + 1.4).abs() < 0.15
        })
        .count();
    assert!(
        accurate * 10 >= correspondences.len() * 8,
        "only {} of {} tracks were accurate",
        accurate,
        correspondences.len()
    );
}

#[test]
fn empty_input_tracks_nothing() {
    let image = render(&blobs(10), 0.0, 0.0);
    let correspondences = ShiTomasiTracker::default().track(&image, &image, &KeyPoints::new());
    assert!(correspondences.is_empty());
}

#[test]
fn lost_points_are_dropped_in_order() {
    let field = blobs(80);
    let image = render(&field, 0.0, 0.0);
    let tracker = ShiTomasiTracker::default();
    let detected = tracker.detect(&image);
    let inside: Vec<KeyPoint> = detected
        .iter()
        .copied()
        .filter(|kp| kp.0.x > 30.0 && kp.0.y > 30.0)
        .take(2)
        .collect();
    assert_eq!(inside.len(), 2);
    let keypoints: KeyPoints = vec![inside[0], KeyPoint::new(-5.0, -5.0), inside[1]].into();
    let correspondences = tracker.track(&image, &image, &keypoints);
    assert_eq!(correspondences.reference().as_slice(), &inside[..]);
    for (reference, current) in correspondences.iter() {
        assert!((current.0 - reference.0).norm() < 0.05);
    }
}
