use five_point::FivePoint;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use vo_core::{
    nalgebra::{Point3, Rotation3, Vector3},
    sample_consensus::{Estimator, Model},
    CameraToCamera, FeatureMatch, Pose,
};
use vo_pinhole::{EssentialMatrix, NormalizedKeyPoint};

const SAMPLE_POINTS: usize = 5;
const RESIDUAL_THRESHOLD: f64 = 1e-6;
const ESSENTIAL_THRESHOLD: f64 = 1e-5;

const ROT_MAGNITUDE: f64 = 0.3;
const POINT_BOX_SIZE: f64 = 2.0;
const POINT_DISTANCE: f64 = 3.0;
const MIN_DEPTH: f64 = 0.5;

#[test]
fn randomized() {
    let mut rng = Pcg64::from_seed([1; 32]);
    let successes = (0..1000).filter(|_| run_round(&mut rng)).count();
    eprintln!("successes: {}", successes);
    assert!(successes > 950);
}

#[test]
fn every_solution_satisfies_the_sample() {
    let mut rng = Pcg64::from_seed([2; 32]);
    for _ in 0..100 {
        let (_, matches) = some_test_data(&mut rng);
        let solutions = FivePoint::new().estimate(matches.iter().copied());
        assert!(!solutions.is_empty());
        for essential in &solutions {
            for m in &matches {
                assert!(essential.residual(m) < RESIDUAL_THRESHOLD);
            }
        }
    }
}

#[test]
fn generated_points_are_in_front_of_both_cameras() {
    let mut rng = Pcg64::from_seed([3; 32]);
    for _ in 0..10_000 {
        let (_, matches) = some_test_data(&mut rng);
        assert_eq!(matches.len(), SAMPLE_POINTS);
    }
    // Depth is linear in the point and monotonic in each angle over this range,
    // so the extremes of the sampling ranges bound it.
    let signs = [-1.0, 1.0];
    for &roll in &signs {
        for &pitch in &signs {
            let pose = CameraToCamera::from_parts(
                Vector3::new(0.0, 0.0, -1.0),
                Rotation3::from_euler_angles(roll * ROT_MAGNITUDE, pitch * ROT_MAGNITUDE, 0.0),
            );
            for &x in &signs {
                for &y in &signs {
                    for &z in &[POINT_DISTANCE, POINT_DISTANCE + POINT_BOX_SIZE] {
                        let corner = Point3::new(
                            0.5 * x * POINT_BOX_SIZE,
                            0.5 * y * POINT_BOX_SIZE,
                            z,
                        );
                        assert!(pose.transform(corner).z > MIN_DEPTH);
                    }
                }
            }
        }
    }
}

#[test]
fn recovers_pure_translation_along_x() {
    let pose = CameraToCamera::from_parts(Vector3::x(), Rotation3::identity());
    let points = [
        Point3::new(-1.0, -0.5, 4.0),
        Point3::new(0.8, -0.3, 5.5),
        Point3::new(0.2, 0.9, 3.5),
        Point3::new(-0.6, 0.4, 6.0),
        Point3::new(1.1, 0.7, 4.5),
    ];
    let matches: Vec<_> = points.iter().map(|&p| project(pose, p)).collect();
    let solutions = FivePoint::new().estimate(matches.iter().copied());
    let expected = EssentialMatrix::from(pose);
    assert!(solutions
        .iter()
        .any(|essential| same_up_to_scale(essential, &expected)));
}

fn run_round(rng: &mut Pcg64) -> bool {
    let (pose, matches) = some_test_data(rng);
    let expected = EssentialMatrix::from(pose);
    let solutions = match FivePoint::new().from_matches(matches.iter().copied()) {
        Some(solutions) => solutions,
        None => return false,
    };
    let found = solutions
        .iter()
        .any(|essential| same_up_to_scale(essential, &expected));
    if !found {
        eprintln!("no matching solution among {}", solutions.len());
    }
    found
}

fn same_up_to_scale(a: &EssentialMatrix, b: &EssentialMatrix) -> bool {
    let a = a.0.normalize();
    let b = b.0.normalize();
    (a - b).norm().min((a + b).norm()) < ESSENTIAL_THRESHOLD
}

fn project(pose: CameraToCamera, a: Point3<f64>) -> FeatureMatch<NormalizedKeyPoint> {
    FeatureMatch(
        NormalizedKeyPoint::from_camera_point(a).unwrap(),
        NormalizedKeyPoint::from_camera_point(pose.transform(a)).unwrap(),
    )
}

/// Gets a random relative pose and the matches it induces.
///
/// Rotations stay within `ROT_MAGNITUDE` per axis and translations within the unit cube,
/// which keeps every point of the box at least `MIN_DEPTH` in front of both cameras.
fn some_test_data(rng: &mut Pcg64) -> (CameraToCamera, Vec<FeatureMatch<NormalizedKeyPoint>>) {
    let rotation = Rotation3::from_euler_angles(
        rng.gen_range(-ROT_MAGNITUDE..ROT_MAGNITUDE),
        rng.gen_range(-ROT_MAGNITUDE..ROT_MAGNITUDE),
        rng.gen_range(-ROT_MAGNITUDE..ROT_MAGNITUDE),
    );
    let translation = Vector3::new(
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
    );
    let pose = CameraToCamera::from_parts(translation, rotation);

    let matches = (0..SAMPLE_POINTS)
        .map(|_| {
            let a = Point3::new(
                rng.gen_range(-0.5..0.5) * POINT_BOX_SIZE,
                rng.gen_range(-0.5..0.5) * POINT_BOX_SIZE,
                rng.gen_range(0.0..1.0) * POINT_BOX_SIZE + POINT_DISTANCE,
            );
            project(pose, a)
        })
        .collect();
    (pose, matches)
}
