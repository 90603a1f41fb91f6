use log::*;
use vo_core::{
    sample_consensus::{Consensus, Estimator},
    CameraModel, CameraToCamera, Correspondences, FeatureMatch,
};
use vo_pinhole::{EssentialMatrix, NormalizedKeyPoint};

type Match = FeatureMatch<NormalizedKeyPoint>;

/// A relative motion recovered from two views.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEstimate {
    /// Maps points from the current camera into the reference camera.
    /// The translation has unit length.
    pub pose: CameraToCamera,
    /// The number of correspondences that agreed with the essential matrix.
    pub inliers: usize,
}

/// Recovers the relative motion between two frames from their correspondences.
///
/// An essential matrix is fit robustly with the consensus algorithm `C` driving the
/// minimal estimator `E`, then the inliers pick which of its four decompositions
/// is physically valid.
#[derive(Debug, Clone)]
pub struct PoseEstimator<C, E> {
    consensus: C,
    estimator: E,
    min_correspondences: usize,
    epsilon: f64,
    max_iterations: usize,
}

impl<C, E> PoseEstimator<C, E>
where
    C: Consensus<E, Match>,
    E: Estimator<Match, Model = EssentialMatrix>,
{
    pub fn new(consensus: C, estimator: E) -> Self {
        Self {
            consensus,
            estimator,
            min_correspondences: E::MIN_SAMPLES,
            epsilon: 1e-12,
            max_iterations: 1000,
        }
    }

    /// Fewer correspondences than this, or than the estimator's minimal sample, yield no pose.
    #[must_use]
    pub fn min_correspondences(self, min_correspondences: usize) -> Self {
        Self {
            min_correspondences,
            ..self
        }
    }

    /// The SVD epsilon used when decomposing the essential matrix.
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    pub fn required_correspondences(&self) -> usize {
        self.min_correspondences.max(E::MIN_SAMPLES)
    }

    /// Undistorts and unprojects both sides of the correspondences, then estimates
    /// the motion from the current frame into the reference frame.
    pub fn estimate<M>(&mut self, camera: &M, correspondences: &Correspondences) -> Option<PoseEstimate>
    where
        M: CameraModel<Projection = NormalizedKeyPoint>,
    {
        let reference = camera.calibrate_all(correspondences.reference());
        let current = camera.calibrate_all(correspondences.current());
        self.estimate_rays(&reference, &current)
    }

    /// Estimates the motion from already normalized rays.
    ///
    /// Index `i` of `reference` and `current` must belong to the same track.
    pub fn estimate_rays(
        &mut self,
        reference: &[NormalizedKeyPoint],
        current: &[NormalizedKeyPoint],
    ) -> Option<PoseEstimate> {
        if reference.len() != current.len() {
            warn!(
                "refusing to estimate a pose from {} reference and {} current rays",
                reference.len(),
                current.len()
            );
            return None;
        }
        if reference.len() < self.required_correspondences() {
            debug!(
                "{} correspondences are too few to estimate a pose",
                reference.len()
            );
            return None;
        }
        let matches: Vec<Match> = current
            .iter()
            .zip(reference)
            .map(|(&current, &reference)| FeatureMatch(current, reference))
            .collect();

        let (essential, inliers) = self
            .consensus
            .model_inliers(&self.estimator, matches.iter().copied())?;
        let inliers: Vec<usize> = inliers.into_iter().collect();
        trace!("essential matrix {:?} has {} inliers", essential.0, inliers.len());

        let pose = essential
            .pose_solver()
            .epsilon(self.epsilon)
            .max_iterations(self.max_iterations)
            .solve_unscaled(inliers.iter().map(|&ix| matches[ix]))?;
        Some(PoseEstimate {
            pose,
            inliers: inliers.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ransac;
    use approx::assert_relative_eq;
    use five_point::FivePoint;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;
    use vo_core::{
        nalgebra::{Point3, Rotation3, Vector3},
        Pose,
    };

    fn estimator() -> PoseEstimator<Ransac<Pcg64>, FivePoint> {
        PoseEstimator::new(
            Ransac::new(0.0003, 0.999, 1000, Pcg64::from_seed([4; 32])),
            FivePoint::new(),
        )
    }

    /// Points seen from a reference camera at the origin and a current camera moved by `motion`.
    fn rays(
        motion: CameraToCamera,
        count: usize,
        rng: &mut Pcg64,
    ) -> (Vec<NormalizedKeyPoint>, Vec<NormalizedKeyPoint>) {
        let to_current = motion.inverse();
        let mut reference = vec![];
        let mut current = vec![];
        while reference.len() < count {
            let point = Point3::new(
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-2.0..2.0),
                rng.gen_range(4.0..12.0),
            );
            let seen = to_current.transform(point);
            if let (Some(r), Some(c)) = (
                NormalizedKeyPoint::from_camera_point(point),
                NormalizedKeyPoint::from_camera_point(seen),
            ) {
                reference.push(r);
                current.push(c);
            }
        }
        (reference, current)
    }

    #[test]
    fn recovers_translation_along_x() {
        let mut rng = Pcg64::from_seed([3; 32]);
        let motion = CameraToCamera::from_parts(Vector3::x(), Rotation3::identity());
        let (reference, current) = rays(motion, 50, &mut rng);
        let estimate = estimator().estimate_rays(&reference, &current).unwrap();
        assert_eq!(estimate.inliers, 50);
        assert_relative_eq!(estimate.pose.rotation(), Rotation3::identity(), epsilon = 1e-6);
        let t = estimate.pose.translation();
        assert!((t.norm() - 1.0).abs() < 1e-9);
        assert!(t.angle(&Vector3::x()) < 1e-4, "{:?}", t);
    }

    #[test]
    fn recovers_rotation_and_translation() {
        let mut rng = Pcg64::from_seed([5; 32]);
        let motion = CameraToCamera::from_parts(
            Vector3::new(0.1, -0.05, 1.0),
            Rotation3::from_euler_angles(0.01, 0.05, -0.02),
        );
        let (reference, current) = rays(motion, 100, &mut rng);
        let estimate = estimator().estimate_rays(&reference, &current).unwrap();
        assert_relative_eq!(estimate.pose.rotation(), motion.rotation(), epsilon = 1e-5);
        assert!(
            estimate
                .pose
                .translation()
                .angle(&motion.translation().normalize())
                < 1e-4
        );
    }

    #[test]
    fn too_few_rays() {
        let mut rng = Pcg64::from_seed([3; 32]);
        let motion = CameraToCamera::from_parts(Vector3::x(), Rotation3::identity());
        let (reference, current) = rays(motion, 4, &mut rng);
        assert!(estimator().estimate_rays(&reference, &current).is_none());
        assert!(estimator()
            .min_correspondences(8)
            .estimate_rays(&reference[..3], &current[..3])
            .is_none());
    }

    #[test]
    fn mismatched_lengths() {
        let mut rng = Pcg64::from_seed([3; 32]);
        let motion = CameraToCamera::from_parts(Vector3::x(), Rotation3::identity());
        let (reference, current) = rays(motion, 10, &mut rng);
        assert!(estimator().estimate_rays(&reference, &current[..9]).is_none());
    }
}
