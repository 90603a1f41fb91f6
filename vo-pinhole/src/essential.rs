use crate::NormalizedKeyPoint;
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use num_traits::Float;
use vo_core::{
    nalgebra::{Matrix2, Matrix3, Rotation3, Vector2, Vector3, SVD},
    sample_consensus::Model,
    CameraToCamera, FeatureMatch, Pose,
};

/// This stores an essential matrix, which is satisfied by the following constraint:
///
/// transpose(x') * E * x = 0
///
/// Where `x'` and `x` are homogeneous normalized image coordinates. You can get a
/// homogeneous normalized image coordinate by appending `1.0` to a `NormalizedKeyPoint`.
///
/// The essential matrix embodies the epipolar constraint between two images. Given that light
/// travels in a perfectly straight line (it will not, but for short distances it mostly does)
/// and assuming a pinhole camera model, for any point on the camera sensor, the light source
/// for that point exists somewhere along a line extending out from the bearing (direction
/// of travel) of that point. For a normalized image coordinate, that bearing is `(x, y, 1.0)`.
/// Every point along that line projects onto a single line in the other image, called the
/// epipolar line.
///
/// Computing `E * x` for a point `x` in the first image gives the epipolar line in the second
/// image. The second image coordinate `x'` lies on that line, so:
///
/// ```text
/// transpose(x') * E * x = 0
/// ```
///
/// When used as a [`Model`] over `FeatureMatch(x, x')`, the residual is the Sampson distance,
/// the first order approximation of the distance of the match from satisfying the constraint.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct EssentialMatrix(pub Matrix3<f64>);

impl EssentialMatrix {
    /// Can be used to enforce the constraints of an essential matrix to fix it.
    ///
    /// This finds the closest essential matrix in frobenius form. This just means
    /// that the two singular values are averaged and the null singular value is
    /// forced to zero.
    pub fn recondition(self, epsilon: f64, max_iterations: usize) -> Option<Self> {
        let mut svd = self.try_svd(true, true, epsilon, max_iterations)?;
        // Singular values come sorted in descending order.
        svd.singular_values[2] = 0.0;
        let new_singular = (svd.singular_values[0] + svd.singular_values[1]) / 2.0;
        svd.singular_values[0] = new_singular;
        svd.singular_values[1] = new_singular;
        svd.recompose().ok().map(Self)
    }

    /// Returns two possible rotations for the essential matrix along with a translation
    /// bearing of arbitrary length. The translation's sign is unknown and must be resolved
    /// with a cheirality check (see [`EssentialMatrix::pose_solver`]).
    ///
    /// `epsilon` is the threshold by which the singular value decomposition is considered
    /// complete. Making this smaller may improve the precision. It is recommended to
    /// set this to no higher than `1e-6`.
    ///
    /// `max_iterations` is the maximum number of iterations that singular value decomposition
    /// will run on this matrix. Use this in soft realtime systems to cap the execution time.
    /// A `max_iterations` of `0` may execute indefinitely and is not recommended.
    ///
    /// ```
    /// use vo_core::CameraToCamera;
    /// use vo_core::nalgebra::{IsometryMatrix3, Rotation3, Vector3};
    /// use vo_pinhole::EssentialMatrix;
    /// let pose = CameraToCamera(IsometryMatrix3::from_parts(
    ///     Vector3::new(-0.8, 0.4, 0.5).into(),
    ///     Rotation3::from_euler_angles(0.2, 0.3, 0.4),
    /// ));
    /// // Get the possible poses for the essential matrix created from `pose`.
    /// let (rot_a, rot_b, t) = EssentialMatrix::from(pose).possible_rotations_unscaled_translation(1e-6, 50).unwrap();
    /// // Compute residual rotations.
    /// let a_res = (rot_a.matrix() - pose.0.rotation.matrix()).norm();
    /// let b_res = (rot_b.matrix() - pose.0.rotation.matrix()).norm();
    /// // At least one rotation is correct.
    /// assert!(a_res < 1e-4 || b_res < 1e-4);
    /// // The translation points in the same (or reverse) direction
    /// let t_res = 1.0 - t.normalize().dot(&pose.0.translation.vector.normalize()).abs();
    /// assert!(t_res < 1e-4);
    /// ```
    pub fn possible_rotations_unscaled_translation(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<(Rotation3<f64>, Rotation3<f64>, Vector3<f64>)> {
        let Self(essential) = *self;

        // `W` from https://en.wikipedia.org/wiki/Essential_matrix#Finding_one_solution.
        let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let wt = w.transpose();

        let svd = SVD::try_new(essential, true, true, epsilon, max_iterations)?;
        let (mut u, mut v_t) = (svd.u?, svd.v_t?);
        // Force the determinants to be positive so the rotations are proper.
        // The last column of U and row of V* are undetermined since d = (a a 0).
        if u.determinant() < 0.0 {
            u.column_mut(2).neg_mut();
        }
        if v_t.determinant() < 0.0 {
            v_t.row_mut(2).neg_mut();
        }
        Some((
            Rotation3::from_matrix_unchecked(u * w * v_t),
            Rotation3::from_matrix_unchecked(u * wt * v_t),
            u.column(2).into_owned(),
        ))
    }

    /// See [`EssentialMatrix::possible_rotations_unscaled_translation`].
    ///
    /// This returns the rotations and their corresponding post-rotation translation bearing.
    ///
    /// ```
    /// use vo_core::CameraToCamera;
    /// use vo_core::nalgebra::{IsometryMatrix3, Rotation3, Vector3};
    /// use vo_pinhole::EssentialMatrix;
    /// let pose = CameraToCamera(IsometryMatrix3::from_parts(
    ///     Vector3::new(-0.8, 0.4, 0.5).into(),
    ///     Rotation3::from_euler_angles(0.2, 0.3, 0.4),
    /// ));
    /// let rbs = EssentialMatrix::from(pose).possible_unscaled_poses(1e-6, 50).unwrap();
    /// let one_correct = rbs.iter().any(|&upose| {
    ///     let angle_residual =
    ///         (upose.0.rotation.matrix() - pose.0.rotation.matrix()).norm();
    ///     let translation_residual =
    ///         1.0 - upose.0.translation.vector.normalize()
    ///                    .dot(&pose.0.translation.vector.normalize());
    ///     angle_residual < 1e-4 && translation_residual < 1e-4
    /// });
    /// assert!(one_correct);
    /// ```
    pub fn possible_unscaled_poses(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<[CameraToCamera; 4]> {
        self.possible_rotations_unscaled_translation(epsilon, max_iterations)
            .map(|(rot_a, rot_b, t)| {
                [
                    CameraToCamera::from_parts(t, rot_a),
                    CameraToCamera::from_parts(t, rot_b),
                    CameraToCamera::from_parts(-t, rot_a),
                    CameraToCamera::from_parts(-t, rot_b),
                ]
            })
    }

    /// The Sampson distance of the match `x <-> x'` from the epipolar constraint.
    ///
    /// This is the first order approximation of the geometric reprojection error,
    /// measured in normalized image coordinates.
    pub fn sampson_distance(&self, a: NormalizedKeyPoint, b: NormalizedKeyPoint) -> f64 {
        let Self(mat) = *self;
        let a = a.homogeneous();
        let b = b.homogeneous();
        let ea = mat * a;
        let etb = mat.transpose() * b;
        let constraint = b.dot(&ea);
        let gradient = ea.x * ea.x + ea.y * ea.y + etb.x * etb.x + etb.y * etb.y;
        if gradient == 0.0 {
            return Float::abs(constraint);
        }
        Float::abs(constraint) / Float::sqrt(gradient)
    }

    /// Return a [`PoseSolver`] that picks the physically valid pose out of the four
    /// possible ones using the matches that produced this essential matrix.
    pub fn pose_solver(&self) -> PoseSolver {
        PoseSolver::new(*self)
    }
}

/// Generates an essential matrix corresponding to this relative camera pose.
///
/// If a point `a` is transformed using [`Pose::transform`] into
/// a point `b`, then the essential matrix returned by this method will
/// give a residual of approximately `0.0` when you call
/// `essential.residual(&FeatureMatch(a, b))` with both points projected onto
/// the virtual image plane.
impl From<CameraToCamera> for EssentialMatrix {
    fn from(pose: CameraToCamera) -> Self {
        let isometry = pose.isometry();
        Self(isometry.translation.vector.cross_matrix() * *isometry.rotation.matrix())
    }
}

impl Model<FeatureMatch<NormalizedKeyPoint>> for EssentialMatrix {
    fn residual(&self, data: &FeatureMatch<NormalizedKeyPoint>) -> f64 {
        let &FeatureMatch(a, b) = data;
        self.sampson_distance(a, b)
    }
}

/// Resolves which of the four decompositions of an [`EssentialMatrix`] is the real one.
///
/// Every match is triangulated under each candidate pose. The candidate that puts the
/// most points in front of both cameras wins.
#[derive(Copy, Clone, Debug)]
pub struct PoseSolver {
    essential: EssentialMatrix,
    epsilon: f64,
    max_iterations: usize,
}

impl PoseSolver {
    /// Creates a solver with `epsilon = 1e-12` and `max_iterations = 1000` for the SVD.
    pub fn new(essential: EssentialMatrix) -> Self {
        Self {
            essential,
            epsilon: 1e-12,
            max_iterations: 1000,
        }
    }

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

    /// Returns the pose with unit translation that maps points from the camera of the
    /// first keypoint of each match into the camera of the second keypoint.
    ///
    /// Returns `None` if the decomposition fails or no candidate puts a single point in
    /// front of both cameras.
    ///
    /// ```
    /// use vo_core::{CameraToCamera, FeatureMatch, Pose};
    /// use vo_core::nalgebra::{Point3, Rotation3, Vector3};
    /// use vo_pinhole::{EssentialMatrix, NormalizedKeyPoint};
    /// let pose = CameraToCamera::from_parts(
    ///     Vector3::new(0.6, 0.0, 0.8),
    ///     Rotation3::from_euler_angles(0.02, -0.1, 0.01),
    /// );
    /// let matches = (0..20).map(|i| {
    ///     let i = i as f64;
    ///     let a = Point3::new((i * 0.37).sin(), (i * 0.91).cos(), 4.0 + (i * 0.13).sin());
    ///     let b = pose.transform(a);
    ///     FeatureMatch(
    ///         NormalizedKeyPoint::from_camera_point(a).unwrap(),
    ///         NormalizedKeyPoint::from_camera_point(b).unwrap(),
    ///     )
    /// });
    /// let solved = EssentialMatrix::from(pose).pose_solver().solve_unscaled(matches).unwrap();
    /// assert!((solved.rotation().matrix() - pose.rotation().matrix()).norm() < 1e-6);
    /// assert!((solved.translation() - pose.translation()).norm() < 1e-6);
    /// ```
    pub fn solve_unscaled<I>(&self, matches: I) -> Option<CameraToCamera>
    where
        I: Iterator<Item = FeatureMatch<NormalizedKeyPoint>> + Clone,
    {
        let candidates = self
            .essential
            .possible_unscaled_poses(self.epsilon, self.max_iterations)?;
        let mut best: Option<(usize, CameraToCamera)> = None;
        for candidate in candidates {
            let score = matches
                .clone()
                .filter(|&FeatureMatch(a, b)| in_front_of_both(candidate, a, b))
                .count();
            if best.map(|(best_score, _)| score > best_score).unwrap_or(true) {
                best = Some((score, candidate));
            }
        }
        best.filter(|&(score, _)| score > 0)
            .map(|(_, pose)| CameraToCamera::from_parts(pose.translation().normalize(), pose.rotation()))
    }
}

/// Solves `d_b * b = d_a * R * a + t` in the least squares sense and checks both depths.
fn in_front_of_both(pose: CameraToCamera, a: NormalizedKeyPoint, b: NormalizedKeyPoint) -> bool {
    let rotated = pose.rotation() * a.homogeneous();
    let b = b.homogeneous();
    let t = pose.translation();
    // Columns are `R a` and `-b`.
    let normal = Matrix2::new(
        rotated.dot(&rotated),
        -rotated.dot(&b),
        -rotated.dot(&b),
        b.dot(&b),
    );
    let rhs = Vector2::new(-rotated.dot(&t), b.dot(&t));
    match normal.try_inverse() {
        Some(inverse) => {
            let depths = inverse * rhs;
            depths.x > 0.0 && depths.y > 0.0
        }
        None => false,
    }
}
