//! This crate plugs into `vo-core` and provides a pinhole camera model with Brown-Conrady lens distortion.
//! It can be used to convert image coordinates into normalized image coordinates on the virtual image plane
//! at `z = 1`, which is what two-view geometry operates on. It also provides the [`EssentialMatrix`] and the
//! [`PoseSolver`] that turns an essential matrix into a relative pose.

#![no_std]

#[cfg(test)]
extern crate std;

mod essential;

pub use essential::*;

use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use num_traits::Float;
use vo_core::nalgebra::{Matrix3, Point2, Point3, Vector2, Vector3};
use vo_core::{CameraModel, ImagePoint, KeyPoint};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A point in normalized image coordinates. This keypoint has been corrected
/// for distortion and normalized based on the camera intrinsic matrix.
/// Please note that the intrinsic matrix accounts for the natural focal length
/// and any magnification to the image. Ultimately, the key points must be
/// represented by their position on the camera sensor and normalized to the
/// focal length of the camera.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct NormalizedKeyPoint(pub Point2<f64>);

impl NormalizedKeyPoint {
    /// Conceptually appends a `1.0` component to the normalized keypoint to create
    /// a point on the virtual image plane and then multiplies
    /// the point by `depth`. This `z`/`depth` component must be the depth of
    /// the keypoint in the direction the camera is pointing from the
    /// camera's optical center.
    pub fn with_depth(self, depth: f64) -> Point3<f64> {
        (self.coords * depth).push(depth).into()
    }

    /// Get the virtual image point as a [`Point3`].
    ///
    /// The virtual image point is the point that is formed on the virtual
    /// image plane at a depth 1.0 in front of the camera.
    pub fn virtual_image_point(self) -> Point3<f64> {
        self.coords.push(1.0).into()
    }

    /// The homogeneous form `(x, y, 1)` of the keypoint.
    pub fn homogeneous(self) -> Vector3<f64> {
        self.coords.push(1.0)
    }

    /// Projects a point in camera space onto the virtual image plane.
    ///
    /// Returns `None` if the point lies on the plane of the optical center.
    pub fn from_camera_point(point: Point3<f64>) -> Option<Self> {
        Point2::from_homogeneous(point.coords).map(Self)
    }
}

/// This contains intrinsic camera parameters as per
/// [this Wikipedia page](https://en.wikipedia.org/wiki/Camera_resectioning#Intrinsic_parameters).
///
/// For a high quality camera, this may be sufficient to normalize image coordinates.
/// Undistortion may also be necessary to normalize image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraIntrinsics {
    pub focals: Vector2<f64>,
    pub principal_point: Point2<f64>,
    pub skew: f64,
}

impl CameraIntrinsics {
    /// Creates camera intrinsics that would create an identity intrinsic matrix.
    /// This would imply that the pixel positions have an origin at `0,0`,
    /// the pixel distance unit is the focal length, pixels are square,
    /// and there is no skew.
    pub fn identity() -> Self {
        Self {
            focals: Vector2::new(1.0, 1.0),
            skew: 0.0,
            principal_point: Point2::new(0.0, 0.0),
        }
    }

    pub fn focals(self, focals: Vector2<f64>) -> Self {
        Self { focals, ..self }
    }

    pub fn focal(self, focal: f64) -> Self {
        Self {
            focals: Vector2::new(focal, focal),
            ..self
        }
    }

    pub fn principal_point(self, principal_point: Point2<f64>) -> Self {
        Self {
            principal_point,
            ..self
        }
    }

    pub fn skew(self, skew: f64) -> Self {
        Self { skew, ..self }
    }

    #[rustfmt::skip]
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focals.x,  self.skew,      self.principal_point.x,
            0.0,            self.focals.y,  self.principal_point.y,
            0.0,            0.0,            1.0,
        )
    }

    /// The inverse of [`CameraIntrinsics::matrix`].
    ///
    /// Returns `None` if either focal length is zero.
    ///
    /// ```
    /// use vo_pinhole::CameraIntrinsics;
    /// use vo_core::nalgebra::{Matrix3, Point2, Vector2};
    /// let intrinsics = CameraIntrinsics::identity()
    ///     .focals(Vector2::new(718.856, 718.856))
    ///     .principal_point(Point2::new(607.1928, 185.2157));
    /// let inverse = intrinsics.inverse_matrix().unwrap();
    /// assert!((inverse * intrinsics.matrix() - Matrix3::identity()).norm() < 1e-12);
    /// ```
    #[rustfmt::skip]
    pub fn inverse_matrix(&self) -> Option<Matrix3<f64>> {
        if self.focals.x == 0.0 || self.focals.y == 0.0 {
            return None;
        }
        let ifx = 1.0 / self.focals.x;
        let ify = 1.0 / self.focals.y;
        let skew = -self.skew * ifx * ify;
        Some(Matrix3::new(
            ifx,    skew,   -self.principal_point.x * ifx - self.principal_point.y * skew,
            0.0,    ify,    -self.principal_point.y * ify,
            0.0,    0.0,    1.0,
        ))
    }

    /// Converts a point on the virtual image plane back into pixel coordinates.
    pub fn project(&self, projection: NormalizedKeyPoint) -> KeyPoint {
        let y = projection.y * self.focals.y;
        let x = projection.x * self.focals.x + self.skew * projection.y;
        KeyPoint(Point2::new(x, y) + self.principal_point.coords)
    }
}

impl CameraModel for CameraIntrinsics {
    type Projection = NormalizedKeyPoint;

    /// An ideal lens, so this does nothing.
    fn undistort<P>(&self, point: P) -> KeyPoint
    where
        P: ImagePoint,
    {
        KeyPoint(point.image_point())
    }

    /// Takes in a point from an image in pixel coordinates and
    /// converts it to a [`NormalizedKeyPoint`].
    ///
    /// ```
    /// use vo_core::{KeyPoint, CameraModel};
    /// use vo_pinhole::{NormalizedKeyPoint, CameraIntrinsics};
    /// use vo_core::nalgebra::{Vector2, Point2};
    /// let intrinsics = CameraIntrinsics {
    ///     focals: Vector2::new(800.0, 900.0),
    ///     principal_point: Point2::new(500.0, 600.0),
    ///     skew: 1.7,
    /// };
    /// let kp = KeyPoint(Point2::new(471.0, 322.0));
    /// let nkp = intrinsics.unproject(kp);
    /// let calibration_matrix = intrinsics.matrix();
    /// let distance = (kp.to_homogeneous() - calibration_matrix * nkp.homogeneous()).norm();
    /// assert!(distance < 1e-9);
    /// ```
    fn unproject<P>(&self, point: P) -> NormalizedKeyPoint
    where
        P: ImagePoint,
    {
        let centered = point.image_point() - self.principal_point;
        let y = centered.y / self.focals.y;
        let x = (centered.x - self.skew * y) / self.focals.x;
        NormalizedKeyPoint(Point2::new(x, y))
    }
}

/// Radial and tangential lens distortion as per the
/// [Brown-Conrady model](https://en.wikipedia.org/wiki/Distortion_(optics)#Software_correction).
///
/// Coefficients are in the same order OpenCV stores them (`k1, k2, p1, p2, k3`).
/// Given normalized coordinates `(x, y)` and `r² = x² + y²`, the distorted coordinates are:
///
/// ```text
/// x' = x (1 + k1 r² + k2 r⁴ + k3 r⁶) + 2 p1 x y + p2 (r² + 2 x²)
/// y' = y (1 + k1 r² + k2 r⁴ + k3 r⁶) + p1 (r² + 2 y²) + 2 p2 x y
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct BrownConrady {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl BrownConrady {
    /// Below this coefficient norm the lens is treated as ideal.
    pub const DISTORTION_EPSILON: f64 = 1e-10;

    /// Fixed-point iterations used to invert the model.
    pub const UNDISTORT_ITERATIONS: usize = 5;

    pub fn new(k1: f64, k2: f64, p1: f64, p2: f64) -> Self {
        Self {
            k1,
            k2,
            p1,
            p2,
            k3: 0.0,
        }
    }

    /// The coefficient vector `(k1, k2, p1, p2, k3)`.
    pub fn coefficients(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// True when the norm of the coefficient vector is not negligible.
    pub fn is_distorted(&self) -> bool {
        let norm_squared: f64 = self.coefficients().iter().map(|c| c * c).sum();
        Float::sqrt(norm_squared) > Self::DISTORTION_EPSILON
    }

    fn radial(&self, r2: f64) -> f64 {
        1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3))
    }

    fn tangential(&self, point: Vector2<f64>, r2: f64) -> Vector2<f64> {
        let (x, y) = (point.x, point.y);
        Vector2::new(
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }

    /// Applies the distortion to a point in normalized coordinates.
    pub fn distort(&self, point: Point2<f64>) -> Point2<f64> {
        let r2 = point.coords.norm_squared();
        (point.coords * self.radial(r2) + self.tangential(point.coords, r2)).into()
    }

    /// Removes the distortion from a point in normalized coordinates.
    ///
    /// The model has no closed form inverse, so this iterates
    /// `p <- (distorted - tangential(p)) / radial(p)` a fixed number of times,
    /// the same way OpenCV's `undistortPoints` does.
    ///
    /// ```
    /// use vo_pinhole::BrownConrady;
    /// use vo_core::nalgebra::Point2;
    /// let lens = BrownConrady::new(-0.28, 0.07, 0.0002, 0.00002);
    /// let ideal = Point2::new(0.21, -0.13);
    /// let recovered = lens.undistort(lens.distort(ideal));
    /// assert!((recovered - ideal).norm() < 1e-6);
    /// ```
    pub fn undistort(&self, distorted: Point2<f64>) -> Point2<f64> {
        let mut point = distorted.coords;
        for _ in 0..Self::UNDISTORT_ITERATIONS {
            let r2 = point.norm_squared();
            let radial = self.radial(r2);
            if radial == 0.0 {
                break;
            }
            point = (distorted.coords - self.tangential(point, r2)) / radial;
        }
        point.into()
    }
}

/// A calibrated pinhole camera with a [`BrownConrady`] lens.
///
/// The inverse of the intrinsic matrix is computed once when the camera is created.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct PinholeCamera {
    intrinsics: CameraIntrinsics,
    distortion: BrownConrady,
    inverse: Matrix3<f64>,
    distorted: bool,
}

impl PinholeCamera {
    /// Returns `None` if the intrinsic matrix is singular.
    pub fn new(intrinsics: CameraIntrinsics, distortion: BrownConrady) -> Option<Self> {
        Some(Self {
            intrinsics,
            distortion,
            inverse: intrinsics.inverse_matrix()?,
            distorted: distortion.is_distorted(),
        })
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    pub fn distortion(&self) -> &BrownConrady {
        &self.distortion
    }

    pub fn inverse_matrix(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    pub fn is_distorted(&self) -> bool {
        self.distorted
    }

    fn normalize(&self, point: Point2<f64>) -> Point2<f64> {
        let normalized = self.inverse * point.to_homogeneous();
        Point2::new(normalized.x / normalized.z, normalized.y / normalized.z)
    }
}

impl CameraModel for PinholeCamera {
    type Projection = NormalizedKeyPoint;

    /// Maps a raw pixel location to the pixel location it would have under an ideal lens.
    ///
    /// The point is returned untouched when the lens is not distorted.
    ///
    /// ```
    /// use vo_core::{CameraModel, KeyPoint};
    /// use vo_pinhole::{BrownConrady, CameraIntrinsics, PinholeCamera};
    /// use vo_core::nalgebra::Point2;
    /// let camera = PinholeCamera::new(
    ///     CameraIntrinsics::identity().focal(500.0).principal_point(Point2::new(320.0, 240.0)),
    ///     BrownConrady::default(),
    /// )
    /// .unwrap();
    /// let kp = KeyPoint::new(13.5, 401.25);
    /// assert_eq!(camera.undistort(kp), kp);
    /// ```
    fn undistort<P>(&self, point: P) -> KeyPoint
    where
        P: ImagePoint,
    {
        let point = point.image_point();
        if !self.distorted {
            return KeyPoint(point);
        }
        let ideal = self.distortion.undistort(self.normalize(point));
        self.intrinsics.project(NormalizedKeyPoint(ideal))
    }

    /// Applies the inverse intrinsic matrix to the homogeneous pixel location.
    ///
    /// This does not remove distortion. Use [`CameraModel::calibrate`] for that.
    fn unproject<P>(&self, point: P) -> NormalizedKeyPoint
    where
        P: ImagePoint,
    {
        NormalizedKeyPoint(self.normalize(point.image_point()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn kitti() -> CameraIntrinsics {
        CameraIntrinsics::identity()
            .focals(Vector2::new(718.856, 718.856))
            .principal_point(Point2::new(607.1928, 185.2157))
    }

    #[test]
    fn zero_distortion_is_not_distorted() {
        assert!(!BrownConrady::default().is_distorted());
        assert!(!BrownConrady::new(1e-12, 0.0, 0.0, 0.0).is_distorted());
        assert!(BrownConrady::new(1e-6, 0.0, 0.0, 0.0).is_distorted());
    }

    #[test]
    fn undistort_identity_without_distortion() {
        let camera = PinholeCamera::new(kitti(), BrownConrady::default()).unwrap();
        for &(x, y) in &[(0.0, 0.0), (1241.0, 376.0), (-5.5, 900.125), (607.1928, 185.2157)] {
            let kp = KeyPoint::new(x, y);
            assert_eq!(camera.undistort(kp), kp);
        }
    }

    #[test]
    fn unproject_matches_inverse_intrinsics() {
        let camera = PinholeCamera::new(kitti(), BrownConrady::default()).unwrap();
        let kp = KeyPoint::new(100.0, 50.0);
        let normalized = camera.unproject(kp);
        assert_relative_eq!(
            normalized.0,
            Point2::new(
                (100.0 - 607.1928) / 718.856,
                (50.0 - 185.2157) / 718.856
            ),
            epsilon = 1e-12
        );
        // Both CameraModel implementations agree.
        assert_relative_eq!(normalized.0, kitti().unproject(kp).0, epsilon = 1e-12);
    }

    #[test]
    fn undistort_inverts_distortion_in_pixels() {
        let intrinsics = kitti();
        let lens = BrownConrady::new(-0.1, 0.01, 0.001, -0.0005);
        let camera = PinholeCamera::new(intrinsics, lens).unwrap();
        let ideal = NormalizedKeyPoint(Point2::new(0.12, -0.05));
        let observed = intrinsics.project(NormalizedKeyPoint(lens.distort(ideal.0)));
        let corrected = camera.undistort(observed);
        assert_relative_eq!(corrected.0, intrinsics.project(ideal).0, epsilon = 1e-4);
        assert_relative_eq!(camera.calibrate(observed).0, ideal.0, epsilon = 1e-6);
    }

    #[test]
    fn singular_intrinsics_are_rejected() {
        let intrinsics = CameraIntrinsics::identity().focal(0.0);
        assert!(PinholeCamera::new(intrinsics, BrownConrady::default()).is_none());
    }

    #[test]
    fn project_inverts_unproject() {
        let intrinsics = kitti().skew(0.4);
        let kp = KeyPoint::new(471.0, 322.0);
        assert_relative_eq!(
            intrinsics.project(intrinsics.unproject(kp)).0,
            kp.0,
            epsilon = 1e-9
        );
    }
}
