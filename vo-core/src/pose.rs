use derive_more::{AsMut, AsRef, From, Into};
use nalgebra::{IsometryMatrix3, Matrix4, Point3, Rotation3, Vector3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This trait is implemented by all the different poses in this library:
///
/// * [`CameraToWorld`] - Transforms a point in the camera frame into the world frame
/// * [`WorldToCamera`] - Transforms a point in the world frame into the camera frame
/// * [`CameraToCamera`] - Transforms a point from one camera frame into another camera frame
pub trait Pose: From<IsometryMatrix3<f64>> + Clone + Copy {
    type Inverse: Pose;

    /// Retrieve the isometry.
    fn isometry(self) -> IsometryMatrix3<f64>;

    /// Creates a pose with no change in position or orientation.
    fn identity() -> Self {
        IsometryMatrix3::identity().into()
    }

    /// Takes the inverse of the pose.
    fn inverse(self) -> Self::Inverse {
        self.isometry().inverse().into()
    }

    /// Applies a scale factor to the pose (scales the translation component)
    #[must_use]
    fn scale(self, scale: f64) -> Self {
        let mut isometry = self.isometry();
        isometry.translation.vector *= scale;
        isometry.into()
    }

    /// Create the pose from rotation and translation.
    fn from_parts(translation: Vector3<f64>, rotation: Rotation3<f64>) -> Self {
        IsometryMatrix3::from_parts(translation.into(), rotation).into()
    }

    /// Retrieve the rotation.
    fn rotation(self) -> Rotation3<f64> {
        self.isometry().rotation
    }

    /// Retrieve the translation.
    fn translation(self) -> Vector3<f64> {
        self.isometry().translation.vector
    }

    /// Retrieve the homogeneous matrix.
    fn homogeneous(self) -> Matrix4<f64> {
        self.isometry().to_homogeneous()
    }

    /// Transform a point from the input frame of this pose into its output frame.
    fn transform(self, point: Point3<f64>) -> Point3<f64> {
        self.isometry() * point
    }
}

/// This contains a world pose, which is a pose of the world relative to the camera.
/// This changes an absolute position into a vector relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WorldToCamera(pub IsometryMatrix3<f64>);

impl Pose for WorldToCamera {
    type Inverse = CameraToWorld;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

/// This contains a camera pose, which is a pose of the camera relative to the world.
/// This transforms camera points (with depth as `z`) into world coordinates.
/// This also tells you where the camera is located and oriented in the world.
///
/// In odometry, the world is the camera frame of the first image, so the pose starts at
/// [`Pose::identity`] and is only ever changed by [`CameraToWorld::compose`].
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraToWorld(pub IsometryMatrix3<f64>);

impl Pose for CameraToWorld {
    type Inverse = WorldToCamera;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

impl CameraToWorld {
    /// Chains a relative motion onto this pose after giving its translation a metric length.
    ///
    /// `relative` must map points from the new camera frame into the camera frame this pose
    /// currently describes. The result is:
    ///
    /// ```text
    /// t <- t + scale * R * t_rel
    /// R <- R * R_rel
    /// ```
    ///
    /// ```
    /// use vo_core::{CameraToCamera, CameraToWorld, Pose};
    /// use vo_core::nalgebra::{Rotation3, Vector3};
    ///
    /// let world = CameraToWorld::from_parts(
    ///     Vector3::new(1.0, 0.0, 0.0),
    ///     Rotation3::from_axis_angle(&Vector3::y_axis(), core::f64::consts::FRAC_PI_2),
    /// );
    /// let step = CameraToCamera::from_parts(Vector3::new(0.0, 0.0, 1.0), Rotation3::identity());
    /// let next = world.compose(step, 2.0);
    /// // Forward for the rotated camera is +x in the world.
    /// assert!((next.translation() - Vector3::new(3.0, 0.0, 0.0)).norm() < 1e-12);
    /// ```
    #[must_use]
    pub fn compose(self, relative: CameraToCamera, scale: f64) -> Self {
        (self.isometry() * relative.scale(scale).isometry()).into()
    }
}

/// This contains a relative pose that transforms a point in the camera space of one image
/// into the corresponding point in the camera space of another image. This transforms
/// the point from the camera space of camera `A` to camera `B`.
///
/// Camera space for a given camera is defined as thus:
///
/// * Origin is the optical center
/// * Positive z axis is forwards
/// * Positive y axis is down
/// * Positive x axis is right
///
/// Note that this is a right-handed coordinate space.
///
/// When recovered from two-view geometry, the translation is a unit vector and only its
/// direction is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraToCamera(pub IsometryMatrix3<f64>);

impl Pose for CameraToCamera {
    type Inverse = CameraToCamera;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}
