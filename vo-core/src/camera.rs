use crate::{ImagePoint, KeyPoint, KeyPoints};
use alloc::vec::Vec;

/// Allows conversion between the point on an image and the internal projection
/// which describes the ray leaving the camera through that point.
///
/// The projection X axis points right, Y axis points down, and Z axis points forwards.
/// The image point uses the same coordiate frame. Its Y is down and its X is right.
pub trait CameraModel {
    /// The calibrated representation of an image point.
    type Projection;

    /// Removes lens distortion from a pixel location, returning the pixel location it
    /// would have had under an ideal lens.
    fn undistort<P>(&self, point: P) -> KeyPoint
    where
        P: ImagePoint;

    /// Removes the intrinsics from an undistorted pixel location.
    fn unproject<P>(&self, point: P) -> Self::Projection
    where
        P: ImagePoint;

    /// Goes straight from a raw pixel location to its projection.
    fn calibrate<P>(&self, point: P) -> Self::Projection
    where
        P: ImagePoint,
    {
        self.unproject(self.undistort(point))
    }

    /// Undistorts a whole keypoint set, preserving order.
    fn undistort_all(&self, points: &KeyPoints) -> KeyPoints {
        points.iter().map(|&point| self.undistort(point)).collect()
    }

    /// Unprojects a whole keypoint set, preserving order.
    fn unproject_all(&self, points: &KeyPoints) -> Vec<Self::Projection> {
        points.iter().map(|&point| self.unproject(point)).collect()
    }

    /// Calibrates a whole keypoint set, preserving order.
    fn calibrate_all(&self, points: &KeyPoints) -> Vec<Self::Projection> {
        points.iter().map(|&point| self.calibrate(point)).collect()
    }
}
