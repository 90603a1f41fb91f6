use alloc::vec::Vec;
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::Point2;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Allows the retrieval of the point on the image the feature came from.
pub trait ImagePoint {
    /// Retrieves the point on the image
    fn image_point(&self) -> Point2<f64>;
}

/// A point on an image frame. This type should be used when
/// the point location is on the image frame in pixel coordinates.
/// This means the keypoint is neither undistorted nor normalized.
///
/// For calibrated coordinates, use the projection type of a camera model
/// (like `vo_pinhole::NormalizedKeyPoint`).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct KeyPoint(pub Point2<f64>);

impl KeyPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self(Point2::new(x, y))
    }
}

impl ImagePoint for KeyPoint {
    fn image_point(&self) -> Point2<f64> {
        self.0
    }
}

/// An ordered set of keypoints on one image.
///
/// The position of a keypoint in the set is its identity, so the order must be preserved
/// by anything that filters the set. Duplicates are not rejected and the set may be empty.
#[derive(Debug, Clone, Default, PartialEq, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct KeyPoints(pub Vec<KeyPoint>);

impl KeyPoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }
}

impl FromIterator<KeyPoint> for KeyPoints {
    fn from_iter<I: IntoIterator<Item = KeyPoint>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for KeyPoints {
    type Item = KeyPoint;
    type IntoIter = alloc::vec::IntoIter<KeyPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a KeyPoints {
    type Item = &'a KeyPoint;
    type IntoIter = core::slice::Iter<'a, KeyPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
