//! Sparse feature tracking for visual odometry.
//!
//! Corners are found with the Shi-Tomasi detector ([`GoodFeatures`]) and then
//! followed from frame to frame with pyramidal Lucas-Kanade optical flow
//! ([`LucasKanade`]). Both are wrapped up in [`ShiTomasiTracker`], which is one
//! implementation of the [`FeatureTracker`] interface that odometry consumes.

mod corners;
mod derivatives;
mod flow;
pub mod image;
mod pyramid;

pub use corners::GoodFeatures;
pub use flow::LucasKanade;
pub use crate::image::GrayFloatImage;
pub use pyramid::{Pyramid, PyramidLevel};
pub use vo_core::{Correspondences, KeyPoint, KeyPoints};

use log::*;

/// A strategy for finding keypoints and following them into the next image.
///
/// Implementors hold no state between calls.
pub trait FeatureTracker {
    /// Finds a fresh set of keypoints in the image.
    ///
    /// An image without any usable keypoints yields an empty set.
    fn detect(&self, image: &GrayFloatImage) -> KeyPoints;

    /// Follows `keypoints` from `previous` into `current`.
    ///
    /// The reference side of the result holds the survivors as they were in
    /// `previous` and the current side holds where they went, both in the
    /// input order. Lost points are dropped for good.
    fn track(
        &self,
        previous: &GrayFloatImage,
        current: &GrayFloatImage,
        keypoints: &KeyPoints,
    ) -> Correspondences;
}

/// Detects Shi-Tomasi corners and tracks them with pyramidal Lucas-Kanade.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ShiTomasiTracker {
    pub detector: GoodFeatures,
    pub flow: LucasKanade,
}

impl ShiTomasiTracker {
    pub fn new(detector: GoodFeatures, flow: LucasKanade) -> Self {
        Self { detector, flow }
    }
}

impl FeatureTracker for ShiTomasiTracker {
    fn detect(&self, image: &GrayFloatImage) -> KeyPoints {
        self.detector.detect(image)
    }

    fn track(
        &self,
        previous: &GrayFloatImage,
        current: &GrayFloatImage,
        keypoints: &KeyPoints,
    ) -> Correspondences {
        if keypoints.is_empty() {
            trace!("nothing to track");
            return Correspondences::empty();
        }
        let previous_pyramid = self.flow.pyramid(previous);
        let current_pyramid = self.flow.pyramid(current);
        let correspondences: Correspondences = keypoints
            .iter()
            .zip(self.flow.track(&previous_pyramid, &current_pyramid, keypoints))
            .filter_map(|(&reference, tracked)| tracked.map(|current| (reference, current)))
            .collect();
        info!(
            "{} of {} keypoints survived tracking",
            correspondences.len(),
            keypoints.len()
        );
        correspondences
    }
}
