//! # Monocular Visual Odometry
//!
//! This crate turns a stream of images from a single calibrated camera into a camera trajectory.
//!
//! Each frame goes through the same steps:
//!
//! 1. Keypoints from the previous frame are tracked into the current one with a [`FeatureTracker`].
//! 2. The correspondences are undistorted and unprojected by the camera model and a
//!    [`PoseEstimator`] recovers the relative motion, with a translation of unknown length.
//! 3. A [`ScaleOracle`] supplies the metric length of the motion. Motions that are too short
//!    to have a reliable direction are dropped, the rest are chained onto the camera pose.
//! 4. If too few keypoints survived tracking, new ones are detected in the current frame.
//!
//! Frames that cannot be tracked stall without changing the pose. See [`FrameOutcome`].
//!
//! ```no_run
//! use mono_vo::{CameraSettings, GroundTruthTrack, OdometrySettings, VisualOdometry};
//! use mono_vo::nalgebra::Point3;
//!
//! # fn main() -> Result<(), mono_vo::OdometryError> {
//! let camera = CameraSettings::from_path("camera.json")?.camera()?;
//! let settings = OdometrySettings::from_path("odometry.json")?;
//! let ground_truth: GroundTruthTrack = vec![Point3::origin(); 2].into_iter().collect();
//! let mut odometry = VisualOdometry::from_settings(settings, camera, ground_truth);
//! for (frame, path) in ["000000.png", "000001.png"].iter().enumerate() {
//!     let image = image::open(path).expect("failed to load image");
//!     let outcome = odometry.process_frame(frame, &image)?;
//!     println!("{:?} {:?}", outcome, odometry.pose());
//! }
//! # Ok(())
//! # }
//! ```

mod calibration;
mod error;
mod odometry;
mod pose_estimator;
mod ransac;
mod scale;
mod settings;
mod sink;
mod trajectory;

pub use calibration::*;
pub use error::*;
pub use odometry::*;
pub use pose_estimator::*;
pub use ransac::*;
pub use scale::*;
pub use settings::*;
pub use sink::*;
pub use trajectory::*;

pub use klt::{FeatureTracker, GrayFloatImage, ShiTomasiTracker};
pub use vo_core::nalgebra;
