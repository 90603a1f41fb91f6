use crate::{
    OdometryError, OdometrySettings, PoseEstimate, PoseEstimator, Ransac, ScaleOracle,
    ScaleSample, TrajectoryHistory, TrajectorySink,
};
use ::image::DynamicImage;
use five_point::FivePoint;
use klt::{FeatureTracker, GrayFloatImage, ShiTomasiTracker};
use log::*;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use vo_core::{
    sample_consensus::{Consensus, Estimator},
    CameraModel, CameraToWorld, Correspondences, FeatureMatch, KeyPoints, Pose,
};
use vo_pinhole::{EssentialMatrix, NormalizedKeyPoint, PinholeCamera};

/// The scale used when the scale source has nothing to say about a frame.
pub const FALLBACK_SCALE: f64 = 1.0;

/// Where the odometry is in its lifecycle.
///
/// Initialization is not a state of its own. It happens entirely within the first
/// call to [`VisualOdometry::process_frame`], which leaves the odometry tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OdometryState {
    /// No frame has been seen yet. The next frame will only be used to detect keypoints.
    Uninitialized,
    /// A reference frame and keypoint set exist and every new frame is tracked against them.
    Tracking,
}

/// Why a frame did not produce a motion estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    /// Every keypoint was lost, or there were none to begin with.
    NoCorrespondences,
    /// Some keypoints survived, but too few to estimate a pose.
    TooFewCorrespondences,
    /// The pose estimator found no consistent motion.
    NoPose,
}

/// What happened to a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// This was the first frame. Keypoints were detected and the pose is the identity.
    Initialized { keypoints: usize },
    /// A relative motion was estimated.
    Tracked {
        correspondences: usize,
        inliers: usize,
        /// The metric length the motion was given.
        scale: f64,
        /// Whether the motion was long enough to be applied to the pose.
        accepted: bool,
        /// Whether the keypoints were detected anew after tracking.
        replenished: bool,
    },
    /// No motion could be estimated and the pose was left alone.
    Stalled(StallReason),
}

/// Monocular visual odometry.
///
/// Every frame is tracked against the previous one. The relative motion between them
/// is estimated up to scale, given a metric length by the scale oracle, and chained
/// onto the camera pose. The world frame is the camera frame of the first image.
pub struct VisualOdometry<M, T, O, C, E> {
    settings: OdometrySettings,
    camera: M,
    tracker: T,
    oracle: O,
    pose_estimator: PoseEstimator<C, E>,
    previous: Option<GrayFloatImage>,
    reference: KeyPoints,
    pose: CameraToWorld,
    history: TrajectoryHistory,
    sink: Option<Box<dyn TrajectorySink + Send>>,
}

impl<O> VisualOdometry<PinholeCamera, ShiTomasiTracker, O, Ransac<Pcg64>, FivePoint>
where
    O: ScaleOracle,
{
    /// Shi-Tomasi corners, pyramidal Lucas-Kanade, and RANSAC over the five-point
    /// algorithm, all configured from `settings`.
    pub fn from_settings(settings: OdometrySettings, camera: PinholeCamera, oracle: O) -> Self {
        let consensus = Ransac::new(
            settings.ransac_threshold,
            settings.ransac_probability,
            settings.ransac_max_iterations,
            Pcg64::from_seed([5; 32]),
        );
        Self::new(
            settings,
            camera,
            settings.tracker.tracker(),
            oracle,
            consensus,
            FivePoint::new(),
        )
    }
}

impl<M, T, O, C, E> VisualOdometry<M, T, O, C, E>
where
    M: CameraModel<Projection = NormalizedKeyPoint>,
    T: FeatureTracker,
    O: ScaleOracle,
    C: Consensus<E, FeatureMatch<NormalizedKeyPoint>>,
    E: Estimator<FeatureMatch<NormalizedKeyPoint>, Model = EssentialMatrix>,
{
    pub fn new(
        settings: OdometrySettings,
        camera: M,
        tracker: T,
        oracle: O,
        consensus: C,
        estimator: E,
    ) -> Self {
        let pose_estimator = PoseEstimator::new(consensus, estimator)
            .min_correspondences(settings.min_correspondences)
            .epsilon(settings.essential_epsilon)
            .max_iterations(settings.essential_iterations);
        Self {
            settings,
            camera,
            tracker,
            oracle,
            pose_estimator,
            previous: None,
            reference: KeyPoints::new(),
            pose: CameraToWorld::identity(),
            history: TrajectoryHistory::new(),
            sink: None,
        }
    }

    /// Publishes both trajectories to `sink` every time the history grows.
    #[must_use]
    pub fn with_sink(self, sink: impl TrajectorySink + Send + 'static) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            ..self
        }
    }

    pub fn settings(&self) -> &OdometrySettings {
        &self.settings
    }

    pub fn camera(&self) -> &M {
        &self.camera
    }

    /// The pose of the current camera in the world.
    pub fn pose(&self) -> CameraToWorld {
        self.pose
    }

    /// The keypoints the next frame will be tracked from.
    pub fn keypoints(&self) -> &KeyPoints {
        &self.reference
    }

    pub fn history(&self) -> &TrajectoryHistory {
        &self.history
    }

    pub fn state(&self) -> OdometryState {
        if self.previous.is_some() {
            OdometryState::Tracking
        } else {
            OdometryState::Uninitialized
        }
    }

    /// Processes the image with index `frame`, converting it to grayscale first.
    pub fn process_frame(
        &mut self,
        frame: usize,
        image: &DynamicImage,
    ) -> Result<FrameOutcome, OdometryError> {
        self.process_gray_frame(frame, GrayFloatImage::from_dynamic(image))
    }

    /// Processes an image that is already grayscale.
    ///
    /// The first call initializes the odometry no matter the index. After that, `frame`
    /// is the index the scale oracle is queried with. If the oracle fails, the error is
    /// returned and nothing about the odometry changes.
    pub fn process_gray_frame(
        &mut self,
        frame: usize,
        image: GrayFloatImage,
    ) -> Result<FrameOutcome, OdometryError> {
        info!("frame {}", frame);
        let previous = match &self.previous {
            Some(previous) => previous,
            None => return Ok(self.initialize(image)),
        };
        let correspondences = self.tracker.track(previous, &image, &self.reference);
        self.track(frame, image, correspondences)
    }

    fn initialize(&mut self, image: GrayFloatImage) -> FrameOutcome {
        self.reference = self.tracker.detect(&image);
        self.previous = Some(image);
        info!("initialized with {} keypoints", self.reference.len());
        FrameOutcome::Initialized {
            keypoints: self.reference.len(),
        }
    }

    fn track(
        &mut self,
        frame: usize,
        image: GrayFloatImage,
        correspondences: Correspondences,
    ) -> Result<FrameOutcome, OdometryError> {
        info!(
            "tracked {} of {} keypoints",
            correspondences.len(),
            self.reference.len()
        );

        let estimate = if correspondences.is_empty() {
            Err(StallReason::NoCorrespondences)
        } else if correspondences.len() < self.pose_estimator.required_correspondences() {
            Err(StallReason::TooFewCorrespondences)
        } else {
            self.pose_estimator
                .estimate(&self.camera, &correspondences)
                .ok_or(StallReason::NoPose)
        };

        // Nothing is committed until the scale lookup has succeeded.
        let motion = match estimate {
            Ok(estimate) => Ok(self.scale_motion(frame, estimate)?),
            Err(reason) => {
                warn!("frame {} stalled: {:?}", frame, reason);
                Err(reason)
            }
        };

        let tracked = correspondences.len();
        let (_, survivors) = correspondences.into_parts();
        let replenished = survivors.len() < self.settings.target_features;
        self.reference = if replenished {
            let detected = self.tracker.detect(&image);
            info!(
                "{} keypoints left, detected {} new ones",
                survivors.len(),
                detected.len()
            );
            detected
        } else {
            survivors
        };
        self.previous = Some(image);

        Ok(match motion {
            Ok(ScaledMotion {
                estimate,
                scale,
                accepted,
                sample,
            }) => {
                if accepted {
                    self.pose = self.pose.compose(estimate.pose, scale);
                }
                if let Some(sample) = sample {
                    self.history
                        .record(self.pose.translation(), sample.position);
                    if let Some(sink) = &self.sink {
                        self.history.publish(sink.as_ref());
                    }
                }
                FrameOutcome::Tracked {
                    correspondences: tracked,
                    inliers: estimate.inliers,
                    scale,
                    accepted,
                    replenished,
                }
            }
            Err(reason) => FrameOutcome::Stalled(reason),
        })
    }

    fn scale_motion(
        &self,
        frame: usize,
        estimate: PoseEstimate,
    ) -> Result<ScaledMotion, OdometryError> {
        let sample = self.oracle.sample(frame)?;
        let scale = sample.map_or(FALLBACK_SCALE, |sample| sample.scale);
        let accepted = scale > self.settings.absolute_scale_threshold;
        if accepted {
            info!(
                "accepted motion of scale {} with {} inliers",
                scale, estimate.inliers
            );
        } else {
            info!(
                "rejected motion of scale {}, needed more than {}",
                scale, self.settings.absolute_scale_threshold
            );
        }
        Ok(ScaledMotion {
            estimate,
            scale,
            accepted,
            sample,
        })
    }
}

struct ScaledMotion {
    estimate: PoseEstimate,
    scale: f64,
    accepted: bool,
    sample: Option<ScaleSample>,
}
