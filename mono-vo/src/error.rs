use thiserror::Error;

/// Failures that the odometry cannot absorb on its own.
///
/// Degenerate frames are not errors. They are reported through
/// [`FrameOutcome`](crate::FrameOutcome) and leave the odometry continuable.
#[derive(Debug, Error)]
pub enum OdometryError {
    #[error("ground truth has {len} positions, but frame {frame} was requested")]
    GroundTruthOutOfRange { frame: usize, len: usize },
    #[error("malformed settings: {0}")]
    Settings(#[from] serde_json::Error),
    #[error("unable to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid camera calibration: {0}")]
    InvalidCalibration(String),
}
