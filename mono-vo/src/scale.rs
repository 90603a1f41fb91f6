use crate::OdometryError;
use vo_core::nalgebra::Point3;

/// What a scale source knows about one frame transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleSample {
    /// The metric length of the motion from the previous frame to this one.
    pub scale: f64,
    /// The true position at the previous frame.
    pub previous: Point3<f64>,
    /// The true position at this frame.
    pub position: Point3<f64>,
}

/// Supplies the metric scale that monocular geometry cannot recover.
pub trait ScaleOracle {
    /// Describes the motion from frame `frame - 1` to frame `frame`.
    ///
    /// `Ok(None)` means no scale source is configured. Asking for a frame the source
    /// has no data for is an error.
    fn sample(&self, frame: usize) -> Result<Option<ScaleSample>, OdometryError>;
}

/// Used when no ground truth is available. It never yields a sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGroundTruth;

impl ScaleOracle for NoGroundTruth {
    fn sample(&self, _frame: usize) -> Result<Option<ScaleSample>, OdometryError> {
        Ok(None)
    }
}

/// A recorded trajectory with one position per frame.
///
/// Positions are multiplied by `scale` whenever they are read.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthTrack {
    positions: Vec<Point3<f64>>,
    scale: f64,
}

impl GroundTruthTrack {
    pub fn new(positions: Vec<Point3<f64>>) -> Self {
        Self {
            positions,
            scale: 1.0,
        }
    }

    #[must_use]
    pub fn with_scale(self, scale: f64) -> Self {
        Self { scale, ..self }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The scaled position at `frame`.
    pub fn position(&self, frame: usize) -> Result<Point3<f64>, OdometryError> {
        self.positions
            .get(frame)
            .map(|position| Point3::from(position.coords * self.scale))
            .ok_or_else(|| OdometryError::GroundTruthOutOfRange {
                frame,
                len: self.positions.len(),
            })
    }
}

impl FromIterator<Point3<f64>> for GroundTruthTrack {
    fn from_iter<I: IntoIterator<Item = Point3<f64>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl ScaleOracle for GroundTruthTrack {
    fn sample(&self, frame: usize) -> Result<Option<ScaleSample>, OdometryError> {
        let previous_frame = frame
            .checked_sub(1)
            .ok_or_else(|| OdometryError::GroundTruthOutOfRange {
                frame,
                len: self.positions.len(),
            })?;
        let previous = self.position(previous_frame)?;
        let position = self.position(frame)?;
        Ok(Some(ScaleSample {
            scale: (position - previous).norm(),
            previous,
            position,
        }))
    }
}

impl<T> ScaleOracle for &T
where
    T: ScaleOracle + ?Sized,
{
    fn sample(&self, frame: usize) -> Result<Option<ScaleSample>, OdometryError> {
        (**self).sample(frame)
    }
}
