use crate::{KeyPoint, KeyPoints};
use core::fmt;

/// Normalized keypoint match
///
/// The two points are passed to estimators in the order they are stored. In the odometry
/// pipeline the first point belongs to the current frame and the second to the reference frame.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct FeatureMatch<P>(pub P, pub P);

/// Two keypoint sets were paired that do not have the same length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthMismatch {
    pub reference: usize,
    pub current: usize,
}

impl fmt::Display for LengthMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "correspondence sets differ in length: {} reference points and {} current points",
            self.reference, self.current
        )
    }
}

/// Tracks between a reference image and the current image.
///
/// Index `i` of [`Correspondences::reference`] and index `i` of [`Correspondences::current`]
/// are the same physical point. The two sets always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correspondences {
    reference: KeyPoints,
    current: KeyPoints,
}

impl Correspondences {
    /// Pairs two keypoint sets index by index.
    ///
    /// ```
    /// use vo_core::{Correspondences, KeyPoint, KeyPoints};
    ///
    /// let reference = KeyPoints(vec![KeyPoint::new(1.0, 2.0)]);
    /// let current = KeyPoints(vec![KeyPoint::new(1.5, 2.0), KeyPoint::new(4.0, 4.0)]);
    /// assert!(Correspondences::new(reference, current).is_err());
    /// ```
    pub fn new(reference: KeyPoints, current: KeyPoints) -> Result<Self, LengthMismatch> {
        if reference.len() != current.len() {
            return Err(LengthMismatch {
                reference: reference.len(),
                current: current.len(),
            });
        }
        Ok(Self { reference, current })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            reference: KeyPoints::with_capacity(capacity),
            current: KeyPoints::with_capacity(capacity),
        }
    }

    /// Appends one track.
    pub fn push(&mut self, reference: KeyPoint, current: KeyPoint) {
        self.reference.push(reference);
        self.current.push(current);
    }

    pub fn len(&self) -> usize {
        self.reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    /// Iterates over `(reference, current)` pairs in track order.
    pub fn iter(&self) -> impl Iterator<Item = (KeyPoint, KeyPoint)> + Clone + '_ {
        self.reference
            .iter()
            .copied()
            .zip(self.current.iter().copied())
    }

    pub fn reference(&self) -> &KeyPoints {
        &self.reference
    }

    pub fn current(&self) -> &KeyPoints {
        &self.current
    }

    /// Splits into the reference and current sets.
    pub fn into_parts(self) -> (KeyPoints, KeyPoints) {
        (self.reference, self.current)
    }
}

impl Extend<(KeyPoint, KeyPoint)> for Correspondences {
    fn extend<I: IntoIterator<Item = (KeyPoint, KeyPoint)>>(&mut self, iter: I) {
        for (reference, current) in iter {
            self.push(reference, current);
        }
    }
}

impl FromIterator<(KeyPoint, KeyPoint)> for Correspondences {
    fn from_iter<I: IntoIterator<Item = (KeyPoint, KeyPoint)>>(iter: I) -> Self {
        let mut correspondences = Self::empty();
        correspondences.extend(iter);
        correspondences
    }
}
