use crate::{TrajectorySink, TrajectoryUpdate};
use vo_core::nalgebra::{Point3, Vector3};

pub const GROUND_TRUTH_LABEL: &str = "ground truth";
pub const GROUND_TRUTH_STYLE: &str = "r.";
pub const ESTIMATED_LABEL: &str = "estimated";
pub const ESTIMATED_STYLE: &str = "g.";

/// The estimated and true trajectories, both shifted so they start at the origin.
///
/// The offsets are taken from the first recorded frame, so the first entry of
/// each trajectory is exactly zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrajectoryHistory {
    anchor: Option<(Vector3<f64>, Point3<f64>)>,
    estimated: Vec<Point3<f64>>,
    ground_truth: Vec<Point3<f64>>,
}

impl TrajectoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one frame, anchoring the history on the first call.
    pub fn record(&mut self, estimated: Vector3<f64>, ground_truth: Point3<f64>) {
        let (anchor_estimated, anchor_ground_truth) =
            *self.anchor.get_or_insert((estimated, ground_truth));
        self.estimated
            .push(Point3::from(estimated - anchor_estimated));
        self.ground_truth
            .push(Point3::from(ground_truth - anchor_ground_truth));
    }

    pub fn anchor(&self) -> Option<(Vector3<f64>, Point3<f64>)> {
        self.anchor
    }

    pub fn estimated(&self) -> &[Point3<f64>] {
        &self.estimated
    }

    pub fn ground_truth(&self) -> &[Point3<f64>] {
        &self.ground_truth
    }

    pub fn len(&self) -> usize {
        self.estimated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimated.is_empty()
    }

    /// Hands both trajectories to the sink, ground truth first.
    pub fn publish(&self, sink: &(impl TrajectorySink + ?Sized)) {
        sink.publish(TrajectoryUpdate {
            points: self.ground_truth.clone(),
            label: GROUND_TRUTH_LABEL,
            style: GROUND_TRUTH_STYLE,
        });
        sink.publish(TrajectoryUpdate {
            points: self.estimated.clone(),
            label: ESTIMATED_LABEL,
            style: ESTIMATED_STYLE,
        });
    }
}
