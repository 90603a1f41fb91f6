use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::*;
use vo_core::nalgebra::Point3;

/// One labelled trajectory, ready to be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryUpdate {
    pub points: Vec<Point3<f64>>,
    pub label: &'static str,
    /// A plotting hint in the usual color and marker shorthand, like `"g."`.
    pub style: &'static str,
}

/// Receives trajectory updates on a best effort basis.
///
/// Implementations must return promptly. An update that cannot be delivered
/// right away is dropped.
pub trait TrajectorySink {
    fn publish(&self, update: TrajectoryUpdate);
}

/// Forwards updates into a bounded channel for a consumer on another thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<TrajectoryUpdate>,
}

impl ChannelSink {
    /// Creates a sink that holds at most `capacity` undelivered updates.
    pub fn bounded(capacity: usize) -> (Self, Receiver<TrajectoryUpdate>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender }, receiver)
    }

    pub fn new(sender: Sender<TrajectoryUpdate>) -> Self {
        Self { sender }
    }
}

impl TrajectorySink for ChannelSink {
    fn publish(&self, update: TrajectoryUpdate) {
        match self.sender.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                debug!("trajectory consumer is behind, dropped {:?} update", update.label);
            }
            Err(TrySendError::Disconnected(update)) => {
                trace!("no trajectory consumer, dropped {:?} update", update.label);
            }
        }
    }
}
