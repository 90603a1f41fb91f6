//! # Visual Odometry Core
//!
//! This library provides the common abstractions and types used by the monocular visual odometry crates.
//! Every crate in the workspace that produces or consumes keypoints, correspondences, or poses depends on it.
//! That includes the camera model (`vo-pinhole`), the minimal essential matrix solver (`five-point`), the
//! feature tracker (`klt`), and the odometry pipeline itself (`mono-vo`). The crate is kept very small so
//! that it adds negligible build time.
//!
//! The crate is `#![no_std]`, but it requires an allocator since keypoint sets and correspondence sets are
//! growable.
//!
//! ## Poses
//!
//! Two kinds of pose flow through the pipeline:
//!
//! * [The relative pose between two frames](CameraToCamera), which is what two-view geometry recovers.
//!   Its translation is only known up to scale.
//! * [The pose of the camera in the world](CameraToWorld), which is accumulated frame after frame by
//!   composing scaled relative poses onto it.
//!
//! The world frame is the camera frame of the first image that was processed.
//!
//! ```text
//!        world (frame 0)
//!            O----------------> x
//!            |\
//!            | \  CameraToWorld(k)
//!            |  \
//!            v   O frame k ----> O frame k + 1
//!            z        CameraToCamera(k + 1 -> k)
//! ```
//!
//! ## Correspondences
//!
//! Tracking produces [`Correspondences`], which are two keypoint sets of equal length where index `i` in
//! each set is the same physical track. The equal length invariant is enforced by the type.

#![no_std]

extern crate alloc;

mod camera;
mod keypoint;
mod matches;
mod pose;

pub use camera::*;
pub use keypoint::*;
pub use matches::*;
pub use nalgebra;
pub use pose::*;
pub use sample_consensus;
