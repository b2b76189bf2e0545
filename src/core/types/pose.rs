//! 3D pose helpers used throughout the scene graph backend.
//!
//! Poses are full rigid-body transforms (`nalgebra::Isometry3<f64>`); most of
//! the backend only ever composes, inverts, and interpolates them, so this
//! module stays a thin layer of constructors and helpers.

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// Rigid-body transform in 3D (rotation + translation).
pub type Pose3 = Isometry3<f64>;

/// Create a pose from a position with identity rotation.
#[inline]
pub fn pose_from_position(position: Point3<f64>) -> Pose3 {
    Isometry3::from_parts(
        Translation3::from(position.coords),
        UnitQuaternion::identity(),
    )
}

/// Relative transform taking `from` to `to`: `from^{-1} * to`.
#[inline]
pub fn between(from: &Pose3, to: &Pose3) -> Pose3 {
    from.inverse() * to
}

/// Position component of a pose.
#[inline]
pub fn position_of(pose: &Pose3) -> Point3<f64> {
    Point3::from(pose.translation.vector)
}

/// A pose with its source key and capture timestamp.
///
/// `pose` is the value as received from the front-end; `corrected` starts
/// equal to it and is overwritten after each optimization pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampedPose {
    /// External pose-graph key.
    pub key: u64,
    /// Capture timestamp in microseconds.
    pub stamp_us: u64,
    /// Pose as received.
    pub pose: Pose3,
    /// Pose after the latest correction.
    pub corrected: Pose3,
}

impl StampedPose {
    /// Create a stamped pose with the correction initialized to the input.
    pub fn new(key: u64, stamp_us: u64, pose: Pose3) -> Self {
        Self {
            key,
            stamp_us,
            pose,
            corrected: pose,
        }
    }
}
