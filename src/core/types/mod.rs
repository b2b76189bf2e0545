//! Foundation types shared across the backend.

mod mesh;
mod pose;

pub use mesh::{RawMeshMsg, TriMesh};
pub use pose::{Pose3, StampedPose, between, pose_from_position, position_of};
