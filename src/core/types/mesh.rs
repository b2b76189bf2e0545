//! Triangle mesh types for the scene graph's display geometry.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// A triangle mesh with per-vertex colors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriMesh {
    /// Vertex positions in meters.
    pub vertices: Vec<Point3<f32>>,
    /// Per-vertex RGB colors (same length as `vertices`).
    pub colors: Vec<[u8; 3]>,
    /// Triangle faces as vertex indices.
    pub faces: Vec<[u32; 3]>,
}

impl TriMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the mesh carries no geometry.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// A raw mesh as delivered by the front-end, with per-vertex capture
/// timestamps used to look up pose corrections during deformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMeshMsg {
    /// The undeformed mesh.
    pub mesh: TriMesh,
    /// Capture timestamp of each vertex in microseconds (same length as
    /// `mesh.vertices`).
    pub vertex_stamps_us: Vec<u64>,
}
