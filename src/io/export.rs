//! On-demand export of the corrected mesh and trajectory.
//!
//! The mesh is written as ASCII PLY so it opens in standard viewers; the
//! trajectory as CSV with one stamped pose per row.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::core::types::TriMesh;
use crate::engine::Trajectory;

/// Export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("nothing to export: {0}")]
    Empty(&'static str),
}

/// Write a mesh as ASCII PLY.
pub fn save_mesh_ply(mesh: &TriMesh, path: &Path) -> Result<(), ExportError> {
    if mesh.is_empty() {
        return Err(ExportError::Empty("mesh has no vertices"));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", mesh.num_vertices())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    writeln!(writer, "property uchar red")?;
    writeln!(writer, "property uchar green")?;
    writeln!(writer, "property uchar blue")?;
    writeln!(writer, "element face {}", mesh.faces.len())?;
    writeln!(writer, "property list uchar int vertex_indices")?;
    writeln!(writer, "end_header")?;

    for (i, vertex) in mesh.vertices.iter().enumerate() {
        let color = mesh.colors.get(i).copied().unwrap_or([255, 255, 255]);
        writeln!(
            writer,
            "{} {} {} {} {} {}",
            vertex.x, vertex.y, vertex.z, color[0], color[1], color[2]
        )?;
    }
    for face in &mesh.faces {
        writeln!(writer, "3 {} {} {}", face[0], face[1], face[2])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the corrected trajectory as CSV (`key,stamp_us,x,y,z,qw,qx,qy,qz`).
pub fn save_trajectory_csv(trajectory: &Trajectory, path: &Path) -> Result<(), ExportError> {
    if trajectory.is_empty() {
        return Err(ExportError::Empty("trajectory has no poses"));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "key,stamp_us,x,y,z,qw,qx,qy,qz")?;
    for stamped in trajectory.iter() {
        let t = stamped.corrected.translation.vector;
        let q = stamped.corrected.rotation.coords;
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{}",
            stamped.key, stamped.stamp_us, t.x, t.y, t.z, q.w, q.x, q.y, q.z
        )?;
    }
    writer.flush()?;
    Ok(())
}
