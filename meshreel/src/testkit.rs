//! Shared fixtures for unit tests.

use crate::foundation::core::{MeshPosition, Structure, SurfaceVertex};
use crate::mesh::graph::Mesh;

pub(crate) const CHAIN: [u32; 4] = [10, 14, 17, 20];

/// 100-vertex mesh whose shortest path from 10 to 20 is `[10, 14, 17, 20]`.
///
/// The chain vertices sit one unit apart on the x axis; every other vertex lies on a strip 100
/// units away, stitched to the chain through vertices 30..=32.
pub(crate) fn chain_mesh() -> Mesh {
    let mut vertices = (0..100)
        .map(|i| [i as f32 * 10.0, 100.0, 0.0])
        .collect::<Vec<_>>();
    for (k, &v) in CHAIN.iter().enumerate() {
        vertices[v as usize] = [k as f32, 0.0, 0.0];
    }

    let mut faces = vec![[10, 14, 30], [14, 17, 31], [17, 20, 32]];
    let strip = (0..100u32)
        .filter(|v| !CHAIN.contains(v))
        .collect::<Vec<_>>();
    for w in strip.windows(3) {
        faces.push([w[0], w[1], w[2]]);
    }
    Mesh { vertices, faces }
}

/// Two triangles with no shared vertex.
pub(crate) fn two_islands() -> Mesh {
    Mesh {
        vertices: vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [10.0, 0.0, 0.0],
            [11.0, 0.0, 0.0],
            [10.0, 1.0, 0.0],
        ],
        faces: vec![[0, 1, 2], [3, 4, 5]],
    }
}

pub(crate) fn left() -> Structure {
    Structure::new("CORTEX_LEFT")
}

pub(crate) fn row_position(row: u32, vertex: u32) -> MeshPosition {
    MeshPosition::Row {
        row,
        at: SurfaceVertex::new(left(), vertex),
    }
}

/// ASCII GIFTI text for `mesh`.
pub(crate) fn gifti_ascii(mesh: &Mesh) -> String {
    let coords = mesh
        .vertices
        .iter()
        .map(|v| format!("{} {} {}", v[0], v[1], v[2]))
        .collect::<Vec<_>>()
        .join("\n");
    let faces = mesh
        .faces
        .iter()
        .map(|f| format!("{} {} {}", f[0], f[1], f[2]))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<GIFTI Version="1.0" NumberOfDataArrays="2">
  <DataArray Intent="NIFTI_INTENT_POINTSET" DataType="NIFTI_TYPE_FLOAT32" ArrayIndexingOrder="RowMajorOrder" Dimensionality="2" Dim0="{}" Dim1="3" Encoding="ASCII">
    <Data>{coords}</Data>
  </DataArray>
  <DataArray Intent="NIFTI_INTENT_TRIANGLE" DataType="NIFTI_TYPE_INT32" ArrayIndexingOrder="RowMajorOrder" Dimensionality="2" Dim0="{}" Dim1="3" Encoding="ASCII">
    <Data>{faces}</Data>
  </DataArray>
</GIFTI>
"#,
        mesh.vertices.len(),
        mesh.faces.len()
    )
}

/// Fresh scratch directory under `target/`.
pub(crate) fn scratch_dir(area: &str, name: &str) -> std::path::PathBuf {
    let dir = std::path::PathBuf::from("target")
        .join("meshreel-unit")
        .join(area)
        .join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
