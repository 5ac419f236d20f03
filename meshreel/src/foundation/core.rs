use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const CIFTI_STRUCTURE_PREFIX: &str = "CIFTI_STRUCTURE_";

/// Named brain structure a surface belongs to, e.g. `CORTEX_LEFT`.
///
/// Names are normalized on construction: surrounding whitespace and the `CIFTI_STRUCTURE_`
/// prefix used inside connectivity files are stripped, so `CIFTI_STRUCTURE_CORTEX_LEFT` and
/// `CORTEX_LEFT` compare equal.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Structure(String);

impl Structure {
    /// Create a normalized structure name.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref().trim();
        let name = name.strip_prefix(CIFTI_STRUCTURE_PREFIX).unwrap_or(name);
        Self(name.to_string())
    }

    /// Borrow the normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A vertex on a named surface.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SurfaceVertex {
    /// Surface the vertex belongs to.
    pub structure: Structure,
    /// 0-based vertex index on that surface.
    pub vertex: u32,
}

impl SurfaceVertex {
    /// Create a surface vertex.
    pub fn new(structure: Structure, vertex: u32) -> Self {
        Self { structure, vertex }
    }
}

/// A voxel of a named volume structure, by its `i j k` grid index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct VolumeVoxel {
    /// Volume structure the voxel belongs to.
    pub structure: Structure,
    /// Grid index.
    pub ijk: [u32; 3],
}

impl VolumeVoxel {
    /// Create a volume voxel.
    pub fn new(structure: Structure, ijk: [u32; 3]) -> Self {
        Self { structure, ijk }
    }
}

/// Stereotaxic `[x, y, z]` in millimetres.
///
/// Compared and hashed bit for bit, so equal positions always share a render.
#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Coordinates(pub [f64; 3]);

impl PartialEq for Coordinates {
    fn eq(&self, other: &Self) -> bool {
        self.0.map(f64::to_bits) == other.0.map(f64::to_bits)
    }
}

impl Eq for Coordinates {}

impl Hash for Coordinates {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.map(f64::to_bits).hash(state);
    }
}

/// One point of a traversal. Immutable once created.
///
/// Surface variants resolve to a concrete [`SurfaceVertex`] and record where the point came
/// from; [`Voxel`](Self::Voxel) is a connectivity row that lives in a volume structure.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeshPosition {
    /// A connectivity row and the vertex it maps to.
    Row {
        /// Row in the connectivity matrix.
        row: u32,
        /// Vertex behind the row.
        at: SurfaceVertex,
    },
    /// A raw vertex, with its connectivity row when it has one.
    Vertex {
        /// The vertex.
        at: SurfaceVertex,
        /// Backing row, `None` for vertices outside the connectivity map.
        row: Option<u32>,
    },
    /// A point taken from a border path.
    BorderPoint {
        /// The border vertex.
        at: SurfaceVertex,
        /// Backing row, if any.
        row: Option<u32>,
    },
    /// A connectivity row in a volume structure.
    Voxel {
        /// Row in the connectivity matrix.
        row: u32,
        /// Voxel behind the row.
        at: VolumeVoxel,
        /// Voxel centre.
        xyz: Coordinates,
    },
}

impl MeshPosition {
    /// The surface vertex this position sits on, `None` for voxels.
    pub fn surface_vertex(&self) -> Option<&SurfaceVertex> {
        match self {
            Self::Row { at, .. } | Self::Vertex { at, .. } | Self::BorderPoint { at, .. } => {
                Some(at)
            }
            Self::Voxel { .. } => None,
        }
    }

    /// The voxel this position sits on, `None` for surface positions.
    pub fn voxel(&self) -> Option<&VolumeVoxel> {
        match self {
            Self::Voxel { at, .. } => Some(at),
            _ => None,
        }
    }

    /// Millimetre coordinates of a voxel position.
    pub fn coordinates(&self) -> Option<&Coordinates> {
        match self {
            Self::Voxel { xyz, .. } => Some(xyz),
            _ => None,
        }
    }

    /// Shorthand for `surface_vertex().vertex`.
    pub fn vertex(&self) -> Option<u32> {
        self.surface_vertex().map(|at| at.vertex)
    }

    /// Structure the position belongs to.
    pub fn structure(&self) -> &Structure {
        match self {
            Self::Row { at, .. } | Self::Vertex { at, .. } | Self::BorderPoint { at, .. } => {
                &at.structure
            }
            Self::Voxel { at, .. } => &at.structure,
        }
    }

    /// Connectivity row backing this position, if any.
    pub fn row(&self) -> Option<u32> {
        match self {
            Self::Row { row, .. } | Self::Voxel { row, .. } => Some(*row),
            Self::Vertex { row, .. } | Self::BorderPoint { row, .. } => *row,
        }
    }
}

impl fmt::Display for MeshPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let place = match self {
            Self::Voxel { at, .. } => {
                let [i, j, k] = at.ijk;
                format!("{}:({i},{j},{k})", at.structure)
            }
            Self::Row { at, .. } | Self::Vertex { at, .. } | Self::BorderPoint { at, .. } => {
                format!("{}:{}", at.structure, at.vertex)
            }
        };
        match self.row() {
            Some(row) => write!(f, "row {row} ({place})"),
            None => f.write_str(&place),
        }
    }
}

/// Cooperative cancellation flag shared between the orchestrator, its workers and the
/// external processes they wait on.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Running external processes are killed at their next poll.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Return `true` once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
