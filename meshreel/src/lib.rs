//! meshreel renders a movie of a marker travelling across a brain-surface mesh.
//!
//! A run has three stages, each feeding the next:
//!
//! - Plan a [`Traversal`] from waypoints (connectivity rows, surface vertices or a border file),
//!   joining surface waypoints by shortest paths along mesh edges and volume waypoints by
//!   straight voxel lines
//! - Render one still per traversal index with the scene renderer, on a bounded worker pool
//! - Assemble the stills into a video with the encoder
//!
//! [`MovieSession`] runs all three; the stages are also usable on their own.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Frame assembly into a video.
pub mod encode;
/// Surface meshes, shortest paths and voxel lines.
pub mod mesh;
/// Waypoint resolution and traversal transforms.
pub mod plan;
/// Parallel frame rendering.
pub mod render;
/// Scene files, connectivity tables and border files.
pub mod scene;
/// End-to-end movie generation.
pub mod session;
/// External tool invocation.
pub mod tools;

#[cfg(test)]
mod testkit;

pub use crate::foundation::core::{
    CancelToken, Coordinates, MeshPosition, Structure, SurfaceVertex, VolumeVoxel,
};
pub use crate::foundation::error::{
    AssemblyError, ConfigError, EnvironmentError, FrameFailure, MeshreelError, MeshreelResult,
    PlanError,
};

pub use crate::encode::assemble::{AssembleOpts, AssembleReport, FrameAssembler};
pub use crate::mesh::graph::{GraphError, Mesh, MeshGraph};
pub use crate::mesh::voxel::voxel_line;
pub use crate::plan::planner::{PlanRequest, TraversalPlanner, WaypointMode};
pub use crate::plan::traversal::{Traversal, TraversalTransform};
pub use crate::render::dispatch::{
    FrameOutcome, ManifestEntry, RenderDispatcher, RenderManifest, RenderOpts,
};
pub use crate::scene::atlas::{InMemoryAtlas, SceneAtlas, SurfaceAtlas};
pub use crate::scene::cifti::{BrainModels, RowLocation};
pub use crate::scene::document::SceneDocument;
pub use crate::session::movie::{MovieOpts, MovieReport, MovieRequest, MovieSession, Stage};
pub use crate::tools::paths::{ExternalTool, ToolPaths};
pub use crate::tools::runner::{Invocation, InvocationError, ProcessRunner, ToolOutput, ToolRunner};
pub use crate::tools::scripted::ScriptedRunner;
