//! Surface meshes and their edge graphs, plus straight lines through volume grids.

/// GIFTI surface parsing.
pub mod gifti;
/// Mesh edge graph and shortest paths.
pub mod graph;
/// Straight lines through a voxel grid.
pub mod voxel;
