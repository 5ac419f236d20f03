//! Scene files and the resources they reference.

/// Row and vertex lookups plus surface graphs behind a scene.
pub mod atlas;
/// Border-file paths.
pub mod border;
/// Connectivity row tables.
pub mod cifti;
/// Scene selection and per-frame marker placement.
pub mod document;
