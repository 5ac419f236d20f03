//! Frame rendering.
//!
//! The dispatcher turns a planned traversal into one still image per index by invoking the
//! scene renderer on a bounded worker pool, and records the outcome of each frame in a
//! [`RenderManifest`](dispatch::RenderManifest).

/// Parallel per-frame renderer invocation and the render manifest.
pub mod dispatch;
