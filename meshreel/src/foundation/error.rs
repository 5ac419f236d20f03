use std::path::PathBuf;
use std::time::Duration;

use crate::foundation::core::Structure;

/// Convenience result type used across meshreel.
pub type MeshreelResult<T> = Result<T, MeshreelError>;

/// Top-level error, one variant per failure category.
///
/// Per-frame renderer failures are not part of this enum: they are recorded as [`FrameFailure`]
/// in the render manifest and only surface here in aggregate, as
/// [`AssemblyError::IncompleteRender`].
#[derive(thiserror::Error, Debug)]
pub enum MeshreelError {
    /// Bad flag combination or a missing/unreadable scene, border or surface resource.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The waypoints could not be turned into a traversal.
    #[error("planning error: {0}")]
    Planning(#[from] PlanError),

    /// Frames could not be stitched into a video.
    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// A required external binary is missing.
    #[error("environment error: {0}")]
    Environment(#[from] EnvironmentError),

    /// The caller raised the cancel token.
    #[error("movie generation was cancelled")]
    Cancelled,

    /// IO and other failures carrying an `anyhow` context chain.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MeshreelError {
    /// Shorthand for [`ConfigError::Invalid`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Configuration(ConfigError::Invalid(msg.into()))
    }

    /// Shorthand for [`ConfigError::MalformedResource`].
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Configuration(ConfigError::MalformedResource {
            path: path.into(),
            reason: reason.into(),
        })
    }
}

/// Problems detected before any rendering work starts.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The scene file has no full scene with the requested name.
    #[error("scene '{name}' not found in '{}'", .path.display())]
    SceneNotFound {
        /// Requested scene name.
        name: String,
        /// Scene file that was searched.
        path: PathBuf,
    },

    /// A resource the scene refers to (surface, connectivity file) is missing.
    #[error("{what} not found: '{}'", .path.display())]
    MissingResource {
        /// Human-readable resource kind.
        what: String,
        /// Path that was expected, possibly empty when nothing was referenced.
        path: PathBuf,
    },

    /// Vertex mode and border-file mode were both requested.
    #[error("--vertex-mode and --border-file cannot be combined")]
    InvalidModeCombination,

    /// `closed` and `reverse` were both requested.
    #[error("--closed and --reverse are mutually exclusive")]
    MutuallyExclusiveFlags,

    /// A numeric option is out of range.
    #[error("{0}")]
    Invalid(String),

    /// A resource exists but could not be parsed.
    #[error("malformed resource '{}': {reason}", .path.display())]
    MalformedResource {
        /// Offending file.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },
}

/// Failures turning waypoints into a traversal. No frame is rendered after one of these.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// No waypoints were supplied.
    #[error("at least one waypoint is required")]
    EmptyWaypointList,

    /// A row index has no surface vertex behind it.
    #[error("row {row} does not map to a surface vertex")]
    UnmappableRow {
        /// Offending row.
        row: u32,
    },

    /// A waypoint could not be parsed as an index.
    #[error("waypoint '{value}' is not a valid index")]
    InvalidWaypoint {
        /// Raw waypoint text.
        value: String,
    },

    /// A vertex index lies outside the surface.
    #[error("vertex {vertex} is out of range for {structure} ({vertex_count} vertices)")]
    VertexOutOfRange {
        /// Surface structure.
        structure: Structure,
        /// Offending vertex.
        vertex: u32,
        /// Number of vertices on the surface.
        vertex_count: usize,
    },

    /// Two consecutive waypoints lie on different structures.
    #[error("path crosses structures ({from} -> {to})")]
    CrossesStructures {
        /// Structure of the earlier waypoint.
        from: Structure,
        /// Structure of the later waypoint.
        to: Structure,
    },

    /// The mesh has no path between two waypoints.
    #[error("no path on {structure} between vertex {from} and vertex {to}")]
    Disconnected {
        /// Surface structure.
        structure: Structure,
        /// Start vertex.
        from: u32,
        /// End vertex.
        to: u32,
    },

    /// The scene has no surface for the structure.
    #[error("no surface is available for structure {structure}")]
    UnknownStructure {
        /// Requested structure.
        structure: Structure,
    },
}

/// Why a single frame failed. Recorded in the manifest; never aborts sibling frames.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameFailure {
    /// The renderer exited unsuccessfully.
    #[error("renderer exited with status {}: {output}", exit_label(.code))]
    NonZeroExit {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Tail of the renderer's output.
        output: String,
    },

    /// The renderer did not finish in time and was killed.
    #[error("renderer timed out after {after:?}")]
    Timeout {
        /// Configured timeout.
        after: Duration,
    },

    /// The renderer reported success but the frame is unusable.
    #[error("malformed renderer output: {reason}")]
    MalformedOutput {
        /// What was wrong with the frame.
        reason: String,
    },

    /// The renderer process could not be started.
    #[error("failed to start renderer: {reason}")]
    Spawn {
        /// OS error text.
        reason: String,
    },

    /// The per-frame scene could not be written.
    #[error("failed to write frame scene: {reason}")]
    SceneWrite {
        /// IO error text.
        reason: String,
    },

    /// The frame was abandoned because the job was cancelled.
    #[error("cancelled")]
    Cancelled,
}

/// Failures stitching frames into the output video.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Some frames failed to render.
    #[error("{} of {total} frames failed to render (indices {failed:?})", .failed.len())]
    IncompleteRender {
        /// Traversal indices whose frame failed.
        failed: Vec<usize>,
        /// Manifest length.
        total: usize,
    },

    /// The encoder failed or produced nothing.
    #[error("encoding failed: {reason}")]
    EncodingFailed {
        /// Encoder message.
        reason: String,
    },

    /// There were no frames to encode.
    #[error("render manifest is empty")]
    EmptyManifest,
}

/// Missing external binaries.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    /// The scene renderer could not be located.
    #[error("renderer `wb_command` not found; set {env_var} or add it to PATH")]
    RendererNotFound {
        /// Override variable that was consulted.
        env_var: &'static str,
    },

    /// The video encoder could not be located.
    #[error("encoder `ffmpeg` not found; set {env_var} or add it to PATH")]
    EncoderNotFound {
        /// Override variable that was consulted.
        env_var: &'static str,
    },
}

pub(crate) fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal".to_string(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
