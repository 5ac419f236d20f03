//! The pipeline orchestrator: plan, render, assemble.

/// Movie sessions, their options and stages.
pub mod movie;
/// Self-deleting working directories.
pub mod workdir;
