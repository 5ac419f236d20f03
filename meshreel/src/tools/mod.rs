//! External tool plumbing: locating the programs, describing calls and running them.

/// Locating `wb_command` and `ffmpeg`.
pub mod paths;
/// Running external programs with timeouts and cancellation.
pub mod runner;
/// Recording test double for [`runner::ToolRunner`].
pub mod scripted;
/// `wb_command` command lines.
pub mod workbench;
