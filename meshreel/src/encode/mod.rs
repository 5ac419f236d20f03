//! Video encoding.
//!
//! The assembler consumes a render manifest in traversal order and drives the external encoder
//! once to produce the output video.

/// Manifest checks, frame sequence layout and the `ffmpeg` invocation.
pub mod assemble;
