use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::core::CancelToken;
use crate::foundation::error::{AssemblyError, MeshreelError, MeshreelResult};
use crate::render::dispatch::{FrameOutcome, RenderManifest};
use crate::tools::paths::ExternalTool;
use crate::tools::runner::{Invocation, InvocationError, ToolRunner};

const SEQUENCE_PATTERN: &str = "frame%09d.png";

/// Options for [`FrameAssembler::assemble`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembleOpts {
    /// Output frames per second.
    pub framerate: u32,
    /// Overwrite an existing output file.
    pub overwrite: bool,
    /// Encoder timeout.
    pub timeout: Duration,
    /// Encode the rendered frames only, leaving failed indices out of the video.
    pub skip_failed: bool,
}

impl Default for AssembleOpts {
    fn default() -> Self {
        Self {
            framerate: 10,
            overwrite: true,
            timeout: Duration::from_secs(60 * 60),
            skip_failed: false,
        }
    }
}

impl AssembleOpts {
    /// Reject a zero framerate and a zero timeout.
    pub fn validate(&self) -> MeshreelResult<()> {
        if self.framerate == 0 {
            return Err(MeshreelError::invalid("framerate must be non-zero"));
        }
        if self.timeout.is_zero() {
            return Err(MeshreelError::invalid("encoder timeout must be non-zero"));
        }
        Ok(())
    }
}

/// What [`FrameAssembler::assemble`] produced.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct AssembleReport {
    /// Video file written.
    pub output: PathBuf,
    /// Number of frames handed to the encoder.
    pub frames: usize,
    /// Failed indices left out of the video.
    pub skipped: Vec<usize>,
    /// Size of the output file in bytes.
    pub bytes: u64,
}

/// Stitches a render manifest into a single video with one encoder invocation.
pub struct FrameAssembler {
    encoder: PathBuf,
    runner: Arc<dyn ToolRunner>,
    cancel: CancelToken,
}

impl FrameAssembler {
    /// Encode with the binary at `encoder`.
    pub fn new(encoder: impl Into<PathBuf>, runner: Arc<dyn ToolRunner>, cancel: CancelToken) -> Self {
        Self {
            encoder: encoder.into(),
            runner,
            cancel,
        }
    }

    /// Encode `manifest` into `output`, laying the frame sequence out under `workdir`.
    ///
    /// Every entry must be rendered unless `opts.skip_failed` is set.
    #[tracing::instrument(skip_all, fields(frames = manifest.len(), output = %output.display()))]
    pub fn assemble(
        &self,
        manifest: &RenderManifest,
        workdir: &Path,
        output: &Path,
        opts: &AssembleOpts,
    ) -> MeshreelResult<AssembleReport> {
        opts.validate()?;
        if manifest.is_empty() {
            return Err(AssemblyError::EmptyManifest.into());
        }

        let failed = manifest.failed_indices();
        if !failed.is_empty() {
            if !opts.skip_failed || failed.len() == manifest.len() {
                return Err(AssemblyError::IncompleteRender {
                    failed,
                    total: manifest.len(),
                }
                .into());
            }
            for entry in &manifest.entries {
                if let FrameOutcome::Failed { reason } = &entry.outcome {
                    tracing::warn!(index = entry.index, position = %entry.position, "skipping failed frame: {reason}");
                }
            }
        }

        let frames = manifest
            .entries
            .iter()
            .filter_map(|e| e.outcome.path())
            .collect::<Vec<_>>();

        ensure_parent_dir(output)?;
        if !opts.overwrite && output.exists() {
            return Err(MeshreelError::invalid(format!(
                "output file '{}' already exists",
                output.display()
            )));
        }

        let sequence = workdir.join("sequence");
        lay_out_sequence(&frames, &sequence)?;

        let invocation = encode_invocation(
            &self.encoder,
            &sequence.join(SEQUENCE_PATTERN),
            output,
            opts.framerate,
            opts.overwrite,
            opts.timeout,
        );
        tracing::info!(frames = frames.len(), fps = opts.framerate, "encoding video");
        self.runner
            .run(&invocation, &self.cancel)
            .map_err(|e| match e {
                InvocationError::Cancelled => MeshreelError::Cancelled,
                other => AssemblyError::EncodingFailed {
                    reason: other.to_string(),
                }
                .into(),
            })?;

        let bytes = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        if bytes == 0 {
            return Err(AssemblyError::EncodingFailed {
                reason: format!("encoder produced no output at '{}'", output.display()),
            }
            .into());
        }

        tracing::info!(frames = frames.len(), bytes, "video written");
        Ok(AssembleReport {
            output: output.to_path_buf(),
            frames: frames.len(),
            skipped: failed,
            bytes,
        })
    }
}

impl std::fmt::Debug for FrameAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAssembler")
            .field("encoder", &self.encoder)
            .finish_non_exhaustive()
    }
}

/// `ffmpeg` command line encoding the numbered PNG sequence `pattern` into `output`.
pub fn encode_invocation(
    program: &Path,
    pattern: &Path,
    output: &Path,
    framerate: u32,
    overwrite: bool,
    timeout: Duration,
) -> Invocation {
    let fps = framerate.to_string();
    Invocation::new(ExternalTool::Encoder, program)
        .arg("-hide_banner")
        .arg(if overwrite { "-y" } else { "-n" })
        .args(["-framerate", fps.as_str(), "-start_number", "0", "-i"])
        .arg(pattern)
        .args(["-c:v", "libx264", "-r", fps.as_str(), "-pix_fmt", "yuv420p"])
        .arg(output)
        .timeout(timeout)
}

/// Link `frames` into `dir` as a dense `frame%09d.png` sequence, copying where hard links
/// are not available.
fn lay_out_sequence(frames: &[&Path], dir: &Path) -> MeshreelResult<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("failed to clear '{}'", dir.display()))?;
    }
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create '{}'", dir.display()))?;

    for (i, src) in frames.iter().enumerate() {
        let dst = dir.join(format!("frame{i:09}.png"));
        std::fs::hard_link(src, &dst)
            .or_else(|_| std::fs::copy(src, &dst).map(|_| ()))
            .with_context(|| format!("failed to place '{}' in the sequence", src.display()))?;
    }
    Ok(())
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> MeshreelResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/encode/assemble.rs"]
mod tests;
