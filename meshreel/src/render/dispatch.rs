use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use rayon::prelude::*;

use crate::foundation::core::{CancelToken, MeshPosition};
use crate::foundation::error::{FrameFailure, MeshreelError, MeshreelResult};
use crate::plan::traversal::Traversal;
use crate::scene::document::SceneDocument;
use crate::tools::runner::ToolRunner;
use crate::tools::workbench::capture_image_invocation;

/// Options for [`RenderDispatcher`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderOpts {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Maximum number of renderer processes running at once.
    pub workers: usize,
    /// Per-frame renderer timeout.
    pub timeout: Duration,
    /// Render each distinct position once and share the image between its indices.
    pub reuse_repeated_positions: bool,
}

impl Default for RenderOpts {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            workers: default_workers(),
            timeout: Duration::from_secs(10 * 60),
            reuse_repeated_positions: true,
        }
    }
}

impl RenderOpts {
    /// Reject zero sizes, zero workers and a zero timeout.
    pub fn validate(&self) -> MeshreelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MeshreelError::invalid("frame width/height must be non-zero"));
        }
        if self.workers == 0 {
            return Err(MeshreelError::invalid("worker count must be >= 1"));
        }
        if self.timeout.is_zero() {
            return Err(MeshreelError::invalid("render timeout must be non-zero"));
        }
        Ok(())
    }
}

/// Number of available processors, at least 1.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// One frame to render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameJob {
    /// Traversal index the frame is rendered for.
    pub index: usize,
    /// Marker position.
    pub position: MeshPosition,
    /// Scene file written for this frame only.
    pub scene_path: PathBuf,
    /// Image the renderer writes.
    pub image_path: PathBuf,
}

impl FrameJob {
    fn new(index: usize, position: MeshPosition, workdir: &Path) -> Self {
        Self {
            index,
            position,
            scene_path: workdir.join("scenes").join(format!("frame{index:09}.scene")),
            image_path: workdir.join("frames").join(format!("frame{index:09}.png")),
        }
    }
}

/// Terminal state of a frame.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FrameOutcome {
    /// The image at `path` is ready.
    Rendered {
        /// Rendered image.
        path: PathBuf,
    },
    /// The frame could not be rendered.
    Failed {
        /// Why.
        reason: FrameFailure,
    },
}

impl FrameOutcome {
    /// Image path when rendered.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Rendered { path } => Some(path.as_path()),
            Self::Failed { .. } => None,
        }
    }
}

/// Manifest row for one traversal index.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ManifestEntry {
    /// Traversal index.
    pub index: usize,
    /// Marker position of this frame.
    pub position: MeshPosition,
    /// Result of rendering.
    pub outcome: FrameOutcome,
    /// Earlier index whose render this entry reuses, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_with: Option<usize>,
}

/// Frame outcomes in traversal order, exactly one entry per index.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct RenderManifest {
    /// Frame width the renderer was asked for.
    pub width: u32,
    /// Frame height the renderer was asked for.
    pub height: u32,
    /// One entry per traversal index, `entries[i].index == i`.
    pub entries: Vec<ManifestEntry>,
}

impl RenderManifest {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices whose frame failed, ascending.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, FrameOutcome::Failed { .. }))
            .map(|e| e.index)
            .collect()
    }

    /// Fraction of entries that failed, 0 for an empty manifest.
    pub fn failed_fraction(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.failed_indices().len() as f64 / self.entries.len() as f64
    }

    /// Number of renderer invocations the manifest needed.
    pub fn distinct_renders(&self) -> usize {
        self.entries.iter().filter(|e| e.shared_with.is_none()).count()
    }

    /// Write the manifest as pretty JSON.
    pub fn write_json(&self, path: &Path) -> MeshreelResult<()> {
        let json = serde_json::to_vec_pretty(self).context("failed to serialize manifest")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write manifest '{}'", path.display()))?;
        Ok(())
    }
}

/// Renders one frame per traversal index on a bounded pool of workers.
///
/// Every frame gets its own scene file and image path, so workers never share a file. A
/// failing frame is recorded in the manifest and does not stop its siblings.
pub struct RenderDispatcher {
    scene: Arc<SceneDocument>,
    renderer: PathBuf,
    runner: Arc<dyn ToolRunner>,
    cancel: CancelToken,
    opts: RenderOpts,
}

impl RenderDispatcher {
    /// Render `scene` with the renderer binary at `renderer`.
    pub fn new(
        scene: Arc<SceneDocument>,
        renderer: impl Into<PathBuf>,
        runner: Arc<dyn ToolRunner>,
        cancel: CancelToken,
        opts: RenderOpts,
    ) -> Self {
        Self {
            scene,
            renderer: renderer.into(),
            runner,
            cancel,
            opts,
        }
    }

    /// Render every position of `traversal` into `workdir`.
    ///
    /// Returns `Err` only for setup problems and cancellation; frame failures are part of the
    /// returned manifest.
    #[tracing::instrument(skip_all, fields(frames = traversal.len(), workers = self.opts.workers))]
    pub fn render(&self, traversal: &Traversal, workdir: &Path) -> MeshreelResult<RenderManifest> {
        self.opts.validate()?;
        for sub in ["scenes", "frames"] {
            let dir = workdir.join(sub);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create '{}'", dir.display()))?;
        }

        let positions = traversal.positions();
        let mut unique_indices = Vec::<usize>::with_capacity(positions.len());
        let mut frame_to_unique = Vec::<usize>::with_capacity(positions.len());
        if self.opts.reuse_repeated_positions {
            let mut first = HashMap::<&MeshPosition, usize>::new();
            for (idx, position) in positions.iter().enumerate() {
                if let Some(existing) = first.get(position).copied() {
                    frame_to_unique.push(existing);
                } else {
                    let slot = unique_indices.len();
                    unique_indices.push(idx);
                    first.insert(position, slot);
                    frame_to_unique.push(slot);
                }
            }
        } else {
            for idx in 0..positions.len() {
                frame_to_unique.push(idx);
                unique_indices.push(idx);
            }
        }

        let jobs = unique_indices
            .iter()
            .map(|&idx| FrameJob::new(idx, positions[idx].clone(), workdir))
            .collect::<Vec<_>>();
        tracing::info!(
            frames = positions.len(),
            renders = jobs.len(),
            workers = self.opts.workers,
            "rendering frames"
        );

        let pool = build_thread_pool(self.opts.workers)?;
        let mut results = Vec::with_capacity(jobs.len());
        pool.install(|| {
            jobs.par_iter()
                .with_max_len(1)
                .map(|job| self.render_one(job))
                .collect_into_vec(&mut results);
        });

        if self.cancel.is_cancelled() {
            return Err(MeshreelError::Cancelled);
        }

        let entries = positions
            .iter()
            .enumerate()
            .map(|(index, position)| {
                let unique = frame_to_unique[index];
                let source = unique_indices[unique];
                let outcome = match &results[unique] {
                    Ok(path) => FrameOutcome::Rendered { path: path.clone() },
                    Err(reason) => FrameOutcome::Failed {
                        reason: reason.clone(),
                    },
                };
                ManifestEntry {
                    index,
                    position: position.clone(),
                    outcome,
                    shared_with: (source != index).then_some(source),
                }
            })
            .collect::<Vec<_>>();

        let manifest = RenderManifest {
            width: self.opts.width,
            height: self.opts.height,
            entries,
        };
        let failed = manifest.failed_indices();
        if failed.is_empty() {
            tracing::info!(frames = manifest.len(), renders = jobs.len(), "all frames rendered");
        } else {
            tracing::warn!(
                frames = manifest.len(),
                failed = failed.len(),
                "some frames failed to render: {failed:?}"
            );
        }
        Ok(manifest)
    }

    fn render_one(&self, job: &FrameJob) -> Result<PathBuf, FrameFailure> {
        if self.cancel.is_cancelled() {
            return Err(FrameFailure::Cancelled);
        }

        let scene_text = self.scene.render_with_marker(&job.position);
        std::fs::write(&job.scene_path, scene_text).map_err(|e| FrameFailure::SceneWrite {
            reason: format!("{}: {e}", job.scene_path.display()),
        })?;

        let invocation = capture_image_invocation(
            &self.renderer,
            &job.scene_path,
            self.scene.name(),
            &job.image_path,
            self.opts.width,
            self.opts.height,
            self.opts.timeout,
        );
        let outcome = self
            .runner
            .run(&invocation, &self.cancel)
            .map_err(FrameFailure::from)
            .and_then(|_| check_image(&job.image_path, self.opts.width, self.opts.height));

        match &outcome {
            Ok(()) => tracing::debug!(index = job.index, position = %job.position, "frame rendered"),
            Err(reason) => tracing::warn!(
                index = job.index,
                position = %job.position,
                "frame failed: {reason}"
            ),
        }
        outcome.map(|()| job.image_path.clone())
    }
}

impl std::fmt::Debug for RenderDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDispatcher")
            .field("scene", &self.scene.path())
            .field("renderer", &self.renderer)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

/// Decode the renderer's image and check its size.
fn check_image(path: &Path, width: u32, height: u32) -> Result<(), FrameFailure> {
    if !path.is_file() {
        return Err(FrameFailure::MalformedOutput {
            reason: format!("renderer produced no image at '{}'", path.display()),
        });
    }
    let image = image::open(path).map_err(|e| FrameFailure::MalformedOutput {
        reason: format!("'{}' is not a readable image: {e}", path.display()),
    })?;
    if (image.width(), image.height()) != (width, height) {
        return Err(FrameFailure::MalformedOutput {
            reason: format!(
                "image is {}x{}, expected {width}x{height}",
                image.width(),
                image.height()
            ),
        });
    }
    Ok(())
}

fn build_thread_pool(threads: usize) -> MeshreelResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(MeshreelError::invalid("worker count must be >= 1"));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("meshreel-render-{i}"))
        .build()
        .context("failed to build render thread pool")
        .map_err(MeshreelError::from)
}

#[cfg(test)]
#[path = "../../tests/unit/render/dispatch.rs"]
mod tests;
