use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::encode::assemble::{AssembleOpts, FrameAssembler};
use crate::foundation::core::CancelToken;
use crate::foundation::error::{AssemblyError, MeshreelError, MeshreelResult};
use crate::plan::planner::{PlanRequest, TraversalPlanner};
use crate::plan::traversal::Traversal;
use crate::render::dispatch::{RenderDispatcher, RenderManifest, RenderOpts, default_workers};
use crate::scene::atlas::{SceneAtlas, SurfaceAtlas};
use crate::scene::document::SceneDocument;
use crate::session::workdir::WorkDir;
use crate::tools::paths::{ExternalTool, ToolPaths};
use crate::tools::runner::ToolRunner;

/// Where a [`MovieSession`] is in its pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing has run yet.
    Idle,
    /// Turning waypoints into a traversal.
    Planning,
    /// Rendering one frame per traversal index.
    Rendering,
    /// Encoding the frames.
    Assembling,
    /// The video was written.
    Done,
    /// A stage failed or the run was cancelled.
    Failed,
}

/// Options controlling a movie run.
#[derive(Clone, Debug, PartialEq)]
pub struct MovieOpts {
    /// Frame width in pixels. Must be even.
    pub width: u32,
    /// Frame height in pixels. Must be even.
    pub height: u32,
    /// Output frames per second.
    pub framerate: u32,
    /// Concurrent renderer processes.
    pub workers: usize,
    /// Per-frame renderer timeout.
    pub render_timeout: Duration,
    /// Encoder timeout.
    pub encode_timeout: Duration,
    /// Largest tolerated fraction of failed frames. `0.0` aborts on any failure.
    pub max_failed_fraction: f64,
    /// Render repeated positions once.
    pub reuse_repeated_positions: bool,
    /// Keep the working files here instead of deleting them.
    pub keep_frames: Option<PathBuf>,
    /// Overwrite an existing output file.
    pub overwrite: bool,
    /// Parent of the temporary working directories. `None` uses the system temp dir.
    pub work_root: Option<PathBuf>,
}

impl Default for MovieOpts {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            framerate: 10,
            workers: default_workers(),
            render_timeout: Duration::from_secs(10 * 60),
            encode_timeout: Duration::from_secs(60 * 60),
            max_failed_fraction: 0.0,
            reuse_repeated_positions: true,
            keep_frames: None,
            overwrite: true,
            work_root: None,
        }
    }
}

impl MovieOpts {
    /// Check sizes, rates, worker count and the failure fraction.
    pub fn validate(&self) -> MeshreelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MeshreelError::invalid("width/height must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(MeshreelError::invalid(
                "width/height must be even (required for yuv420p output)",
            ));
        }
        if self.framerate == 0 {
            return Err(MeshreelError::invalid("framerate must be non-zero"));
        }
        if self.workers == 0 {
            return Err(MeshreelError::invalid("worker count must be >= 1"));
        }
        if self.render_timeout.is_zero() || self.encode_timeout.is_zero() {
            return Err(MeshreelError::invalid("timeouts must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.max_failed_fraction) {
            return Err(MeshreelError::invalid(
                "max failed fraction must be within [0, 1]",
            ));
        }
        Ok(())
    }

    fn render_opts(&self) -> RenderOpts {
        RenderOpts {
            width: self.width,
            height: self.height,
            workers: self.workers,
            timeout: self.render_timeout,
            reuse_repeated_positions: self.reuse_repeated_positions,
        }
    }

    fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// One movie to generate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovieRequest {
    /// Scene file.
    pub scene_path: PathBuf,
    /// Name of the scene inside the file.
    pub scene_name: String,
    /// Video file to write.
    pub output: PathBuf,
    /// Waypoints, mode and transforms.
    pub plan: PlanRequest,
}

impl MovieRequest {
    /// Bundle the parts of a request.
    pub fn new(
        scene_path: impl Into<PathBuf>,
        scene_name: impl Into<String>,
        output: impl Into<PathBuf>,
        plan: PlanRequest,
    ) -> Self {
        Self {
            scene_path: scene_path.into(),
            scene_name: scene_name.into(),
            output: output.into(),
            plan,
        }
    }
}

/// Result of a successful run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct MovieReport {
    /// Video file written.
    pub output: PathBuf,
    /// Traversal length, i.e. frames in the manifest.
    pub frames: usize,
    /// Renderer invocations made.
    pub renders: usize,
    /// Failed indices left out of the video.
    pub skipped: Vec<usize>,
    /// Size of the video in bytes.
    pub bytes: u64,
    /// Where the working files were kept, if requested.
    pub kept_frames: Option<PathBuf>,
}

/// Runs plan -> render -> assemble for one movie at a time.
///
/// The session owns the working directories of a run: they are created inside the run and
/// removed on every exit path, unless [`MovieOpts::keep_frames`] asks for them to be kept.
pub struct MovieSession {
    tools: ToolPaths,
    runner: Arc<dyn ToolRunner>,
    opts: MovieOpts,
    cancel: CancelToken,
    stages: Mutex<Vec<Stage>>,
}

impl MovieSession {
    /// Create a session invoking the tools in `tools` through `runner`.
    pub fn new(tools: ToolPaths, runner: Arc<dyn ToolRunner>, opts: MovieOpts) -> Self {
        Self {
            tools,
            runner,
            opts,
            cancel: CancelToken::new(),
            stages: Mutex::new(vec![Stage::Idle]),
        }
    }

    /// Token that aborts the current run when raised. In-flight tool processes are killed.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
            .unwrap_or(Stage::Idle)
    }

    /// Every stage entered so far, in order.
    pub fn history(&self) -> Vec<Stage> {
        self.stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Generate the movie, reading rows and surfaces from the files the scene references.
    #[tracing::instrument(skip_all, fields(scene = %request.scene_name))]
    pub fn generate(&self, request: &MovieRequest) -> MeshreelResult<MovieReport> {
        let prepared = self.prepare(request);
        let (scene, renderer, encoder) = self.track(prepared)?;

        let scratch = self.track(WorkDir::create_in(&self.opts.work_root()))?;
        let atlas = SceneAtlas::new(
            Arc::clone(&scene),
            renderer,
            Arc::clone(&self.runner),
            self.cancel.clone(),
            scratch.path().join("surfaces"),
        )
        .with_timeout(self.opts.render_timeout);

        let result = self.run(request, scene, &atlas, renderer, encoder);
        self.track(result)
    }

    /// Generate the movie with rows and surfaces taken from `atlas`.
    #[tracing::instrument(skip_all, fields(scene = %request.scene_name))]
    pub fn generate_with_atlas(
        &self,
        request: &MovieRequest,
        atlas: &dyn SurfaceAtlas,
    ) -> MeshreelResult<MovieReport> {
        let prepared = self.prepare(request);
        let (scene, renderer, encoder) = self.track(prepared)?;
        let result = self.run(request, scene, atlas, renderer, encoder);
        self.track(result)
    }

    /// Everything that can fail before planning: options, flags, tools and the scene.
    fn prepare(&self, request: &MovieRequest) -> MeshreelResult<(Arc<SceneDocument>, &Path, &Path)> {
        self.opts.validate()?;
        request.plan.mode()?;
        request.plan.transform.validate()?;
        let renderer = self.tools.get(ExternalTool::Renderer)?;
        let encoder = self.tools.get(ExternalTool::Encoder)?;
        let scene = SceneDocument::load(&request.scene_path, &request.scene_name)?;
        Ok((Arc::new(scene), renderer, encoder))
    }

    fn run(
        &self,
        request: &MovieRequest,
        scene: Arc<SceneDocument>,
        atlas: &dyn SurfaceAtlas,
        renderer: &Path,
        encoder: &Path,
    ) -> MeshreelResult<MovieReport> {
        self.enter(Stage::Planning)?;
        let traversal = TraversalPlanner::new(atlas).plan(&request.plan)?;

        self.enter(Stage::Rendering)?;
        let workdir = WorkDir::create_in(&self.opts.work_root())?;
        let result = self.render_and_assemble(request, scene, &traversal, &workdir, renderer, encoder);

        let Some(keep) = self.opts.keep_frames.as_deref() else {
            return result.map(|(report, _)| report).map_err(|(e, _)| e);
        };
        let manifest_written = match &result {
            Ok((_, manifest)) | Err((_, Some(manifest))) => {
                manifest.write_json(&workdir.path().join("manifest.json"))
            }
            Err((_, None)) => Ok(()),
        };
        let kept = manifest_written.and_then(|()| workdir.persist(keep));
        match (result, kept) {
            (Ok((mut report, _)), Ok(kept)) => {
                report.kept_frames = Some(kept);
                Ok(report)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err((e, _)), kept) => {
                if let Err(keep_err) = kept {
                    tracing::warn!("failed to keep working files: {keep_err}");
                }
                Err(e)
            }
        }
    }

    /// Render and encode. On failure the manifest is returned alongside the error when one
    /// was produced.
    fn render_and_assemble(
        &self,
        request: &MovieRequest,
        scene: Arc<SceneDocument>,
        traversal: &Traversal,
        workdir: &WorkDir,
        renderer: &Path,
        encoder: &Path,
    ) -> Result<(MovieReport, RenderManifest), (MeshreelError, Option<RenderManifest>)> {
        let dispatcher = RenderDispatcher::new(
            scene,
            renderer,
            Arc::clone(&self.runner),
            self.cancel.clone(),
            self.opts.render_opts(),
        );
        let manifest = dispatcher
            .render(traversal, workdir.path())
            .map_err(|e| (e, None))?;

        let failed = manifest.failed_indices();
        let fraction = manifest.failed_fraction();
        if fraction > self.opts.max_failed_fraction {
            tracing::warn!(
                failed = failed.len(),
                total = manifest.len(),
                limit = self.opts.max_failed_fraction,
                "too many frames failed, not encoding"
            );
            let err = AssemblyError::IncompleteRender {
                failed,
                total: manifest.len(),
            };
            return Err((err.into(), Some(manifest)));
        }

        if let Err(e) = self.enter(Stage::Assembling) {
            return Err((e, Some(manifest)));
        }
        let assembler = FrameAssembler::new(encoder, Arc::clone(&self.runner), self.cancel.clone());
        let opts = AssembleOpts {
            framerate: self.opts.framerate,
            overwrite: self.opts.overwrite,
            timeout: self.opts.encode_timeout,
            skip_failed: !failed.is_empty(),
        };
        let assembled = match assembler.assemble(&manifest, workdir.path(), &request.output, &opts) {
            Ok(report) => report,
            Err(e) => return Err((e, Some(manifest))),
        };

        self.set_stage(Stage::Done);
        let report = MovieReport {
            output: assembled.output,
            frames: manifest.len(),
            renders: manifest.distinct_renders(),
            skipped: assembled.skipped,
            bytes: assembled.bytes,
            kept_frames: None,
        };
        tracing::info!(
            output = %report.output.display(),
            frames = report.frames,
            renders = report.renders,
            "movie written"
        );
        Ok((report, manifest))
    }

    /// Move to `stage`, unless the run was cancelled.
    fn enter(&self, stage: Stage) -> MeshreelResult<()> {
        if self.cancel.is_cancelled() {
            return Err(MeshreelError::Cancelled);
        }
        self.set_stage(stage);
        Ok(())
    }

    fn set_stage(&self, stage: Stage) {
        tracing::debug!(?stage, "entering stage");
        self.stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stage);
    }

    /// Record [`Stage::Failed`] for an error result.
    fn track<T>(&self, result: MeshreelResult<T>) -> MeshreelResult<T> {
        if let Err(e) = &result {
            tracing::error!("movie generation failed: {e}");
            self.set_stage(Stage::Failed);
        }
        result
    }
}

impl std::fmt::Debug for MovieSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovieSession")
            .field("tools", &self.tools)
            .field("opts", &self.opts)
            .field("stage", &self.stage())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/movie.rs"]
mod tests;
