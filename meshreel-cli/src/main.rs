use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use meshreel::{
    CancelToken, MovieOpts, MovieRequest, MovieSession, PlanRequest, ProcessRunner, ToolPaths,
    TraversalTransform,
};
use tracing::Level;

/// Render a movie of a marker travelling across a brain surface.
///
/// Waypoints are connectivity rows by default. With `--vertex-mode` the first waypoint names a
/// structure (e.g. CORTEX_LEFT) and the rest are vertices on it; with `--border-file` the single
/// waypoint is a border file whose points are used in order.
///
/// The renderer and encoder are found through WBCOMMAND_BINARY_PATH and FFMPEG_BINARY_PATH,
/// falling back to PATH.
#[derive(Parser, Debug)]
#[command(name = "meshreel", version)]
struct Cli {
    /// Scene file.
    #[arg(short = 's', long)]
    scene_path: PathBuf,

    /// Name of the scene to render.
    #[arg(short = 'n', long)]
    scene_name: String,

    /// Output video path.
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Frame width in pixels.
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Frame height in pixels.
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Frames per second.
    #[arg(short = 'r', long, default_value_t = 10)]
    framerate: u32,

    /// Return to the first waypoint at the end.
    #[arg(long)]
    closed: bool,

    /// Play the path forwards, then backwards.
    #[arg(long)]
    reverse: bool,

    /// Number of times to play the path.
    #[arg(long, default_value_t = 1)]
    loops: u32,

    /// Concurrent renderer processes (default: number of processors).
    #[arg(long)]
    num_cpus: Option<usize>,

    /// Waypoints are `STRUCTURE VERTEX...` instead of rows.
    #[arg(long)]
    vertex_mode: bool,

    /// The waypoint is a border file.
    #[arg(long)]
    border_file: bool,

    /// Largest fraction of failed frames still encoded (failed frames are left out).
    #[arg(long, default_value_t = 0.0)]
    max_failed_fraction: f64,

    /// Per-frame renderer timeout in seconds.
    #[arg(long, default_value_t = 600)]
    render_timeout: u64,

    /// Keep scenes, frames and the render manifest in this directory.
    #[arg(long)]
    keep_frames: Option<PathBuf>,

    /// Log every tool invocation and its output.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,

    /// Row indices, vertex-mode waypoints or a border file.
    #[arg(required = true, num_args = 1.., value_name = "ROW_INDICES")]
    row_indices: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let defaults = MovieOpts::default();
    let opts = MovieOpts {
        width: cli.width,
        height: cli.height,
        framerate: cli.framerate,
        workers: cli.num_cpus.unwrap_or(defaults.workers),
        render_timeout: Duration::from_secs(cli.render_timeout),
        max_failed_fraction: cli.max_failed_fraction,
        keep_frames: cli.keep_frames,
        ..defaults
    };
    let plan = PlanRequest {
        waypoints: cli.row_indices,
        vertex_mode: cli.vertex_mode,
        border_file: cli.border_file,
        transform: TraversalTransform {
            closed: cli.closed,
            reverse: cli.reverse,
            loops: cli.loops,
        },
    };
    let request = MovieRequest::new(cli.scene_path, cli.scene_name, cli.output, plan);

    let session = MovieSession::new(ToolPaths::from_env(), Arc::new(ProcessRunner::new()), opts);
    install_interrupt_handler(session.cancel_token())?;
    let report = session
        .generate(&request)
        .with_context(|| format!("failed to generate '{}'", request.output.display()))?;

    if !report.skipped.is_empty() {
        eprintln!("left out failed frames {:?}", report.skipped);
    }
    if let Some(dir) = &report.kept_frames {
        eprintln!("kept frames in {}", dir.display());
    }
    eprintln!(
        "wrote {} ({} frames, {} renders)",
        report.output.display(),
        report.frames,
        report.renders
    );
    Ok(())
}

/// Turn SIGINT/SIGTERM into a cancellation, so running tools are killed and the working
/// directories are removed before the process exits.
fn install_interrupt_handler(cancel: CancelToken) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        if !cancel.is_cancelled() {
            tracing::warn!("interrupted, stopping running tools");
        }
        cancel.cancel();
    })
    .context("failed to install the interrupt handler")
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
