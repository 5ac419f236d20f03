//! Command lines for the workbench tool (`wb_command`).

use std::path::Path;
use std::time::Duration;

use crate::tools::paths::ExternalTool;
use crate::tools::runner::Invocation;

/// Render `scene_name` from `scene_path` into a `width x height` PNG at `png_path`.
///
/// Each render is single-threaded (`OMP_NUM_THREADS=1`); parallelism comes from running
/// several renders at once.
pub fn capture_image_invocation(
    program: &Path,
    scene_path: &Path,
    scene_name: &str,
    png_path: &Path,
    width: u32,
    height: u32,
    timeout: Duration,
) -> Invocation {
    Invocation::new(ExternalTool::Renderer, program)
        .arg("-scene-capture-image")
        .arg(scene_path)
        .arg(scene_name)
        .arg(png_path)
        .arg("-size-width-height")
        .arg(width.to_string())
        .arg(height.to_string())
        .env("OMP_NUM_THREADS", "1")
        .timeout(timeout)
}

/// Print the CIFTI XML header of a connectivity file on stdout.
pub fn cifti_xml_invocation(program: &Path, cifti_path: &Path, timeout: Duration) -> Invocation {
    Invocation::new(ExternalTool::Renderer, program)
        .arg("-file-information")
        .arg(cifti_path)
        .arg("-only-cifti-xml")
        .timeout(timeout)
}

/// Re-encode a GIFTI surface with ASCII data arrays.
pub fn gifti_ascii_invocation(
    program: &Path,
    input: &Path,
    output: &Path,
    timeout: Duration,
) -> Invocation {
    Invocation::new(ExternalTool::Renderer, program)
        .arg("-gifti-convert")
        .arg("ASCII")
        .arg(input)
        .arg(output)
        .timeout(timeout)
}

/// Parse the `W H` pair following `-size-width-height` in a capture invocation.
pub fn capture_size(invocation: &Invocation) -> Option<(u32, u32)> {
    let flag = invocation
        .args
        .iter()
        .position(|a| a == "-size-width-height")?;
    let width = invocation.arg_str(flag + 1)?.parse().ok()?;
    let height = invocation.arg_str(flag + 2)?.parse().ok()?;
    Some((width, height))
}

#[cfg(test)]
#[path = "../../tests/unit/tools/workbench.rs"]
mod tests;
