use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::foundation::core::CancelToken;
use crate::tools::paths::ExternalTool;
use crate::tools::runner::{Invocation, InvocationError, ToolOutput, ToolRunner};
use crate::tools::workbench::capture_size;

type Handler = dyn Fn(&Invocation) -> Result<ToolOutput, InvocationError> + Send + Sync;

/// [`ToolRunner`] that records every call and answers from a closure instead of spawning.
///
/// Useful for tests and dry runs. [`emulating_tools`](Self::emulating_tools) produces the
/// files the real tools would: a blank PNG of the requested size per capture and a small
/// placeholder video per encode.
pub struct ScriptedRunner {
    calls: Mutex<Vec<Invocation>>,
    handler: Box<Handler>,
}

impl ScriptedRunner {
    /// Answer every call with `handler`.
    pub fn new(
        handler: impl Fn(&Invocation) -> Result<ToolOutput, InvocationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Emulate the renderer and encoder by writing their output files.
    pub fn emulating_tools() -> Self {
        Self::new(emulate)
    }

    /// Like [`emulating_tools`](Self::emulating_tools), but calls for which `fail` returns
    /// `Some` fail with that error instead.
    pub fn emulating_tools_except(
        fail: impl Fn(&Invocation) -> Option<InvocationError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |inv| match fail(inv) {
            Some(err) => Err(err),
            None => emulate(inv),
        })
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls received for one tool.
    pub fn calls_for(&self, tool: ExternalTool) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| inv.tool == tool)
            .collect()
    }
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("calls", &self.calls().len())
            .finish_non_exhaustive()
    }
}

impl ToolRunner for ScriptedRunner {
    fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancelToken,
    ) -> Result<ToolOutput, InvocationError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
        if cancel.is_cancelled() {
            return Err(InvocationError::Cancelled);
        }
        (self.handler)(invocation)
    }
}

fn emulate(inv: &Invocation) -> Result<ToolOutput, InvocationError> {
    let written = match (inv.tool, inv.arg_str(0)) {
        (ExternalTool::Renderer, Some("-scene-capture-image")) => {
            let (width, height) = capture_size(inv).ok_or_else(|| failed("missing image size"))?;
            let png = inv.args.get(3).ok_or_else(|| failed("missing image path"))?;
            image::RgbaImage::new(width, height)
                .save_with_format(Path::new(png), image::ImageFormat::Png)
                .map_err(|e| failed(&e.to_string()))
        }
        (ExternalTool::Renderer, Some("-gifti-convert")) => match (inv.args.get(2), inv.args.get(3)) {
            (Some(input), Some(output)) => std::fs::copy(input, output)
                .map(|_| ())
                .map_err(|e| failed(&e.to_string())),
            _ => Err(failed("missing surface paths")),
        },
        (ExternalTool::Renderer, _) => Ok(()),
        (ExternalTool::Encoder, _) => {
            let out = inv.args.last().ok_or_else(|| failed("missing output path"))?;
            std::fs::write(out, b"scripted video").map_err(|e| failed(&e.to_string()))
        }
    };
    written.map(|()| ToolOutput::default())
}

fn failed(reason: &str) -> InvocationError {
    InvocationError::NonZeroExit {
        code: Some(1),
        output: reason.to_string(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tools/scripted.rs"]
mod tests;
