use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::foundation::error::EnvironmentError;

/// The external programs meshreel drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalTool {
    /// Connectome Workbench's `wb_command`: renders scenes and reads surface/connectivity files.
    Renderer,
    /// `ffmpeg`: encodes frames into the output video.
    Encoder,
}

impl ExternalTool {
    /// Program name searched on `PATH`.
    pub fn program(self) -> &'static str {
        match self {
            Self::Renderer => "wb_command",
            Self::Encoder => "ffmpeg",
        }
    }

    /// Environment variable that overrides the program location.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::Renderer => "WBCOMMAND_BINARY_PATH",
            Self::Encoder => "FFMPEG_BINARY_PATH",
        }
    }

    fn not_found(self) -> EnvironmentError {
        match self {
            Self::Renderer => EnvironmentError::RendererNotFound {
                env_var: self.env_var(),
            },
            Self::Encoder => EnvironmentError::EncoderNotFound {
                env_var: self.env_var(),
            },
        }
    }
}

impl fmt::Display for ExternalTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Resolved locations of the external programs.
///
/// Resolved once at startup and passed explicitly to the components that invoke the tools, so
/// nothing downstream reads the process environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolPaths {
    renderer: Option<PathBuf>,
    encoder: Option<PathBuf>,
}

impl ToolPaths {
    /// Use explicit program paths.
    pub fn new(renderer: impl Into<PathBuf>, encoder: impl Into<PathBuf>) -> Self {
        Self {
            renderer: Some(renderer.into()),
            encoder: Some(encoder.into()),
        }
    }

    /// Resolve both tools from the process environment.
    ///
    /// Missing tools are not an error here; they are reported by [`get`](Self::get) when a
    /// component actually needs them.
    pub fn from_env() -> Self {
        Self::resolve_with(|key| std::env::var_os(key), std::env::var_os("PATH"))
    }

    /// Resolve both tools against an arbitrary environment lookup and `PATH` value.
    ///
    /// An override that names an existing file wins; otherwise the program is searched on
    /// `path_var`.
    pub fn resolve_with(
        env: impl Fn(&str) -> Option<OsString>,
        path_var: Option<OsString>,
    ) -> Self {
        let resolve = |tool: ExternalTool| {
            let from_override = env(tool.env_var())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .filter(|p| p.is_file());
            if from_override.is_some() {
                return from_override;
            }
            if let Some(raw) = env(tool.env_var()).filter(|v| !v.is_empty()) {
                tracing::warn!(
                    var = tool.env_var(),
                    value = %PathBuf::from(raw).display(),
                    "override does not name a file, searching PATH instead"
                );
            }
            path_var
                .as_deref()
                .and_then(|paths| find_on_path(tool.program(), paths))
        };

        Self {
            renderer: resolve(ExternalTool::Renderer),
            encoder: resolve(ExternalTool::Encoder),
        }
    }

    /// Location of `tool`, or the matching not-found error.
    pub fn get(&self, tool: ExternalTool) -> Result<&Path, EnvironmentError> {
        let path = match tool {
            ExternalTool::Renderer => self.renderer.as_deref(),
            ExternalTool::Encoder => self.encoder.as_deref(),
        };
        path.ok_or_else(|| tool.not_found())
    }

    /// Fail unless both tools were found.
    pub fn require_all(&self) -> Result<(), EnvironmentError> {
        self.get(ExternalTool::Renderer)?;
        self.get(ExternalTool::Encoder)?;
        Ok(())
    }
}

fn find_on_path(program: &str, paths: &std::ffi::OsStr) -> Option<PathBuf> {
    std::env::split_paths(paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| {
            let plain = dir.join(program);
            let exe = dir.join(format!("{program}.exe"));
            [plain, exe]
        })
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
#[path = "../../tests/unit/tools/paths.rs"]
mod tests;
