use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::foundation::core::CancelToken;
use crate::foundation::error::{FrameFailure, exit_label};
use crate::tools::paths::ExternalTool;

const OUTPUT_TAIL_LINES: usize = 20;

/// One external program call: program, arguments, extra environment and a timeout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Which tool this call belongs to.
    pub tool: ExternalTool,
    /// Resolved program path.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<OsString>,
    /// Extra environment variables set for this process only.
    pub env: Vec<(String, String)>,
    /// Wall-clock limit after which the process is killed.
    pub timeout: Duration,
}

impl Invocation {
    /// Start building a call to `program` with a 10 minute timeout.
    pub fn new(tool: ExternalTool, program: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for this process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Replace the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Argument `i` as UTF-8 text, if present.
    pub fn arg_str(&self, i: usize) -> Option<&str> {
        self.args.get(i).and_then(|a| a.to_str())
    }

    /// Shell-like rendering of the full command line, for diagnostics.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            let arg = arg.to_string_lossy();
            if arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(&arg);
                line.push('\'');
            } else {
                line.push_str(&arg);
            }
        }
        line
    }
}

/// Captured output of a successful call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Why an external call failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// The program could not be started.
    #[error("failed to start {}: {reason}", .program.display())]
    Spawn {
        /// Program path.
        program: PathBuf,
        /// OS error text.
        reason: String,
    },

    /// The program exited unsuccessfully.
    #[error("exited with status {}: {output}", exit_label(.code))]
    NonZeroExit {
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Tail of the program's output.
        output: String,
    },

    /// The program ran past its timeout and was killed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The call was cancelled and the program was killed.
    #[error("cancelled")]
    Cancelled,

    /// Waiting on the program failed.
    #[error("failed to wait for process: {0}")]
    Wait(String),
}

impl From<InvocationError> for FrameFailure {
    fn from(err: InvocationError) -> Self {
        match err {
            InvocationError::Spawn { reason, .. } => Self::Spawn { reason },
            InvocationError::NonZeroExit { code, output } => Self::NonZeroExit { code, output },
            InvocationError::Timeout(after) => Self::Timeout { after },
            InvocationError::Cancelled => Self::Cancelled,
            InvocationError::Wait(reason) => Self::Spawn { reason },
        }
    }
}

/// Capability to run an external tool to completion.
///
/// Implementations must honour the invocation's timeout and the cancel token: a hung or
/// cancelled process is killed and reported, never waited on indefinitely.
pub trait ToolRunner: Send + Sync {
    /// Run `invocation` and capture its output.
    fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancelToken,
    ) -> Result<ToolOutput, InvocationError>;
}

/// [`ToolRunner`] that spawns real OS processes.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    poll_interval: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
        }
    }
}

impl ProcessRunner {
    /// Create a runner with the default 20 ms poll interval.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ToolRunner for ProcessRunner {
    fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancelToken,
    ) -> Result<ToolOutput, InvocationError> {
        tracing::debug!(tool = %invocation.tool, command = %invocation.command_line(), "running");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| InvocationError::Spawn {
            program: invocation.program.clone(),
            reason: e.to_string(),
        })?;
        let stdout_drain = drain(child.stdout.take());
        let stderr_drain = drain(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(InvocationError::Wait(e.to_string()));
                }
            }
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(InvocationError::Cancelled);
            }
            if started.elapsed() >= invocation.timeout {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(tool = %invocation.tool, timeout = ?invocation.timeout, "killed hung process");
                return Err(InvocationError::Timeout(invocation.timeout));
            }
            std::thread::sleep(self.poll_interval);
        };

        let out = ToolOutput {
            stdout: join_drain(stdout_drain),
            stderr: join_drain(stderr_drain),
        };
        for line in out.stdout.lines().chain(out.stderr.lines()) {
            tracing::debug!(tool = %invocation.tool, "{line}");
        }

        if !status.success() {
            let combined = if out.stderr.trim().is_empty() {
                &out.stdout
            } else {
                &out.stderr
            };
            return Err(InvocationError::NonZeroExit {
                code: status.code(),
                output: tail_lines(combined, OUTPUT_TAIL_LINES),
            });
        }
        Ok(out)
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut s| {
        std::thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = s.read_to_end(&mut bytes);
            bytes
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Last `n` non-empty lines of `text`, joined with newlines.
pub(crate) fn tail_lines(text: &str, n: usize) -> String {
    let lines = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
#[path = "../../tests/unit/tools/runner.rs"]
mod tests;
