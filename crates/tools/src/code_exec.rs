//! Code execution tool: run one snippet in a fresh interpreter process.
//!
//! Each run gets its own temporary working directory, a cleared environment
//! (only `PATH` and `HOME` survive), and no stdin. The process is confined
//! with [`Confinement`]: it can read system paths and the interpreter's own
//! install, and read/write only its working directory. Nothing persists
//! between runs. The child is killed if the invocation is dropped (timeout or
//! cancellation).

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use regex_lite::Regex;
use threadloom_config::DEFAULT_EXEC_READ_PATHS;
use threadloom_core::error::ToolError;
use threadloom_core::tool::{Tool, ToolOutput};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::confine::{self, Confinement};

const TOOL_NAME: &str = "code_exec";

/// Calls that escape the snippet sandbox through the interpreter itself.
const DENIED_CALLS: &str = r"\b(open|file|execfile|eval|exec|__import__)\s*\(";

pub struct CodeExecTool {
    interpreter: String,
    interpreter_args: Vec<String>,
    max_output_bytes: usize,
    denylist: Regex,
    /// Paths the snippet may read; `None` runs it unconfined
    read_paths: Option<Vec<PathBuf>>,
}

impl CodeExecTool {
    pub fn new(
        interpreter: &str,
        interpreter_args: Vec<String>,
        max_output_bytes: usize,
    ) -> Result<Self, ToolError> {
        let denylist = Regex::new(DENIED_CALLS)
            .map_err(|e| Self::failed(format!("invalid snippet denylist: {e}")))?;
        let tool = Self {
            interpreter: interpreter.to_string(),
            interpreter_args,
            max_output_bytes: max_output_bytes.max(1),
            denylist,
            read_paths: None,
        };
        Ok(tool.with_read_paths(DEFAULT_EXEC_READ_PATHS.iter().map(PathBuf::from).collect()))
    }

    /// Replace the system paths a snippet may read.
    ///
    /// The interpreter's own directories are always added.
    pub fn with_read_paths(mut self, mut paths: Vec<PathBuf>) -> Self {
        paths.extend(confine::interpreter_dirs(&self.interpreter));
        self.read_paths = Some(paths);
        self
    }

    /// Run snippets without filesystem confinement.
    pub fn unconfined(mut self) -> Self {
        self.read_paths = None;
        self
    }

    pub fn is_confined(&self) -> bool {
        self.read_paths.is_some()
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: reason.into(),
        }
    }

    fn check_code(&self, code: &str) -> Result<(), ToolError> {
        if code.trim().is_empty() {
            return Err(ToolError::InvalidArguments("'code' must not be empty".into()));
        }
        if let Some(found) = self.denylist.find(code) {
            return Err(ToolError::PermissionDenied {
                tool_name: TOOL_NAME.into(),
                reason: format!("'{}' is not allowed in snippets", found.as_str().trim_end()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for CodeExecTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Run a short, self-contained code snippet and return what it prints. \
         Use this for calculations or data manipulation. The snippet runs in \
         an empty scratch directory, cannot read host files, and no state \
         carries over between runs."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Source code to execute; print the result"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let code = arguments["code"].as_str().unwrap_or_default();
        self.check_code(code)?;

        let workdir = tempfile::Builder::new()
            .prefix("threadloom-exec-")
            .tempdir()
            .map_err(|e| Self::failed(format!("cannot create sandbox dir: {e}")))?;
        let script = workdir.path().join("snippet");
        tokio::fs::write(&script, code)
            .await
            .map_err(|e| Self::failed(format!("cannot write snippet: {e}")))?;

        let mut command = Command::new(&self.interpreter);
        command
            .args(&self.interpreter_args)
            .arg(&script)
            .current_dir(workdir.path())
            .env_clear()
            .env("HOME", workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let confinement = match &self.read_paths {
            Some(readable) => {
                let writable = [workdir.path().to_path_buf(), PathBuf::from("/dev/null")];
                let confinement = Confinement::prepare(readable, &writable)
                    .map_err(|e| Self::failed(format!("cannot confine snippet: {e}")))?;
                confinement.apply(&mut command);
                Some(confinement)
            }
            None => {
                warn!("Running snippet without confinement");
                None
            }
        };

        debug!(
            interpreter = %self.interpreter,
            bytes = code.len(),
            confined = confinement.is_some(),
            "Running snippet"
        );

        let mut child = command
            .spawn()
            .map_err(|e| Self::failed(format!("cannot start '{}': {e}", self.interpreter)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdout, stderr, status) = tokio::join!(
            read_capped(stdout, self.max_output_bytes),
            read_capped(stderr, self.max_output_bytes),
            child.wait(),
        );
        let status = status.map_err(|e| Self::failed(e.to_string()))?;

        let mut text = stdout.trim_end().to_string();
        let stderr = stderr.trim_end();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str("[stderr]\n");
            text.push_str(stderr);
        }

        if !status.success() {
            let exit = status
                .code()
                .map(|c| format!("exit code {c}"))
                .unwrap_or_else(|| "terminated by signal".into());
            warn!(interpreter = %self.interpreter, %exit, "Snippet failed");
            return Err(Self::failed(format!("{exit}\n{text}").trim_end().to_string()));
        }

        if text.is_empty() {
            text = "(no output)".into();
        }
        Ok(ToolOutput::text(text).with_data(serde_json::json!({
            "exit_code": status.code(),
        })))
    }
}

/// Read a pipe to the end, keeping at most `cap` bytes.
///
/// The remainder is drained so the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                let take = room.min(n);
                kept.extend_from_slice(&buf[..take]);
                dropped += n - take;
            }
        }
    }
    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if dropped > 0 {
        text.push_str(&format!("\n[output truncated, {dropped} bytes omitted]"));
    }
    text
}
