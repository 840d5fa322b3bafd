//! # Node Runtime
//!
//! Runs a compiled local-mode module in a fresh interpreter process. The
//! request goes in on stdin; the response comes back as one marked stdout
//! line. Anything else the function prints is forwarded to the log.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::bundle::{write_temp_module, Artifact};
use crate::codegen::RESPONSE_MARKER;
use crate::functions::{FunctionError, FunctionResult, HandlerResponse};

/// One call into a compiled module
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub function: &'a str,
    pub artifact: &'a Artifact,
    /// Directory the module is materialised in
    pub directory: &'a Path,
    pub env: &'a BTreeMap<String, String>,
    pub event: &'a Value,
    pub context: &'a Value,
}

/// Loads and runs compiled modules
#[async_trait]
pub trait ModuleRuntime: Send + Sync {
    async fn invoke(&self, invocation: Invocation<'_>) -> FunctionResult<HandlerResponse>;
}

/// Interpreter process runtime
#[derive(Debug, Clone)]
pub struct NodeRuntime {
    command: Vec<String>,
}

impl Default for NodeRuntime {
    fn default() -> Self {
        Self {
            command: vec!["node".to_string()],
        }
    }
}

impl NodeRuntime {
    /// Runtime with a custom interpreter command; the module path is appended
    pub fn new(command: Vec<String>) -> FunctionResult<Self> {
        if command.is_empty() {
            return Err(FunctionError::Config(
                "runtime command must not be empty".into(),
            ));
        }
        Ok(Self { command })
    }
}

#[async_trait]
impl ModuleRuntime for NodeRuntime {
    async fn invoke(&self, invocation: Invocation<'_>) -> FunctionResult<HandlerResponse> {
        // Unique per invocation and removed when dropped.
        let module = write_temp_module(&invocation.artifact.code, invocation.directory)?;

        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .arg(module.path())
            .current_dir(invocation.directory)
            .envs(invocation.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                FunctionError::Runtime(format!("failed to start {}: {}", self.command[0], e))
            })?;

        let request = json!({ "event": invocation.event, "context": invocation.context });
        if let Some(mut stdin) = child.stdin.take() {
            // A module that exits before reading its input closes the pipe;
            // the exit status tells the rest.
            if let Err(e) = stdin.write_all(request.to_string().as_bytes()).await {
                debug!(function = invocation.function, error = %e, "request not delivered");
            }
            let _ = stdin.shutdown().await;
        }

        let output = child.wait_with_output().await?;
        drop(module);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut response_line = None;
        for line in stdout.lines() {
            match line.strip_prefix(RESPONSE_MARKER) {
                Some(payload) => response_line = Some(payload),
                None if !line.is_empty() => {
                    info!(function = invocation.function, "{}", line);
                }
                None => {}
            }
        }
        for line in stderr.lines().filter(|l| !l.is_empty()) {
            info!(function = invocation.function, stream = "stderr", "{}", line);
        }

        debug!(function = invocation.function, status = %output.status, "module exited");

        match response_line {
            Some(payload) => serde_json::from_str(payload).map_err(|e| {
                FunctionError::Runtime(format!("malformed handler response: {}", e))
            }),
            None if !output.status.success() => Err(FunctionError::Runtime(
                last_error_line(&stderr)
                    .unwrap_or_else(|| format!("{} exited with {}", self.command[0], output.status)),
            )),
            None => Err(FunctionError::Runtime(
                "handler returned without a response".into(),
            )),
        }
    }
}

/// The thrown error's message line from an interpreter crash report
fn last_error_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("at ") && !l.starts_with("Node.js v"))
        .last()
        .map(str::to_string)
}
