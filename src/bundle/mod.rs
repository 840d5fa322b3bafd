//! # Bundling
//!
//! Turns generated module text into the artifact that is archived for
//! deployment or loaded by the local runtime.
//!
//! The generated text is written to a uniquely named temporary file for the
//! duration of the compile call only.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::{Builder, NamedTempFile};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::functions::{FunctionError, FunctionResult};
use crate::observability::Event;

/// Placeholder replaced by the generated module path
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Placeholder replaced by the path the bundle must be written to
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Compiled module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub code: Vec<u8>,
    pub source_map: Option<Vec<u8>>,
}

impl Artifact {
    pub fn new(code: impl Into<Vec<u8>>) -> Self {
        Self {
            code: code.into(),
            source_map: None,
        }
    }

    /// Hex SHA-256 of the code
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.code))
    }
}

/// External compile capability
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile the module at `input`
    async fn compile(&self, input: &Path) -> FunctionResult<Artifact>;
}

/// Uses the generated text unchanged
#[derive(Debug, Clone, Default)]
pub struct PassthroughCompiler;

#[async_trait]
impl Compiler for PassthroughCompiler {
    async fn compile(&self, input: &Path) -> FunctionResult<Artifact> {
        let code = tokio::fs::read(input)
            .await
            .map_err(|e| FunctionError::read(input, e))?;
        Ok(Artifact::new(code))
    }
}

/// Runs a configured bundler command.
///
/// `{input}` and `{output}` in the arguments are replaced with the generated
/// module path and a temporary output path. Without `{output}` the bundle is
/// read from the command's stdout.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    argv: Vec<String>,
}

impl CommandCompiler {
    pub fn new(argv: Vec<String>) -> FunctionResult<Self> {
        if argv.is_empty() {
            return Err(FunctionError::Config(
                "bundler command must not be empty".into(),
            ));
        }
        if !argv.iter().any(|a| a.contains(INPUT_PLACEHOLDER)) {
            return Err(FunctionError::Config(format!(
                "bundler command must reference {}",
                INPUT_PLACEHOLDER
            )));
        }
        Ok(Self { argv })
    }

    fn writes_output_file(&self) -> bool {
        self.argv.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER))
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(&self, input: &Path) -> FunctionResult<Artifact> {
        let dir = input.parent().unwrap_or_else(|| Path::new("."));

        let output = Builder::new()
            .prefix(".fnctl-bundle-")
            .suffix(".js")
            .tempfile_in(dir)?;
        let output_path = output.path().to_path_buf();
        let map_path = output_path.with_extension("js.map");

        let args: Vec<String> = self.argv[1..]
            .iter()
            .map(|a| {
                a.replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
                    .replace(OUTPUT_PLACEHOLDER, &output_path.to_string_lossy())
            })
            .collect();

        debug!(command = %self.argv[0], ?args, "running bundler");

        let result = Command::new(&self.argv[0])
            .args(&args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                FunctionError::Compile(format!("failed to start {}: {}", self.argv[0], e))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let message = if stderr.trim().is_empty() {
                format!("{} exited with {}", self.argv[0], result.status)
            } else {
                stderr.trim().to_string()
            };
            warn!(event = %Event::CompileFailed, input = %input.display(), error = %message);
            return Err(FunctionError::Compile(message));
        }

        let code = if self.writes_output_file() {
            tokio::fs::read(&output_path)
                .await
                .map_err(|e| FunctionError::read(&output_path, e))?
        } else {
            result.stdout
        };

        let source_map = match tokio::fs::read(&map_path).await {
            Ok(map) => {
                let _ = tokio::fs::remove_file(&map_path).await;
                Some(map)
            }
            Err(_) => None,
        };

        debug!(event = %Event::CompileComplete, input = %input.display(), bytes = code.len());

        Ok(Artifact { code, source_map })
    }
}

/// Write `source` to a unique temporary module in `dir` and compile it.
///
/// The temporary module is removed on every exit path.
pub async fn compile_source(
    compiler: &dyn Compiler,
    source: &str,
    dir: &Path,
) -> FunctionResult<Artifact> {
    let module = write_temp_module(source, dir)?;
    let artifact = compiler.compile(module.path()).await;
    module.close()?;
    artifact
}

/// Unique `.mjs` file in `dir` holding `contents`, deleted on drop
pub fn write_temp_module(contents: impl AsRef<[u8]>, dir: &Path) -> FunctionResult<NamedTempFile> {
    let mut file = Builder::new()
        .prefix(".fnctl-")
        .suffix(".mjs")
        .tempfile_in(dir)?;
    file.write_all(contents.as_ref())?;
    file.flush()?;
    Ok(file)
}
