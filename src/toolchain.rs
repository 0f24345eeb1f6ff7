//! External tool invocation: the compiler and the performance analyzer.
//!
//! Both collaborators sit behind the [`Toolchain`] trait so the engine can
//! be driven by mocks in tests. The shipped implementation runs the
//! configured compiler with `-S -g` and pipes the cleaned assembly through
//! `llvm-mca`. Every invocation carries a bounded timeout; a timeout is a
//! tool failure for that run, never a reason to stop watching.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Default bound on any single external tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one compiler invocation.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// Raw assembly text (stdout).
    pub assembly: String,
    /// Compiler diagnostics (stderr), failure or not.
    pub diagnostics: String,
    /// Whether the compiler exited successfully.
    pub success: bool,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("i/o error while driving `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Compiler and analyzer invocation boundary.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Compile `source` to assembly with the given flags.
    async fn compile(&self, source: &Path, flags: &[String]) -> Result<CompileOutput, ToolError>;

    /// Run the performance analyzer over the cleaned instruction stream.
    async fn analyze(&self, assembly: &str) -> Result<String, ToolError>;
}

/// Toolchain backed by real processes.
#[derive(Debug, Clone)]
pub struct ExternalToolchain {
    compiler: String,
    analyzer: String,
    timeout: Duration,
}

impl ExternalToolchain {
    pub fn new(compiler: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
            analyzer: "llvm-mca".to_string(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_analyzer(mut self, analyzer: impl Into<String>) -> Self {
        self.analyzer = analyzer.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        program: &str,
        fut: impl std::future::Future<Output = std::io::Result<T>>,
    ) -> Result<T, ToolError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|source| ToolError::Io {
                program: program.to_string(),
                source,
            }),
            Err(_) => Err(ToolError::Timeout {
                program: program.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl Toolchain for ExternalToolchain {
    async fn compile(&self, source: &Path, flags: &[String]) -> Result<CompileOutput, ToolError> {
        debug!(compiler = %self.compiler, ?flags, source = %source.display(), "compiling");
        let mut cmd = Command::new(&self.compiler);
        cmd.arg("-S")
            .arg("-g")
            .args(flags)
            .arg("-o")
            .arg("-")
            .arg(source)
            .stdin(Stdio::null());
        let output = self.bounded(&self.compiler, cmd.output()).await?;
        Ok(CompileOutput {
            assembly: String::from_utf8_lossy(&output.stdout).into_owned(),
            diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }

    async fn analyze(&self, assembly: &str) -> Result<String, ToolError> {
        let mut child = Command::new(&self.analyzer)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Launch {
                program: self.analyzer.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = assembly.as_bytes().to_vec();
            self.bounded(&self.analyzer, async move {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await
            })
            .await?;
        }

        let output = self.bounded(&self.analyzer, child.wait_with_output()).await?;
        if !output.status.success() {
            // Analysis is best-effort; a failed analyzer degrades to an
            // empty report rather than failing the run.
            debug!(analyzer = %self.analyzer, "analyzer exited with failure");
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
