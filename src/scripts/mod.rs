//! Post-build scripts.
//!
//! A package's `scripts` run after its files are transformed, one at a time and
//! in declaration order. Each script gets the build context (source and
//! destination directories) and the build configuration; the next script only
//! starts once the previous one finished successfully.
//!
//! [`ProcessScriptExecutor`] runs scripts as child processes:
//!
//! - `*.sh` files run through `sh`, anything else is executed directly
//! - the working directory is the package source directory
//! - `KILN_SOURCE_DIR`, `KILN_DEST_DIR` and `KILN_BUILD_CONFIG` (JSON) are set
//! - stdin receives `{"context": {"sourceDir": .., "destDir": ..}, "config": ..}`
//!
//! A non-zero exit status is a [`KilnError::ScriptError`].

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::BuildConfig;
use crate::core::{KilnError, cancellable};
use crate::workspace::WorkingTree;

/// Environment variable holding the package source directory.
pub const SOURCE_DIR_ENV: &str = "KILN_SOURCE_DIR";

/// Environment variable holding the output directory.
pub const DEST_DIR_ENV: &str = "KILN_DEST_DIR";

/// Environment variable holding the build configuration as JSON.
pub const CONFIG_ENV: &str = "KILN_BUILD_CONFIG";

/// Directories a script operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptContext {
    /// The package source inside the working tree
    pub source_dir: PathBuf,
    /// The output tree
    pub dest_dir: PathBuf,
}

#[derive(Serialize)]
struct ScriptInput<'a> {
    context: &'a ScriptContext,
    config: &'a Value,
}

/// Runs one post-build script to completion.
pub trait ScriptExecutor: Send + Sync {
    /// Run `script` and resolve once it has finished.
    fn execute<'a>(
        &'a self,
        script: &'a Path,
        context: &'a ScriptContext,
        config: &'a BuildConfig,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Executes scripts as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessScriptExecutor;

impl ProcessScriptExecutor {
    async fn run_process(
        script: &Path,
        context: &ScriptContext,
        config: &BuildConfig,
    ) -> Result<()> {
        let script_error = |reason: String| KilnError::ScriptError {
            script: script.display().to_string(),
            reason,
        };

        if !script.is_file() {
            return Err(script_error("script not found".to_string()).into());
        }

        let config_json = serde_json::to_string(config.as_value())?;
        let input = serde_json::to_vec(&ScriptInput {
            context,
            config: config.as_value(),
        })?;

        let mut command = if script.extension().is_some_and(|ext| ext == "sh") {
            let mut command = Command::new("sh");
            command.arg(script);
            command
        } else {
            Command::new(script)
        };
        command
            .current_dir(&context.source_dir)
            .env(SOURCE_DIR_ENV, &context.source_dir)
            .env(DEST_DIR_ENV, &context.dest_dir)
            .env(CONFIG_ENV, &config_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(target: "script", "Running {}", script.display());
        let mut child = command.spawn().map_err(|e| script_error(format!("failed to start: {e}")))?;

        // Scripts that ignore stdin may exit before reading it
        let stdin_writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        tracing::debug!(target: "script", "Failed to write script input: {e}");
                    }
                }
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| script_error(format!("failed to wait for script: {e}")))?;
        if let Some(writer) = stdin_writer {
            let _ = writer.await;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            tracing::debug!(target: "script", "{}: {}", script.display(), stdout.trim());
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(target: "script", "{} (stderr): {}", script.display(), stderr.trim());
        }

        if !output.status.success() {
            let status = output
                .status
                .code()
                .map_or_else(|| "terminated by signal".to_string(), |code| format!("exit status {code}"));
            let reason = if stderr.trim().is_empty() {
                status
            } else {
                format!("{status}: {}", stderr.trim())
            };
            return Err(script_error(reason).into());
        }

        Ok(())
    }
}

impl ScriptExecutor for ProcessScriptExecutor {
    fn execute<'a>(
        &'a self,
        script: &'a Path,
        context: &'a ScriptContext,
        config: &'a BuildConfig,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Self::run_process(script, context, config))
    }
}

/// Runs a package's scripts in declaration order.
#[derive(Clone)]
pub struct ScriptRunner {
    executor: Arc<dyn ScriptExecutor>,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new(Arc::new(ProcessScriptExecutor))
    }
}

impl ScriptRunner {
    /// Runner delegating each script to `executor`.
    pub fn new(executor: Arc<dyn ScriptExecutor>) -> Self {
        Self {
            executor,
        }
    }

    /// Run `scripts` (relative to the tree's source directory) one after another.
    ///
    /// Returns the number of scripts run. The first failure stops the sequence;
    /// scripts that already ran are not undone.
    pub async fn run(
        &self,
        scripts: &[String],
        tree: &WorkingTree,
        output_dir: &Path,
        config: &BuildConfig,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if scripts.is_empty() {
            return Ok(0);
        }

        let context = ScriptContext {
            source_dir: tree.source_dir(),
            dest_dir: output_dir.to_path_buf(),
        };

        for script in scripts {
            let path = context.source_dir.join(script);
            tracing::info!(target: "script", "Running post-build script {script}");
            cancellable(cancel, self.executor.execute(&path, &context, config)).await?;
        }

        Ok(scripts.len())
    }
}
