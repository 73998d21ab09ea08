//! Type-safe Git command builder
//!
//! Builds and runs `git` invocations with a timeout, captured output, consistent
//! logging under the `git` tracing target and errors mapped onto [`KilnError`].

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::git_command;
use crate::constants::GIT_CLONE_TIMEOUT;
use crate::core::KilnError;

/// Fluent builder for a single `git` invocation.
///
/// # Examples
///
/// ```rust,no_run
/// use kiln_cli::git::command_builder::GitCommand;
///
/// # async fn example() -> anyhow::Result<()> {
/// GitCommand::clone("https://example.com/widgets.git", "/tmp/widgets")
///     .with_context("widgets")
///     .execute_success()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// New commands capture output, inherit the parent environment and time out
/// after five minutes.
pub struct GitCommand {
    /// Arguments after `git` (e.g. `["clone", url, path]`)
    args: Vec<String>,

    /// Passed as `-C <dir>` when set
    current_dir: Option<PathBuf>,

    /// Extra environment for the git process
    env_vars: Vec<(String, String)>,

    /// Maximum duration to wait for completion (None = no timeout)
    timeout_duration: Option<Duration>,

    /// Identifier included in log lines (typically the package being fetched)
    context: Option<String>,

    /// For clone commands, the URL reported in errors
    clone_url: Option<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            timeout_duration: Some(Duration::from_secs(300)),
            context: None,
            clone_url: None,
        }
    }
}

impl GitCommand {
    /// Creates an empty command with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run git as if started in `dir`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the git process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Set a custom timeout for the command (None for no timeout)
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Set a context for logging (e.g. the package name)
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Arguments as passed to git, including `-C <dir>`.
    fn full_args(&self) -> Vec<String> {
        let mut full_args = Vec::with_capacity(self.args.len() + 2);
        if let Some(dir) = &self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());
        full_args
    }

    /// The git subcommand, ignoring `-C <dir>`.
    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    fn log_prefix(&self) -> String {
        self.context.as_ref().map(|ctx| format!("({ctx}) ")).unwrap_or_default()
    }

    /// Execute the command and return the output
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let start = std::time::Instant::now();
        let full_args = self.full_args();
        let prefix = self.log_prefix();

        let mut cmd = Command::new(git_command());
        cmd.args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "git", "Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }

        tracing::debug!(
            target: "git",
            "{prefix}Executing command: {} {}",
            git_command(),
            full_args.join(" ")
        );

        let output_future = cmd.output();
        let result = match self.timeout_duration {
            Some(duration) => timeout(duration, output_future).await.map_err(|_| {
                tracing::warn!(
                    target: "git",
                    "{prefix}Command timed out after {} seconds: git {}",
                    duration.as_secs(),
                    full_args.join(" ")
                );
                KilnError::GitCommandError {
                    operation: self.operation(),
                    stderr: format!(
                        "Git command timed out after {} seconds. Check network connectivity \
                         and that the repository does not require interactive authentication.",
                        duration.as_secs()
                    ),
                }
            })?,
            None => output_future.await,
        };

        let output = match result {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KilnError::GitNotFound.into());
            }
            Err(e) => {
                return Err(e).context(format!("Failed to execute git {}", full_args.join(" ")));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "git",
                "{prefix}Command failed with exit code: {:?}",
                output.status.code()
            );
            if !stderr.is_empty() {
                tracing::debug!(target: "git", "{prefix}Error: {}", stderr.trim());
            }

            let operation = self.operation();
            let reason = if stderr.trim().is_empty() { stdout } else { stderr };
            let error = match self.clone_url {
                Some(url) => KilnError::GitCloneFailed {
                    url,
                    reason: reason.trim().to_string(),
                },
                None => KilnError::GitCommandError {
                    operation,
                    stderr: reason.trim().to_string(),
                },
            };
            return Err(error.into());
        }

        if !stdout.is_empty() {
            tracing::debug!(target: "git", "{prefix}{}", stdout.trim());
        }
        if !stderr.is_empty() {
            tracing::debug!(target: "git", "{prefix}{}", stderr.trim());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(
                target: "git::perf",
                "{prefix}Git {} took {:.2}s",
                self.operation(),
                elapsed.as_secs_f64()
            );
        }

        Ok(GitCommandOutput {
            stdout,
            stderr,
        })
    }

    /// Execute the command and return only stdout as a trimmed string
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Execute the command and check for success
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

/// Output from a Git command
#[derive(Debug)]
pub struct GitCommandOutput {
    /// Standard output from the Git command
    pub stdout: String,
    /// Standard error output from the Git command
    pub stderr: String,
}

impl GitCommand {
    /// Create a clone command.
    ///
    /// Only the default branch is needed and history is irrelevant to a build,
    /// so the clone is shallow. Credential prompts are disabled so a private
    /// repository fails instead of hanging the build.
    pub fn clone(url: &str, target: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new()
            .args(["clone", "--depth", "1", "--recurse-submodules", "--shallow-submodules"])
            .arg(url)
            .arg(target.as_ref().display().to_string())
            .env("GIT_TERMINAL_PROMPT", "0")
            .with_timeout(Some(GIT_CLONE_TIMEOUT));
        cmd.clone_url = Some(url.to_string());
        cmd
    }

    /// Create a `git --version` command.
    pub fn version() -> Self {
        Self::new().arg("--version").with_timeout(Some(Duration::from_secs(10)))
    }

    /// Create a `git rev-parse HEAD` command.
    pub fn current_commit() -> Self {
        Self::new().args(["rev-parse", "HEAD"])
    }
}
