//! Error handling for kiln
//!
//! This module provides the strongly-typed error enum used across the build pipeline and
//! the user-friendly reporting layer used by the CLI. The error system follows two rules:
//! 1. **Strongly-typed errors** for precise handling in code
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Error Categories
//!
//! - **File system**: [`KilnError::FileSystemError`], [`KilnError::IoError`]
//! - **Network / registry**: [`KilnError::NetworkError`], [`KilnError::RegistryError`]
//! - **Parsing**: [`KilnError::DefinitionParseError`], [`KilnError::ConfigParseError`],
//!   [`KilnError::InvalidSource`], [`KilnError::InvalidMapping`]
//! - **Build stages**: [`KilnError::TemplateRenderError`], [`KilnError::ScriptError`],
//!   [`KilnError::ExtractionError`]
//! - **Git**: [`KilnError::GitNotFound`], [`KilnError::GitCloneFailed`],
//!   [`KilnError::GitCommandError`]
//! - **Control**: [`KilnError::CredentialsUnavailable`], [`KilnError::Cancelled`]
//!
//! Internal code returns [`anyhow::Result`] and layers `.context(..)` on top of these
//! variants. [`user_friendly_error`] walks the chain back to the first [`KilnError`] it
//! finds and attaches suggestions for display.
//!
//! # Examples
//!
//! ```rust,no_run
//! use kiln_cli::core::{KilnError, user_friendly_error};
//!
//! let error = KilnError::ScriptError {
//!     script: "scripts/post.sh".to_string(),
//!     reason: "exited with status 2".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for kiln operations.
///
/// Each variant names one failure mode of the build pipeline and carries the
/// path, URL or identifier needed to explain it to a user.
#[derive(Error, Debug)]
pub enum KilnError {
    /// A filesystem read, write, mkdir or rmdir failed.
    #[error("File system error: {operation} {path}: {reason}")]
    FileSystemError {
        /// The operation that failed (e.g. "read", "write", "remove directory")
        operation: String,
        /// The path the operation targeted
        path: String,
        /// The underlying failure
        reason: String,
    },

    /// Transport-level failure talking to the registry.
    #[error("Network error during {operation}: {reason}")]
    NetworkError {
        /// The registry operation (e.g. "getPackage", "publish")
        operation: String,
        /// Reason for the network failure
        reason: String,
    },

    /// The registry answered, but the body carries its error token.
    ///
    /// The registry signals server-side failures by starting the response body with
    /// `Error`, independently of the HTTP status. This is treated as a network failure.
    #[error("Registry rejected {operation}: {body}")]
    RegistryError {
        /// The registry operation that was rejected
        operation: String,
        /// The response body returned by the registry
        body: String,
    },

    /// The package definition document is missing or malformed.
    #[error("Invalid package definition {file}: {reason}")]
    DefinitionParseError {
        /// Path of the definition document
        file: String,
        /// Specific reason for the parsing failure
        reason: String,
    },

    /// The build configuration document is malformed.
    #[error("Invalid build configuration {file}: {reason}")]
    ConfigParseError {
        /// Path of the configuration document
        file: String,
        /// Specific reason for the parsing failure
        reason: String,
    },

    /// A source specifier could not be routed.
    #[error("Invalid package source '{source_spec}': {reason}")]
    InvalidSource {
        /// The specifier as given
        source_spec: String,
        /// Why it was rejected
        reason: String,
    },

    /// A file mapping points outside its working tree or output directory.
    #[error("Invalid file mapping '{path}': {reason}")]
    InvalidMapping {
        /// The offending path as written in the definition
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Template substitution failed for a Render mapping.
    #[error("Failed to render template {file}: {reason}")]
    TemplateRenderError {
        /// The template source file
        file: String,
        /// The error reported by the template engine
        reason: String,
    },

    /// A post-build script failed to start or exited unsuccessfully.
    #[error("Post-build script {script} failed: {reason}")]
    ScriptError {
        /// The script path
        script: String,
        /// Exit status or spawn failure
        reason: String,
    },

    /// A package archive could not be extracted.
    #[error("Failed to extract archive {archive}: {reason}")]
    ExtractionError {
        /// The archive path
        archive: String,
        /// The extraction failure
        reason: String,
    },

    /// Git executable not found in PATH
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// Git repository clone failed
    #[error("Failed to clone repository: {url}")]
    GitCloneFailed {
        /// The repository URL that failed to clone
        url: String,
        /// The reason for the clone failure
        reason: String,
    },

    /// Git operation failed during execution
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git operation that failed
        operation: String,
        /// The error output from the git command
        stderr: String,
    },

    /// Registry credentials could not be obtained.
    #[error("Registry credentials unavailable: {reason}")]
    CredentialsUnavailable {
        /// Why acquisition failed
        reason: String,
    },

    /// The build was cancelled before it finished.
    #[error("Build cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl Clone for KilnError {
    fn clone(&self) -> Self {
        match self {
            Self::FileSystemError {
                operation,
                path,
                reason,
            } => Self::FileSystemError {
                operation: operation.clone(),
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::NetworkError {
                operation,
                reason,
            } => Self::NetworkError {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::RegistryError {
                operation,
                body,
            } => Self::RegistryError {
                operation: operation.clone(),
                body: body.clone(),
            },
            Self::DefinitionParseError {
                file,
                reason,
            } => Self::DefinitionParseError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::ConfigParseError {
                file,
                reason,
            } => Self::ConfigParseError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::InvalidSource {
                source_spec,
                reason,
            } => Self::InvalidSource {
                source_spec: source_spec.clone(),
                reason: reason.clone(),
            },
            Self::InvalidMapping {
                path,
                reason,
            } => Self::InvalidMapping {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::TemplateRenderError {
                file,
                reason,
            } => Self::TemplateRenderError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::ScriptError {
                script,
                reason,
            } => Self::ScriptError {
                script: script.clone(),
                reason: reason.clone(),
            },
            Self::ExtractionError {
                archive,
                reason,
            } => Self::ExtractionError {
                archive: archive.clone(),
                reason: reason.clone(),
            },
            Self::GitNotFound => Self::GitNotFound,
            Self::GitCloneFailed {
                url,
                reason,
            } => Self::GitCloneFailed {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::GitCommandError {
                operation,
                stderr,
            } => Self::GitCommandError {
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::CredentialsUnavailable {
                reason,
            } => Self::CredentialsUnavailable {
                reason: reason.clone(),
            },
            Self::Cancelled => Self::Cancelled,
            // io::Error is not Clone, keep its message
            Self::IoError(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

impl KilnError {
    /// Builds a [`KilnError::FileSystemError`] from an IO failure on `path`.
    pub fn fs(operation: &str, path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::FileSystemError {
            operation: operation.to_string(),
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Returns true when the error belongs to the network category.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::NetworkError { .. } | Self::RegistryError { .. })
    }
}

/// Error context wrapper that provides user-friendly error information.
///
/// When displayed, errors show the main message in red, optional details in
/// yellow and an optional suggestion in green.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying kiln error
    pub error: KilnError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: KilnError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions.
///
/// The chain is searched for the first [`KilnError`]; context layers added with
/// `anyhow::Context` above it are kept as details so the user sees which package
/// or dependency failed.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let layers: Vec<String> = error
        .chain()
        .take_while(|cause| cause.downcast_ref::<KilnError>().is_none())
        .map(std::string::ToString::to_string)
        .collect();

    if let Some(kiln_error) = error.chain().find_map(|cause| cause.downcast_ref::<KilnError>()) {
        let mut ctx = create_error_context(kiln_error.clone());
        if !layers.is_empty() {
            let trail = layers.join("\n  ");
            ctx.details = Some(match ctx.details.take() {
                Some(details) => format!("{details}\nWhile:\n  {trail}"),
                None => format!("While:\n  {trail}"),
            });
        }
        return ctx;
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(KilnError::Other {
                    message: error.to_string(),
                })
                .with_suggestion("Check file ownership and permissions of the output directory")
                .with_details("kiln could not read or write a file it needed");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(KilnError::Other {
                    message: error.to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(KilnError::Other {
        message,
    })
}

fn create_error_context(error: KilnError) -> ErrorContext {
    match &error {
        KilnError::GitNotFound => ErrorContext::new(error)
            .with_suggestion("Install git from https://git-scm.com/ or your package manager (e.g., 'brew install git', 'apt install git')")
            .with_details("Sources ending in .git are cloned with the git executable"),

        KilnError::GitCloneFailed { url, .. } => {
            let suggestion = format!(
                "Verify the repository URL is correct: {url}. Check your internet connection and repository access"
            );
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        KilnError::NetworkError { .. } => ErrorContext::new(error)
            .with_suggestion("Check your connection and the registry URL (--registry or KILN_REGISTRY_URL)"),

        KilnError::RegistryError { .. } => ErrorContext::new(error)
            .with_suggestion("Check the package name and your registry credentials")
            .with_details("The registry reported a failure in its response body"),

        KilnError::DefinitionParseError { .. } => ErrorContext::new(error)
            .with_suggestion("Make sure the package ships a valid kiln.json at its root")
            .with_details("kiln.json must be a JSON object with optional 'dependencies', 'files' and 'scripts' fields"),

        KilnError::ConfigParseError { file, .. } => {
            let suggestion = format!("Check the JSON syntax in {file}");
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        KilnError::TemplateRenderError { .. } => ErrorContext::new(error)
            .with_suggestion("Check template syntax: output uses <%= var %>, statements use <% if var %>...<% endif %>")
            .with_details("Every variable referenced by a template must exist in the build configuration"),

        KilnError::ScriptError { .. } => ErrorContext::new(error)
            .with_details("Scripts run in declaration order; scripts after the failing one were skipped"),

        KilnError::CredentialsUnavailable { .. } => ErrorContext::new(error)
            .with_suggestion("Set KILN_IDENTITY and KILN_SECRET, or run kiln from an interactive terminal"),

        _ => ErrorContext::new(error),
    }
}
