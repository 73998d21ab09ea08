//! Template rendering engine with Tera.

use anyhow::Result;
use serde_json::Value;
use std::path::Path;
use tera::{Context as TeraContext, Tera};

use super::{filters, syntax};
use crate::config::BuildConfig;
use crate::core::KilnError;

/// Key under which a non-object configuration is exposed to templates.
pub const CONFIG_KEY: &str = "config";

/// Renders `<% %>` templates against a [`BuildConfig`].
///
/// Rendering is sandboxed: templates cannot include other files, and a fresh
/// Tera instance is used per render so nothing leaks between files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    /// Create a renderer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Render `template`, read from `file`, with `config` as context.
    ///
    /// Syntax errors and references to undefined variables are a
    /// [`KilnError::TemplateRenderError`] naming `file`.
    pub fn render(&self, template: &str, config: &BuildConfig, file: &Path) -> Result<String> {
        let render_error = |reason: String| KilnError::TemplateRenderError {
            file: file.display().to_string(),
            reason,
        };

        let source = syntax::translate(template).map_err(|e| render_error(e.to_string()))?;
        let context = Self::context(config).map_err(|e| render_error(describe_tera_error(&e)))?;

        let mut tera = Tera::default();
        tera.register_filter(filters::ESCAPE_FILTER, filters::escape_markup);
        let rendered =
            tera.render_str(&source, &context).map_err(|e| render_error(describe_tera_error(&e)))?;

        tracing::trace!(target: "transform", "Rendered {} ({} bytes)", file.display(), rendered.len());
        Ok(rendered)
    }

    /// Objects expose their keys as top-level variables; any other value is
    /// available as `config`.
    fn context(config: &BuildConfig) -> tera::Result<TeraContext> {
        match config.as_value() {
            Value::Object(_) => TeraContext::from_value(config.as_value().clone()),
            other => {
                let mut context = TeraContext::new();
                context.insert(CONFIG_KEY, other);
                Ok(context)
            }
        }
    }
}

/// Flatten a Tera error and its sources into one line.
fn describe_tera_error(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
        .replace("while rendering '__tera_one_off'", "")
        .replace("Failed to render '__tera_one_off'", "Template rendering failed")
        .replace("Failed to parse '__tera_one_off'", "Template syntax error")
        .replace("'__tera_one_off'", "template")
}
