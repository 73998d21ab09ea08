//! File transforms.
//!
//! Every mapping declared in a package's `files` list is applied concurrently:
//! `render` mappings are read as text, rendered with the build configuration and
//! written out; `copy` mappings are reproduced byte for byte. At most
//! `max_parallel` transforms are in flight at once.
//!
//! The stage is done only once the number of completed transforms equals the
//! number of declared mappings. The first failure aborts the stage; outputs that
//! were already written stay on disk.

use anyhow::{Result, bail};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use crate::config::BuildConfig;
use crate::core::cancellable;
use crate::definition::{FileMapping, ResolvedMapping, TransformMethod};
use crate::templating::TemplateRenderer;
use crate::utils::fs::{read_file, read_text_file, write_file};
use crate::utils::progress::CompletionCounter;
use crate::workspace::WorkingTree;

/// Outcome of one completed transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Completed {
    method: TransformMethod,
    bytes: u64,
}

/// Totals for a finished transform stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformSummary {
    /// Render mappings completed
    pub rendered: usize,
    /// Copy mappings completed
    pub copied: usize,
    /// Bytes written across all outputs
    pub bytes_written: u64,
    /// Most transforms observed running at the same time
    pub peak_in_flight: usize,
}

impl TransformSummary {
    /// Total completed transforms.
    #[must_use]
    pub const fn completed(&self) -> usize {
        self.rendered + self.copied
    }

    fn record(&mut self, completed: Completed) {
        match completed.method {
            TransformMethod::Render => self.rendered += 1,
            TransformMethod::Copy => self.copied += 1,
        }
        self.bytes_written += completed.bytes;
    }
}

/// Tracks how many transforms are running.
#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) -> InFlightSlot<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightSlot {
            in_flight: self,
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Held for the duration of one transform.
struct InFlightSlot<'a> {
    in_flight: &'a InFlight,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.in_flight.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Applies file mappings with bounded concurrency.
#[derive(Debug, Clone)]
pub struct FileTransformPipeline {
    max_parallel: usize,
    renderer: TemplateRenderer,
    show_progress: bool,
}

impl FileTransformPipeline {
    /// Pipeline running at most `max_parallel` transforms at once (minimum one).
    #[must_use]
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            renderer: TemplateRenderer::new(),
            show_progress: false,
        }
    }

    /// Draw a progress bar while transforms run.
    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// The concurrency cap.
    #[must_use]
    pub const fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Apply `mappings` from `tree`'s source directory into `output_dir`.
    pub async fn apply(
        &self,
        mappings: &[FileMapping],
        tree: &WorkingTree,
        output_dir: &Path,
        config: &BuildConfig,
        cancel: &CancellationToken,
    ) -> Result<TransformSummary> {
        if mappings.is_empty() {
            tracing::debug!(target: "transform", "No files to transform");
            return Ok(TransformSummary::default());
        }

        let source_dir = tree.source_dir();
        let resolved: Vec<ResolvedMapping> =
            mappings.iter().map(|mapping| mapping.resolve(&source_dir, output_dir)).collect();

        let counter = CompletionCounter::new(resolved.len(), self.show_progress);
        counter.set_prefix("Transforming");
        tracing::debug!(
            target: "transform",
            "Transforming {} files with up to {} in flight",
            resolved.len(),
            self.max_parallel
        );

        let in_flight = InFlight::default();
        let transforms: Vec<_> = resolved
            .iter()
            .map(|mapping| cancellable(cancel, self.transform(mapping, config, &in_flight)))
            .collect();
        let mut results = stream::iter(transforms).buffer_unordered(self.max_parallel);

        let mut summary = TransformSummary::default();
        while let Some(result) = results.next().await {
            match result {
                Ok(completed) => {
                    summary.record(completed);
                    counter.increment();
                }
                Err(error) => {
                    counter.abandon();
                    return Err(error);
                }
            }
        }

        if !counter.is_complete() || summary.completed() != mappings.len() {
            counter.abandon();
            bail!(
                "Transform stage finished with {} of {} files completed",
                counter.current(),
                mappings.len()
            );
        }
        counter.finish();
        summary.peak_in_flight = in_flight.peak();

        tracing::info!(
            target: "transform",
            "Transformed {} files ({} rendered, {} copied, at most {} at once)",
            summary.completed(),
            summary.rendered,
            summary.copied,
            summary.peak_in_flight
        );
        Ok(summary)
    }

    async fn transform(
        &self,
        mapping: &ResolvedMapping,
        config: &BuildConfig,
        in_flight: &InFlight,
    ) -> Result<Completed> {
        let _slot = in_flight.enter();
        let bytes = match mapping.method {
            TransformMethod::Render => {
                let template = read_text_file(&mapping.source).await?;
                let rendered = self.renderer.render(&template, config, &mapping.source)?;
                write_file(&mapping.destination, &rendered).await?;
                rendered.len() as u64
            }
            TransformMethod::Copy => {
                let contents = read_file(&mapping.source).await?;
                write_file(&mapping.destination, &contents).await?;
                contents.len() as u64
            }
        };

        tracing::debug!(
            target: "transform",
            "{} {} -> {}",
            mapping.method,
            mapping.source.display(),
            mapping.destination.display()
        );
        Ok(Completed {
            method: mapping.method,
            bytes,
        })
    }
}
