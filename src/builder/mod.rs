//! Build orchestration.
//!
//! A build of one package runs these stages, each awaited before the next starts:
//!
//! 1. fetch the package into its own working tree
//! 2. build every declared dependency, one after another
//! 3. apply the file transforms
//! 4. run the post-build scripts
//! 5. release the working tree
//!
//! Dependencies are built the same way, recursively, with their trees nested
//! below the parent's `deps/` directory. Dependency `k + 1` is only fetched once
//! dependency `k` has finished its whole pipeline, including the release of its
//! tree. Every tree is released on the way out, whether the build succeeded or
//! not.

use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::config::BuildConfig;
use crate::core::ensure_not_cancelled;
use crate::definition::PackageDefinition;
use crate::fetcher::{FetchedPackage, PackageFetcher, Placement};
use crate::scripts::ScriptRunner;
use crate::source::SourceSpec;
use crate::transform::FileTransformPipeline;
use crate::workspace::WorkingTree;

type BuildFuture<'a> = Pin<Box<dyn Future<Output = Result<BuildSummary>> + Send + 'a>>;

/// Totals for a finished build, dependencies included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Packages built, the root package included
    pub packages: usize,
    /// File transforms applied
    pub files: usize,
    /// Post-build scripts run
    pub scripts: usize,
}

impl BuildSummary {
    fn absorb(&mut self, other: Self) {
        self.packages += other.packages;
        self.files += other.files;
        self.scripts += other.scripts;
    }
}

/// Runs the build pipeline for a package and, recursively, its dependencies.
pub struct Builder {
    fetcher: PackageFetcher,
    pipeline: FileTransformPipeline,
    scripts: ScriptRunner,
    output_dir: PathBuf,
    cancel: CancellationToken,
}

impl Builder {
    /// Create a builder writing every package's outputs into `output_dir`.
    ///
    /// A relative `output_dir` is resolved against the current directory here,
    /// since scripts run from inside the package's working tree.
    pub fn new(
        fetcher: PackageFetcher,
        pipeline: FileTransformPipeline,
        scripts: ScriptRunner,
        output_dir: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        let output_dir = output_dir.into();
        let output_dir = std::path::absolute(&output_dir).unwrap_or(output_dir);
        Self {
            fetcher,
            pipeline,
            scripts,
            output_dir,
            cancel,
        }
    }

    /// Build the package named by `source` with `config`.
    pub async fn build(&self, source: &str, config: &BuildConfig) -> Result<BuildSummary> {
        let spec = SourceSpec::parse(source)?;
        let summary = self.build_in(&spec, config, Placement::Root).await?;

        tracing::info!(
            "Built {spec}: {} packages, {} files, {} scripts",
            summary.packages,
            summary.files,
            summary.scripts
        );
        Ok(summary)
    }

    /// Build each dependency of `definition` in declaration order.
    ///
    /// Each dependency name is a source specifier and its value the configuration
    /// the dependency is built with. Trees are allocated below `parent`.
    pub async fn build_dependencies(
        &self,
        definition: &PackageDefinition,
        parent: &WorkingTree,
    ) -> Result<BuildSummary> {
        let mut summary = BuildSummary::default();

        for (index, (name, value)) in definition.dependencies.iter().enumerate() {
            ensure_not_cancelled(&self.cancel)?;

            let spec = SourceSpec::parse(name)
                .with_context(|| format!("Failed to build dependency '{name}'"))?;
            let config = BuildConfig::from_value(value.clone());
            tracing::debug!("Building dependency {} of {}: {name}", index + 1, definition.dependencies.len());

            let placement = Placement::Dependency {
                parent,
                index,
                name,
            };
            let built = self
                .build_in(&spec, &config, placement)
                .await
                .with_context(|| format!("Failed to build dependency '{name}'"))?;
            summary.absorb(built);
        }

        Ok(summary)
    }

    fn build_in<'a>(
        &'a self,
        spec: &'a SourceSpec,
        config: &'a BuildConfig,
        placement: Placement<'a>,
    ) -> BuildFuture<'a> {
        Box::pin(async move {
            let FetchedPackage {
                tree,
                definition,
            } = self.fetcher.fetch(spec, placement).await?;

            let result = self.run_stages(&definition, &tree, config).await;

            match result {
                Ok(summary) => {
                    self.fetcher.trees().release(tree).await?;
                    tracing::debug!("Finished {spec}");
                    Ok(summary)
                }
                Err(error) => {
                    let root = tree.root().to_path_buf();
                    if let Err(release_error) = self.fetcher.trees().release(tree).await {
                        tracing::warn!(
                            target: "workspace",
                            "Failed to remove working tree {} after failed build: {release_error:#}",
                            root.display()
                        );
                    }
                    Err(error)
                }
            }
        })
    }

    async fn run_stages(
        &self,
        definition: &PackageDefinition,
        tree: &WorkingTree,
        config: &BuildConfig,
    ) -> Result<BuildSummary> {
        let mut summary = self.build_dependencies(definition, tree).await?;

        let transforms = self
            .pipeline
            .apply(&definition.files, tree, &self.output_dir, config, &self.cancel)
            .await?;
        let scripts = self
            .scripts
            .run(&definition.scripts, tree, &self.output_dir, config, &self.cancel)
            .await?;

        summary.absorb(BuildSummary {
            packages: 1,
            files: transforms.completed(),
            scripts,
        });
        Ok(summary)
    }
}
