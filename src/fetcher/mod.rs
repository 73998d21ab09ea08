//! Package retrieval.
//!
//! [`PackageFetcher::fetch`] materializes a package's source into a freshly
//! allocated [`WorkingTree`] and parses its definition:
//!
//! - `.git` specifiers are cloned into `<tree>/src`
//! - registry names are streamed to `<tree>/package.tgz` (logging in first if
//!   this is the process's first registry fetch) and extracted into `<tree>/src`
//!
//! A fetch that fails releases the tree it allocated before returning the error,
//! so no orphaned directories survive a failed fetch.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::core::{cancellable, ensure_not_cancelled};
use crate::credentials::CredentialCache;
use crate::definition::PackageDefinition;
use crate::git::{GitRepo, ensure_git_available, strip_auth_from_url};
use crate::registry::RegistryClient;
use crate::source::SourceSpec;
use crate::workspace::{WorkingTree, WorkingTreeManager};

/// Where the working tree of a fetch is allocated.
#[derive(Debug, Clone, Copy)]
pub enum Placement<'a> {
    /// A fresh top-level tree.
    Root,
    /// The deterministic child slot of a dependency.
    Dependency {
        /// Tree of the package declaring the dependency
        parent: &'a WorkingTree,
        /// Declaration index of the dependency
        index: usize,
        /// Dependency name as declared
        name: &'a str,
    },
}

/// A materialized package ready to build.
#[derive(Debug)]
pub struct FetchedPackage {
    /// Tree holding the source; the caller owns its release.
    pub tree: WorkingTree,
    /// Parsed `kiln.json`
    pub definition: PackageDefinition,
}

/// Fetches packages from the registry or from git.
pub struct PackageFetcher {
    registry: Arc<dyn RegistryClient>,
    credentials: Arc<CredentialCache>,
    trees: WorkingTreeManager,
    cancel: CancellationToken,
}

impl PackageFetcher {
    /// Create a fetcher.
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        credentials: Arc<CredentialCache>,
        trees: WorkingTreeManager,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            credentials,
            trees,
            cancel,
        }
    }

    /// The manager trees are allocated from.
    #[must_use]
    pub const fn trees(&self) -> &WorkingTreeManager {
        &self.trees
    }

    /// Allocate a tree at `placement`, materialize `spec` into it and parse its
    /// definition.
    pub async fn fetch(&self, spec: &SourceSpec, placement: Placement<'_>) -> Result<FetchedPackage> {
        ensure_not_cancelled(&self.cancel)?;
        tracing::info!("Fetching {spec}");

        let tree = match placement {
            Placement::Root => self.trees.allocate_root().await?,
            Placement::Dependency {
                parent,
                index,
                name,
            } => self.trees.allocate_child(parent, index, name).await?,
        };

        match self.materialize(spec, &tree).await {
            Ok(definition) => Ok(FetchedPackage {
                tree,
                definition,
            }),
            Err(error) => {
                let root = tree.root().to_path_buf();
                if let Err(release_error) = self.trees.release(tree).await {
                    tracing::warn!(
                        target: "workspace",
                        "Failed to remove working tree {} after failed fetch: {release_error:#}",
                        root.display()
                    );
                }
                Err(error)
            }
        }
    }

    async fn materialize(&self, spec: &SourceSpec, tree: &WorkingTree) -> Result<PackageDefinition> {
        let source_dir = tree.source_dir();

        match spec {
            SourceSpec::Repository(url) => {
                ensure_git_available().await?;
                let repo = cancellable(&self.cancel, GitRepo::clone(url, &source_dir)).await?;
                if let Ok(commit) = repo.head_commit().await {
                    tracing::debug!(target: "git", "Checked out {} at {commit}", strip_auth_from_url(url));
                }
            }
            SourceSpec::Registry(name) => {
                let credentials = cancellable(&self.cancel, self.credentials.credentials()).await?;
                let archive_path = tree.archive_path();
                let size = cancellable(
                    &self.cancel,
                    self.registry.fetch_archive(credentials, name, &archive_path),
                )
                .await
                .with_context(|| format!("Failed to download package '{name}'"))?;
                tracing::debug!("Downloaded {size} bytes for {name}");

                // Extraction runs on a blocking thread that cannot be interrupted,
                // so it is awaited to completion before the tree can be released.
                archive::extract(&archive_path, &source_dir).await?;
                ensure_not_cancelled(&self.cancel)?;
            }
        }

        cancellable(&self.cancel, PackageDefinition::load(&source_dir)).await
    }
}
