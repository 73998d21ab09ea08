//! Working tree allocation and release.
//!
//! Every build invocation owns exactly one [`WorkingTree`]: a private directory
//! holding the fetched source, the downloaded archive and the trees of its nested
//! dependency builds.
//!
//! ```text
//! $TMPDIR/kiln-3f1c…/              top-level tree (uuid v4, never reused)
//! ├── package.tgz                  registry archive, when fetched from the registry
//! ├── src/                         materialized package source
//! └── deps/
//!     ├── 000-base-styles/         tree of the first dependency
//!     │   ├── src/
//!     │   └── deps/000-…/          and of its own dependencies
//!     └── 001-icons/
//! ```
//!
//! Child locations are derived from the parent tree value and the dependency's
//! declaration index, so sibling builds never alias and nothing shared is mutated
//! to express "the current directory".
//!
//! A tree is released by consuming it, which makes double release a type error.
//! Release deletes depth-first: files and subdirectories go before the directory
//! that holds them, and symlinks are unlinked without being followed.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::{
    ARCHIVE_FILE_NAME, DEPENDENCY_DIR_NAME, SOURCE_DIR_NAME, WORKING_TREE_PREFIX,
};
use crate::core::KilnError;

/// A temporary directory owned by a single build invocation.
#[derive(Debug, PartialEq, Eq)]
pub struct WorkingTree {
    root: PathBuf,
}

impl WorkingTree {
    /// The directory the tree occupies.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the package source is materialized.
    #[must_use]
    pub fn source_dir(&self) -> PathBuf {
        self.root.join(SOURCE_DIR_NAME)
    }

    /// Where a registry archive is streamed to before extraction.
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.root.join(ARCHIVE_FILE_NAME)
    }

    /// Location of the tree for the dependency declared at `index`.
    #[must_use]
    pub fn dependency_path(&self, index: usize, name: &str) -> PathBuf {
        self.root.join(DEPENDENCY_DIR_NAME).join(child_dir_name(index, name))
    }
}

/// Counts of entries removed by [`WorkingTreeManager::release`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    /// Files and symlinks unlinked
    pub files: usize,
    /// Directories removed, including the tree root
    pub directories: usize,
}

/// Allocates and releases working trees below a base directory.
#[derive(Debug, Clone)]
pub struct WorkingTreeManager {
    base: PathBuf,
}

impl Default for WorkingTreeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkingTreeManager {
    /// Manager placing top-level trees in the system temp directory.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base(std::env::temp_dir())
    }

    /// Manager placing top-level trees in `base`.
    #[must_use]
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
        }
    }

    /// Allocate a fresh top-level tree named `kiln-<uuid>`.
    pub async fn allocate_root(&self) -> Result<WorkingTree> {
        tokio::fs::create_dir_all(&self.base)
            .await
            .map_err(|e| KilnError::fs("create directory", &self.base, &e))?;

        let root =
            self.base.join(format!("{}-{}", WORKING_TREE_PREFIX, uuid::Uuid::new_v4().simple()));
        create_exclusive(&root).await?;

        tracing::debug!(target: "workspace", "Allocated working tree {}", root.display());
        Ok(WorkingTree {
            root,
        })
    }

    /// Allocate the tree for the dependency declared at `index` of `parent`.
    ///
    /// Fails if the location already exists: two invocations never share a tree.
    pub async fn allocate_child(
        &self,
        parent: &WorkingTree,
        index: usize,
        name: &str,
    ) -> Result<WorkingTree> {
        let root = parent.dependency_path(index, name);
        if let Some(deps_dir) = root.parent() {
            tokio::fs::create_dir_all(deps_dir)
                .await
                .map_err(|e| KilnError::fs("create directory", deps_dir, &e))?;
        }
        create_exclusive(&root).await?;

        tracing::debug!(target: "workspace", "Allocated dependency tree {}", root.display());
        Ok(WorkingTree {
            root,
        })
    }

    /// Delete the tree and everything below it.
    pub async fn release(&self, tree: WorkingTree) -> Result<ReleaseSummary> {
        let root = tree.root;
        tracing::debug!(target: "workspace", "Releasing working tree {}", root.display());

        let walk_root = root.clone();
        let summary = tokio::task::spawn_blocking(move || remove_tree(&walk_root))
            .await
            .context("Working tree removal task failed")??;

        tracing::trace!(
            target: "workspace",
            "Removed {} files and {} directories from {}",
            summary.files,
            summary.directories,
            root.display()
        );
        Ok(summary)
    }
}

/// Deterministic directory name for a dependency tree.
///
/// The declaration index keeps siblings distinct; the name is reduced to
/// filesystem-safe characters so URLs and scoped names stay readable.
#[must_use]
pub fn child_dir_name(index: usize, name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let sanitized = sanitized.trim_matches('.');
    if sanitized.is_empty() {
        format!("{index:03}")
    } else {
        format!("{index:03}-{sanitized}")
    }
}

async fn create_exclusive(path: &Path) -> Result<()> {
    tokio::fs::create_dir(path).await.map_err(|e| KilnError::fs("create directory", path, &e))?;
    Ok(())
}

/// Post-order walk of `path`: every entry is yielded before its parent directory.
fn removal_walk(path: &Path) -> walkdir::IntoIter {
    WalkDir::new(path).contents_first(true).follow_links(false).into_iter()
}

fn remove_tree(path: &Path) -> Result<ReleaseSummary> {
    let mut summary = ReleaseSummary::default();

    for entry in removal_walk(path) {
        let entry = entry.map_err(|e| KilnError::FileSystemError {
            operation: "walk directory".to_string(),
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let entry_path = entry.path();

        if entry.file_type().is_dir() {
            std::fs::remove_dir(entry_path)
                .map_err(|e| KilnError::fs("remove directory", entry_path, &e))?;
            summary.directories += 1;
        } else {
            std::fs::remove_file(entry_path)
                .map_err(|e| KilnError::fs("remove file", entry_path, &e))?;
            summary.files += 1;
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn populate(root: &Path) {
        std::fs::create_dir_all(root.join("src/a/b")).unwrap();
        std::fs::write(root.join("src/top.txt"), "top").unwrap();
        std::fs::write(root.join("src/a/mid.txt"), "mid").unwrap();
        std::fs::write(root.join("src/a/b/leaf.txt"), "leaf").unwrap();
        std::fs::create_dir_all(root.join("deps/000-x/src")).unwrap();
    }

    #[tokio::test]
    async fn test_allocate_root_is_unique() {
        let temp = tempdir().unwrap();
        let manager = WorkingTreeManager::with_base(temp.path());

        let first = manager.allocate_root().await.unwrap();
        let second = manager.allocate_root().await.unwrap();

        assert_ne!(first.root(), second.root());
        assert!(first.root().is_dir());
        assert!(first.root().starts_with(temp.path()));
        assert!(
            first.root().file_name().unwrap().to_string_lossy().starts_with("kiln-"),
            "unexpected tree name {}",
            first.root().display()
        );
    }

    #[tokio::test]
    async fn test_allocate_child_is_deterministic_and_exclusive() {
        let temp = tempdir().unwrap();
        let manager = WorkingTreeManager::with_base(temp.path());
        let parent = manager.allocate_root().await.unwrap();

        let child = manager.allocate_child(&parent, 1, "icons").await.unwrap();
        assert_eq!(child.root(), parent.root().join("deps").join("001-icons"));
        assert!(child.root().is_dir());

        // Same slot again must not alias the live tree
        let err = manager.allocate_child(&parent, 1, "icons").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<KilnError>(), Some(KilnError::FileSystemError { .. })));

        // Parent location is untouched by child allocation
        assert_eq!(parent.source_dir(), parent.root().join("src"));
    }

    #[test]
    fn test_child_dir_name_sanitizes() {
        assert_eq!(child_dir_name(0, "widgets"), "000-widgets");
        assert_eq!(
            child_dir_name(12, "https://example.com/pkg.git"),
            "012-https___example.com_pkg.git"
        );
        assert_eq!(child_dir_name(3, ".."), "003");
    }

    #[tokio::test]
    async fn test_release_removes_everything() {
        let temp = tempdir().unwrap();
        let manager = WorkingTreeManager::with_base(temp.path());
        let tree = manager.allocate_root().await.unwrap();
        let root = tree.root().to_path_buf();
        populate(&root);

        let summary = manager.release(tree).await.unwrap();

        assert!(!root.exists());
        assert_eq!(summary.files, 3);
        // root, src, src/a, src/a/b, deps, deps/000-x, deps/000-x/src
        assert_eq!(summary.directories, 7);
        // The base directory survives
        assert!(temp.path().exists());
    }

    #[test]
    fn test_removal_walk_visits_leaves_before_parents() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("tree");
        populate(&root);

        let order: Vec<PathBuf> =
            removal_walk(&root).map(|entry| entry.unwrap().path().to_path_buf()).collect();

        let position = |p: &Path| order.iter().position(|o| o == p).unwrap();
        for (index, path) in order.iter().enumerate() {
            let mut ancestor = path.parent();
            while let Some(dir) = ancestor {
                if dir.starts_with(&root) {
                    assert!(
                        position(dir) > index,
                        "{} removed before its descendant {}",
                        dir.display(),
                        path.display()
                    );
                }
                ancestor = dir.parent();
            }
        }
        assert_eq!(order.last().unwrap(), &root);
        assert!(order.iter().all(|p| {
            let name = p.file_name().unwrap();
            name != "." && name != ".."
        }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_release_does_not_follow_symlinks() {
        let temp = tempdir().unwrap();
        let outside = temp.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("keep.txt"), "keep").unwrap();

        let manager = WorkingTreeManager::with_base(temp.path().join("base"));
        let tree = manager.allocate_root().await.unwrap();
        std::os::unix::fs::symlink(&outside, tree.root().join("link")).unwrap();
        let root = tree.root().to_path_buf();

        manager.release(tree).await.unwrap();

        assert!(!root.exists());
        assert!(outside.join("keep.txt").exists());
    }
}
