//! Shared harness for integration tests.

// Not every test module uses every helper
#![allow(dead_code)]

use kiln_cli::builder::Builder;
use kiln_cli::credentials::CredentialCache;
use kiln_cli::fetcher::PackageFetcher;
use kiln_cli::scripts::{ScriptExecutor, ScriptRunner};
use kiln_cli::test_utils::{CountingCredentialProvider, FakeRegistry, tar_gz_bytes};
use kiln_cli::transform::FileTransformPipeline;
use kiln_cli::workspace::WorkingTreeManager;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// A builder wired to an in-memory registry inside a temp directory.
pub struct TestBuild {
    pub temp: TempDir,
    pub registry: Arc<FakeRegistry>,
    pub provider: Arc<CountingCredentialProvider>,
    pub cancel: CancellationToken,
    pub max_parallel: usize,
    pub executor: Option<Arc<dyn ScriptExecutor>>,
}

impl TestBuild {
    pub fn new() -> Self {
        kiln_cli::test_utils::init_test_logging(None);
        Self {
            temp: TempDir::new().unwrap(),
            registry: FakeRegistry::new(),
            provider: CountingCredentialProvider::new(),
            cancel: CancellationToken::new(),
            max_parallel: 4,
            executor: None,
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ScriptExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Directory working trees are allocated in.
    pub fn trees_dir(&self) -> PathBuf {
        self.temp.path().join("trees")
    }

    /// The output tree.
    pub fn output_dir(&self) -> PathBuf {
        self.temp.path().join("out")
    }

    /// Working trees still present on disk.
    pub fn leftover_trees(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.trees_dir())
            .map(|entries| entries.map(|entry| entry.unwrap().path()).collect())
            .unwrap_or_default()
    }

    /// Serve a package whose archive holds `kiln.json` and `files`.
    pub fn publish(&self, name: &str, definition: Value, files: &[(&str, &[u8])]) {
        self.registry.add_package(name, package_archive(&definition, files));
    }

    pub fn builder(&self) -> Builder {
        let fetcher = PackageFetcher::new(
            self.registry.clone(),
            Arc::new(CredentialCache::new(self.provider.clone())),
            WorkingTreeManager::with_base(self.trees_dir()),
            self.cancel.clone(),
        );
        let scripts = match &self.executor {
            Some(executor) => ScriptRunner::new(executor.clone()),
            None => ScriptRunner::default(),
        };
        Builder::new(
            fetcher,
            FileTransformPipeline::new(self.max_parallel),
            scripts,
            self.output_dir(),
            self.cancel.clone(),
        )
    }

    pub fn read_output(&self, path: &str) -> String {
        std::fs::read_to_string(self.output_dir().join(path)).unwrap()
    }
}

/// Gzip tarball holding a `kiln.json` for `definition` plus `files`.
pub fn package_archive(definition: &Value, files: &[(&str, &[u8])]) -> Vec<u8> {
    let document = serde_json::to_vec(definition).unwrap();
    let mut entries: Vec<(&str, &[u8])> = vec![("kiln.json", document.as_slice())];
    entries.extend_from_slice(files);
    tar_gz_bytes(&entries)
}

/// The working tree root an archive destination belongs to.
pub fn tree_of(archive: &Path) -> PathBuf {
    archive.parent().unwrap().to_path_buf()
}
