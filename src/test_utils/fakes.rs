//! In-memory collaborators for builder tests.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::KilnError;
use crate::credentials::{CredentialProvider, Credentials};
use crate::registry::{RegistryClient, RegistryFuture};

/// Credential provider that counts how often it is asked.
#[derive(Debug, Default)]
pub struct CountingCredentialProvider {
    calls: AtomicUsize,
}

impl CountingCredentialProvider {
    /// A provider that has not been asked yet.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of acquisitions so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialProvider for CountingCredentialProvider {
    fn acquire(&self) -> Pin<Box<dyn Future<Output = Result<Credentials>> + Send + '_>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Credentials::new("test@kiln.example", "s3cret"))
        })
    }
}

/// One archive request observed by [`FakeRegistry`].
#[derive(Debug, Clone)]
pub struct FetchRecord {
    /// Requested package name
    pub name: String,
    /// Where the archive was written
    pub destination: PathBuf,
    /// Working trees of earlier fetches that still existed at request time
    pub live_trees: Vec<PathBuf>,
}

/// Registry serving tarballs from memory and recording every fetch.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    packages: Mutex<HashMap<String, Vec<u8>>>,
    error_bodies: Mutex<HashMap<String, String>>,
    fetches: Mutex<Vec<FetchRecord>>,
}

impl FakeRegistry {
    /// An empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `archive` for package `name`.
    pub fn add_package(&self, name: &str, archive: Vec<u8>) {
        self.packages.lock().expect("registry lock").insert(name.to_string(), archive);
    }

    /// Answer requests for `name` with an `Error` body.
    pub fn add_error(&self, name: &str, body: &str) {
        self.error_bodies.lock().expect("registry lock").insert(name.to_string(), body.to_string());
    }

    /// Every fetch so far, in request order.
    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.fetches.lock().expect("registry lock").clone()
    }

    /// Names of fetched packages, in request order.
    pub fn fetched_names(&self) -> Vec<String> {
        self.fetches().into_iter().map(|record| record.name).collect()
    }
}

/// The working tree root an archive destination belongs to.
fn tree_root(destination: &Path) -> PathBuf {
    destination.parent().map(Path::to_path_buf).unwrap_or_default()
}

impl RegistryClient for FakeRegistry {
    fn fetch_archive<'a>(
        &'a self,
        _credentials: &'a Credentials,
        name: &'a str,
        destination: &'a Path,
    ) -> RegistryFuture<'a, u64> {
        Box::pin(async move {
            {
                let mut fetches = self.fetches.lock().expect("registry lock");
                let live_trees = fetches
                    .iter()
                    .map(|record| tree_root(&record.destination))
                    .filter(|root| root.exists())
                    .collect();
                fetches.push(FetchRecord {
                    name: name.to_string(),
                    destination: destination.to_path_buf(),
                    live_trees,
                });
            }

            if let Some(body) = self.error_bodies.lock().expect("registry lock").get(name) {
                return Err(KilnError::RegistryError {
                    operation: "getPackage".to_string(),
                    body: body.clone(),
                }
                .into());
            }

            let archive = self.packages.lock().expect("registry lock").get(name).cloned();
            let archive = archive.ok_or_else(|| KilnError::RegistryError {
                operation: "getPackage".to_string(),
                body: format!("Error: no package named {name}"),
            })?;
            tokio::fs::write(destination, &archive).await?;
            Ok(archive.len() as u64)
        })
    }

    fn publish<'a>(
        &'a self,
        _credentials: &'a Credentials,
        definition: &'a Value,
        archive: Vec<u8>,
    ) -> RegistryFuture<'a, String> {
        Box::pin(async move {
            let name = definition.get("name").and_then(Value::as_str).unwrap_or("unnamed").to_string();
            self.add_package(&name, archive);
            Ok(format!("Published {name}"))
        })
    }

    fn create_account<'a>(&'a self, credentials: &'a Credentials) -> RegistryFuture<'a, String> {
        Box::pin(async move { Ok(format!("Created {}", credentials.identity)) })
    }

    fn define<'a>(
        &'a self,
        _credentials: &'a Credentials,
        _definition: &'a Value,
    ) -> RegistryFuture<'a, String> {
        Box::pin(async move { Ok("Defined".to_string()) })
    }
}
