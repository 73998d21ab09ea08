//! Package registry client.
//!
//! The registry speaks a small request/response protocol: every operation is a
//! `POST` to `<base>/<operation>` carrying a JSON [`Envelope`] with the caller's
//! credentials, the protocol version and an operation-specific payload.
//!
//! | Operation      | Endpoint      | Payload                       | Response          |
//! |----------------|---------------|-------------------------------|-------------------|
//! | fetch archive  | `/getPackage` | package name                  | gzip tar stream   |
//! | publish        | `/publish`    | package definition (multipart)| text              |
//! | create account | `/signup`     | `{}`                          | text              |
//! | define         | `/define`     | package metadata              | text              |
//!
//! A server-side failure is signalled by a body starting with `Error`, whatever
//! the HTTP status. Such a body is a [`KilnError::RegistryError`]; transport
//! failures and non-success statuses are a [`KilnError::NetworkError`].

use anyhow::{Context, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncWriteExt;

use crate::constants::{REGISTRY_ERROR_PREFIX, REGISTRY_PROTOCOL_VERSION, REGISTRY_REQUEST_TIMEOUT};
use crate::core::KilnError;
use crate::credentials::Credentials;

/// Boxed future returned by [`RegistryClient`] operations.
pub type RegistryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Request body shared by every registry operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Account identity
    pub identity: String,
    /// Account secret
    pub secret: String,
    /// Protocol version spoken by this client
    pub protocol_version: String,
    /// Operation-specific payload
    pub payload: Value,
}

impl Envelope {
    /// Wrap `payload` with the caller's credentials.
    #[must_use]
    pub fn new(credentials: &Credentials, payload: Value) -> Self {
        Self {
            identity: credentials.identity.clone(),
            secret: credentials.secret.clone(),
            protocol_version: REGISTRY_PROTOCOL_VERSION.to_string(),
            payload,
        }
    }
}

/// Transport to the package registry.
///
/// Implementations must treat a body starting with `Error` as a failure.
pub trait RegistryClient: Send + Sync {
    /// Stream the archive of package `name` into `destination`, returning its size.
    fn fetch_archive<'a>(
        &'a self,
        credentials: &'a Credentials,
        name: &'a str,
        destination: &'a Path,
    ) -> RegistryFuture<'a, u64>;

    /// Upload a package archive together with its definition.
    fn publish<'a>(
        &'a self,
        credentials: &'a Credentials,
        definition: &'a Value,
        archive: Vec<u8>,
    ) -> RegistryFuture<'a, String>;

    /// Register a new account with the credentials' identity and secret.
    fn create_account<'a>(&'a self, credentials: &'a Credentials) -> RegistryFuture<'a, String>;

    /// Submit package metadata.
    fn define<'a>(
        &'a self,
        credentials: &'a Credentials,
        definition: &'a Value,
    ) -> RegistryFuture<'a, String>;
}

/// True when a response body carries the registry's error token.
#[must_use]
pub fn is_error_body(body: &[u8]) -> bool {
    body.starts_with(REGISTRY_ERROR_PREFIX.as_bytes())
}

/// [`RegistryClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRegistryClient {
    /// Client for the registry at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REGISTRY_REQUEST_TIMEOUT)
            .user_agent(concat!("kiln/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{operation}", self.base_url)
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        tracing::debug!(target: "registry", "POST {}", self.endpoint(operation));

        let response = request.send().await.map_err(|e| network_error(operation, &e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KilnError::NetworkError {
                operation: operation.to_string(),
                reason: format!("HTTP {status}: {}", body.trim()),
            }
            .into());
        }
        Ok(response)
    }

    async fn post_json(&self, operation: &str, envelope: &Envelope) -> Result<String> {
        let request = self.client.post(self.endpoint(operation)).json(envelope);
        let response = self.send(operation, request).await?;
        read_text(operation, response).await
    }

    async fn stream_archive(
        &self,
        credentials: &Credentials,
        name: &str,
        destination: &Path,
    ) -> Result<u64> {
        const OPERATION: &str = "getPackage";

        let envelope = Envelope::new(credentials, Value::String(name.to_string()));
        let request = self.client.post(self.endpoint(OPERATION)).json(&envelope);
        let response = self.send(OPERATION, request).await?;
        let mut stream = response.bytes_stream();

        // Hold back the first bytes until the error token can be ruled out
        let mut head = Vec::new();
        while head.len() < REGISTRY_ERROR_PREFIX.len() {
            match stream.next().await {
                Some(chunk) => head.extend_from_slice(&chunk.map_err(|e| network_error(OPERATION, &e))?),
                None => break,
            }
        }

        if is_error_body(&head) {
            while let Some(chunk) = stream.next().await {
                head.extend_from_slice(&chunk.map_err(|e| network_error(OPERATION, &e))?);
            }
            return Err(KilnError::RegistryError {
                operation: OPERATION.to_string(),
                body: String::from_utf8_lossy(&head).trim().to_string(),
            }
            .into());
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| KilnError::fs("create file", destination, &e))?;
        file.write_all(&head).await.map_err(|e| KilnError::fs("write", destination, &e))?;
        let mut written = head.len() as u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| network_error(OPERATION, &e))?;
            file.write_all(&chunk).await.map_err(|e| KilnError::fs("write", destination, &e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| KilnError::fs("write", destination, &e))?;

        tracing::debug!(
            target: "registry",
            "Downloaded {name} ({written} bytes) to {}",
            destination.display()
        );
        Ok(written)
    }

    async fn upload(
        &self,
        credentials: &Credentials,
        definition: &Value,
        archive: Vec<u8>,
    ) -> Result<String> {
        const OPERATION: &str = "publish";

        let envelope = serde_json::to_string(&Envelope::new(credentials, definition.clone()))
            .context("Failed to serialize publish envelope")?;
        let form = reqwest::multipart::Form::new()
            .part(
                "envelope",
                reqwest::multipart::Part::text(envelope)
                    .mime_str("application/json")
                    .context("Invalid envelope content type")?,
            )
            .part(
                "archive",
                reqwest::multipart::Part::bytes(archive)
                    .file_name("package.tgz")
                    .mime_str("application/octet-stream")
                    .context("Invalid archive content type")?,
            );

        let request = self.client.post(self.endpoint(OPERATION)).multipart(form);
        let response = self.send(OPERATION, request).await?;
        read_text(OPERATION, response).await
    }
}

impl RegistryClient for HttpRegistryClient {
    fn fetch_archive<'a>(
        &'a self,
        credentials: &'a Credentials,
        name: &'a str,
        destination: &'a Path,
    ) -> RegistryFuture<'a, u64> {
        Box::pin(self.stream_archive(credentials, name, destination))
    }

    fn publish<'a>(
        &'a self,
        credentials: &'a Credentials,
        definition: &'a Value,
        archive: Vec<u8>,
    ) -> RegistryFuture<'a, String> {
        Box::pin(self.upload(credentials, definition, archive))
    }

    fn create_account<'a>(&'a self, credentials: &'a Credentials) -> RegistryFuture<'a, String> {
        Box::pin(async move {
            let envelope = Envelope::new(credentials, Value::Object(serde_json::Map::new()));
            self.post_json("signup", &envelope).await
        })
    }

    fn define<'a>(
        &'a self,
        credentials: &'a Credentials,
        definition: &'a Value,
    ) -> RegistryFuture<'a, String> {
        Box::pin(async move {
            let envelope = Envelope::new(credentials, definition.clone());
            self.post_json("define", &envelope).await
        })
    }
}

fn network_error(operation: &str, error: &reqwest::Error) -> KilnError {
    KilnError::NetworkError {
        operation: operation.to_string(),
        reason: error.to_string(),
    }
}

async fn read_text(operation: &str, response: reqwest::Response) -> Result<String> {
    let body = response.text().await.map_err(|e| network_error(operation, &e))?;
    if is_error_body(body.as_bytes()) {
        return Err(KilnError::RegistryError {
            operation: operation.to_string(),
            body: body.trim().to_string(),
        }
        .into());
    }
    tracing::trace!(target: "registry", "{operation} response: {body}");
    Ok(body)
}
