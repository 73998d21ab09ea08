//! Registry credentials.
//!
//! Registry requests carry an identity/secret pair. The pair is acquired the first
//! time a registry fetch needs it and reused for the rest of the process by the
//! [`CredentialCache`]. Acquisition goes through a [`CredentialProvider`]; the CLI
//! uses [`PromptCredentialProvider`], tests plug in their own.

use anyhow::Result;
use colored::Colorize;
use std::fmt;
use std::future::Future;
use std::io::{IsTerminal, Write};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::OnceCell;

use crate::core::KilnError;

/// Environment variable supplying the registry identity non-interactively.
pub const IDENTITY_ENV: &str = "KILN_IDENTITY";

/// Environment variable supplying the registry secret non-interactively.
pub const SECRET_ENV: &str = "KILN_SECRET";

/// A registry login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account identity (usually an email address)
    pub identity: String,
    /// Account secret
    pub secret: String,
}

impl Credentials {
    /// Create a credential pair.
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Source of credentials for the cache's single acquisition.
pub trait CredentialProvider: Send + Sync {
    /// Obtain a credential pair, possibly by asking the user.
    fn acquire(&self) -> Pin<Box<dyn Future<Output = Result<Credentials>> + Send + '_>>;
}

/// Process-lifetime memo of the registry login.
///
/// The first call to [`credentials`](Self::credentials) acquires through the
/// provider; concurrent first calls wait for that single acquisition. A failed
/// acquisition is not cached, so a later call tries again.
pub struct CredentialCache {
    provider: Arc<dyn CredentialProvider>,
    cell: OnceCell<Credentials>,
}

impl CredentialCache {
    /// Cache acquiring through `provider` on first use.
    pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            provider,
            cell: OnceCell::new(),
        }
    }

    /// The cached credentials, acquiring them on first use.
    pub async fn credentials(&self) -> Result<&Credentials> {
        self.cell
            .get_or_try_init(|| async {
                tracing::debug!("Acquiring registry credentials");
                self.provider.acquire().await
            })
            .await
    }

    /// True once credentials have been acquired.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cell.initialized()
    }
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache").field("cached", &self.is_cached()).finish()
    }
}

/// Provider reading credentials from the environment or the terminal.
///
/// Resolution order:
/// 1. `KILN_IDENTITY` and `KILN_SECRET` when both are set
/// 2. the configured identity plus a prompt for the secret
/// 3. prompts for both
///
/// Prompting requires an interactive stdin; otherwise acquisition fails with
/// [`KilnError::CredentialsUnavailable`].
#[derive(Debug, Clone, Default)]
pub struct PromptCredentialProvider {
    identity: Option<String>,
}

impl PromptCredentialProvider {
    /// Provider that only prompts for the secret when `identity` is known.
    #[must_use]
    pub const fn new(identity: Option<String>) -> Self {
        Self {
            identity,
        }
    }

    async fn prompt(&self) -> Result<Credentials> {
        if let (Ok(identity), Ok(secret)) = (std::env::var(IDENTITY_ENV), std::env::var(SECRET_ENV))
        {
            tracing::debug!("Using registry credentials from {IDENTITY_ENV}/{SECRET_ENV}");
            return Ok(Credentials::new(identity, secret));
        }

        if !std::io::stdin().is_terminal() {
            return Err(KilnError::CredentialsUnavailable {
                reason: format!(
                    "stdin is not a terminal and {IDENTITY_ENV}/{SECRET_ENV} are not set"
                ),
            }
            .into());
        }

        eprintln!("{}", "Log in to the package registry".cyan());
        let mut reader = BufReader::new(tokio::io::stdin());

        let identity = match &self.identity {
            Some(identity) => {
                eprintln!("identity: {identity}");
                identity.clone()
            }
            None => read_answer(&mut reader, "identity").await?,
        };
        let secret = read_answer(&mut reader, "secret").await?;

        Ok(Credentials::new(identity, secret))
    }
}

impl CredentialProvider for PromptCredentialProvider {
    fn acquire(&self) -> Pin<Box<dyn Future<Output = Result<Credentials>> + Send + '_>> {
        Box::pin(self.prompt())
    }
}

async fn read_answer<R>(reader: &mut R, label: &str) -> Result<String>
where
    R: AsyncBufReadExt + Unpin,
{
    eprint!("{label}: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    let answer = line.trim().to_string();
    if read == 0 || answer.is_empty() {
        return Err(KilnError::CredentialsUnavailable {
            reason: format!("no {label} entered"),
        }
        .into());
    }
    Ok(answer)
}
