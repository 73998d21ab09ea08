//! kiln CLI entry point
//!
//! Parses arguments, installs logging, wires Ctrl-C to cancellation of the
//! running build and turns errors into user-facing messages.

use clap::Parser;
use kiln_cli::cli::Cli;
use kiln_cli::core::user_friendly_error;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    cli.init_logging();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cleaning up working trees");
            interrupt.cancel();
        }
    });

    if let Err(e) = cli.execute(cancel).await {
        user_friendly_error(e).display();
        std::process::exit(1);
    }
}
