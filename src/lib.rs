//! # suno-export
//!
//! Export a Suno account's generated tracks to local MP3 or WAV files.
//!
//! ## Pipeline
//!
//! - [`auth::TokenStore`] holds the captured bearer token and the per-install
//!   device id
//! - [`feed::FeedPaginator`] walks every workspace's feed to collect clips
//! - [`conversion::ConversionOrchestrator`] asks the server for a WAV render
//!   and polls until it is ready
//! - [`scheduler::Scheduler`] processes items strictly one at a time with a
//!   randomized pause between them, and can be cancelled
//! - [`writer::ArtifactWriter`] streams each file to disk, skipping files that
//!   already exist
//! - [`ExportSession`] composes all of the above
//!
//! ## Quick Start
//!
//! ```no_run
//! use suno_export::{Config, ExportFormat, ExportSession, TokenStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let tokens = TokenStore::file(&config.credentials_path);
//!     tokens.set("eyJhbGciOi...").await?;
//!
//!     let session = ExportSession::from_config(config, tokens)?;
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(suno_export::cancel_on_signal(cancel.clone()));
//!
//!     let report = session.export_all(ExportFormat::Mp3, &cancel).await?;
//!     println!(
//!         "{} written, {} skipped, {} failed",
//!         report.session.completed(),
//!         report.session.skipped(),
//!         report.session.failed()
//!     );
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Token store and credential backends
pub mod auth;
/// Remote API boundary
pub mod client;
/// Configuration types
pub mod config;
/// WAV conversion state machine
pub mod conversion;
/// Error types
pub mod error;
/// Feed pagination
pub mod feed;
/// Retry, polling and pacing
pub mod retry;
/// Sequential item scheduler
pub mod scheduler;
/// Export session façade
pub mod session;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Artifact writer
pub mod writer;

// Re-export commonly used types
pub use auth::{CredentialStore, FileCredentialStore, MemoryCredentialStore, TokenStore};
pub use client::{StudioApi, StudioClient, WavFileStatus};
pub use config::{Config, DelayWindow, RetryConfig};
pub use error::{Error, Result};
pub use session::ExportSession;
pub use types::{
    Clip, ClipStatus, Event, ExportFormat, ExportItem, ExportReport, ItemOutcome, Progress,
    SessionEnd, SessionResult, Workspace,
};
pub use writer::{ArtifactWriter, WriteOutcome};

/// Cancel `token` when the process receives a termination signal
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns early, without cancelling, if `token` is cancelled by someone else.
pub async fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => {
            tracing::info!("finishing the current item, then stopping");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
