//! suno-export - bulk export of your Suno tracks.
//!
//!   suno-export token set <TOKEN>         # store the captured bearer token
//!   suno-export workspaces                # list workspaces
//!   suno-export list --all                # list clips with their status
//!   suno-export export --format mp3       # export every finished clip
//!   suno-export export --format wav --ids <id>,<id>
//!   suno-export convert-local --dir ./downloads

mod cli;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, TokenCommand};
use suno_export::session::plan_items;
use suno_export::utils::redact;
use suno_export::{
    Config, Error, Event, ExportSession, ItemOutcome, SessionEnd, SessionResult, TokenStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(dir) = &cli.output {
        config.download.download_dir = dir.clone();
    }

    let tokens = TokenStore::file(&config.credentials_path);
    if let Some(token) = &cli.token {
        tokens.set(token).await.context("storing token")?;
    }
    if let Some(device_id) = &cli.device_id {
        tokens.set_device_id(device_id).await?;
    }

    match cli.command {
        Commands::Token { action } => cmd_token(&tokens, action, &config.credentials_path).await,
        Commands::Workspaces => {
            let session = ExportSession::from_config(config, tokens)?;
            for workspace in session.list_workspaces().await? {
                println!("{:<40} {}", workspace.id, workspace.name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::List { workspace, all } => {
            let session = ExportSession::from_config(config, tokens)?;
            cmd_list(&session, workspace.as_deref(), all).await
        }
        Commands::Export {
            format,
            workspace,
            ids,
            no_skip_existing,
        } => {
            if no_skip_existing {
                config.download.skip_existing = false;
            }
            let session = ExportSession::from_config(config, tokens)?;
            let cancel = cancellation();
            let printer = spawn_progress_printer(session.subscribe());

            let (result, workspace_failures) = if ids.is_empty() {
                let report = match &workspace {
                    Some(id) => session.export_workspace(id, format, &cancel).await?,
                    None => session.export_all(format, &cancel).await?,
                };
                println!(
                    "{} clips listed, {} exportable",
                    report.clips_listed, report.clips_exportable
                );
                (report.session, report.workspace_failures.len())
            } else {
                let listing = session.list_clips(workspace.as_deref()).await?;
                let selected: Vec<_> = listing
                    .clips
                    .into_iter()
                    .filter(|c| ids.contains(&c.id))
                    .collect();
                for id in ids.iter().filter(|id| !selected.iter().any(|c| &c.id == *id)) {
                    eprintln!("warning: clip {id} not found");
                }
                let items = plan_items(&selected, format);
                (session.export_selection(&items, format, &cancel).await, 0)
            };

            drop(session);
            printer.await.ok();
            Ok(report_session(&result, workspace_failures))
        }
        Commands::ConvertLocal { dir } => {
            let dir = dir.unwrap_or_else(|| config.download.download_dir.clone());
            let session = ExportSession::from_config(config, tokens)?;
            let cancel = cancellation();
            let printer = spawn_progress_printer(session.subscribe());

            let result = session.convert_local(&dir, &cancel).await?;

            drop(session);
            printer.await.ok();
            Ok(report_session(&result, 0))
        }
    }
}

async fn cmd_token(tokens: &TokenStore, action: TokenCommand, path: &Path) -> Result<ExitCode> {
    match action {
        TokenCommand::Set { token } => {
            tokens.set(&token).await?;
            println!("Token stored in {}", path.display());
        }
        TokenCommand::Show => match tokens.get().await {
            Ok(credential) => {
                println!("token:     {}", redact(&credential.bearer_token));
                println!("device id: {}", credential.device_id);
            }
            Err(Error::NotAuthenticated { .. }) => {
                println!("No token stored.");
                return Ok(ExitCode::FAILURE);
            }
            Err(e) => return Err(e.into()),
        },
        TokenCommand::Clear => {
            tokens.clear().await?;
            println!("Token cleared.");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_list(session: &ExportSession, workspace: Option<&str>, all: bool) -> Result<ExitCode> {
    let listing = session.list_clips(workspace).await?;

    let mut exportable = 0;
    for clip in &listing.clips {
        if clip.is_exportable() {
            exportable += 1;
        } else if !all {
            continue;
        }
        println!(
            "{}  {:<10} {:<20} {}",
            clip.id,
            format!("{:?}", clip.status).to_lowercase(),
            clip.workspace_name.as_deref().unwrap_or("-"),
            clip.title.as_deref().filter(|t| !t.is_empty()).unwrap_or("(untitled)")
        );
    }
    for failure in &listing.failures {
        eprintln!(
            "warning: workspace {} could not be listed: {}",
            failure.workspace.name, failure.error
        );
    }
    println!();
    println!("{} clips, {} exportable", listing.clips.len(), exportable);

    Ok(if listing.failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Cancellation token that fires on Ctrl+C / SIGTERM
fn cancellation() -> CancellationToken {
    let cancel = CancellationToken::new();
    tokio::spawn(suno_export::cancel_on_signal(cancel.clone()));
    cancel
}

fn spawn_progress_printer(mut events: broadcast::Receiver<Event>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::ItemFinished { result, progress }) => {
                    let status = match &result.outcome {
                        ItemOutcome::Completed { .. } => "done".to_string(),
                        ItemOutcome::Skipped { .. } => "exists, skipped".to_string(),
                        ItemOutcome::Failed { error } => format!("FAILED: {error}"),
                    };
                    eprintln!(
                        "[{:>3}%] {}/{} {}: {status}",
                        progress.percent(),
                        progress.processed(),
                        progress.total,
                        result.target_filename
                    );
                }
                Ok(Event::WorkspaceFailed { workspace, error }) => {
                    eprintln!("warning: workspace {workspace} could not be listed: {error}");
                }
                Ok(Event::SessionFinished { .. }) => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "progress printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn report_session(result: &SessionResult, workspace_failures: usize) -> ExitCode {
    println!(
        "{} written, {} skipped, {} failed, {} not started",
        result.completed(),
        result.skipped(),
        result.failed(),
        result.untouched()
    );
    for outcome in &result.outcomes {
        if let ItemOutcome::Failed { error } = &outcome.outcome {
            println!("  {} ({}): {error}", outcome.target_filename, outcome.clip_id);
        }
    }

    match &result.end {
        SessionEnd::Finished if result.is_success() && workspace_failures == 0 => ExitCode::SUCCESS,
        SessionEnd::Finished => ExitCode::FAILURE,
        SessionEnd::Cancelled => {
            println!("Cancelled.");
            ExitCode::from(130)
        }
        SessionEnd::Aborted { reason } => {
            println!("Aborted: {reason}");
            println!("Capture a fresh token and run `suno-export token set <TOKEN>`.");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
