//! Command-line arguments and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use suno_export::ExportFormat;

/// Export your Suno tracks to local MP3 or WAV files.
#[derive(Parser, Debug)]
#[command(name = "suno-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (default: <config dir>/suno-export/config.toml).
    #[arg(short, long, env = "SUNO_EXPORT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Bearer token to store before running the command.
    #[arg(long, env = "SUNO_AUTH_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Device id to use instead of the generated one.
    #[arg(long, env = "SUNO_DEVICE_ID", global = true)]
    pub device_id: Option<String>,

    /// Download directory, overriding the configuration file.
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the stored bearer token.
    Token {
        #[command(subcommand)]
        action: TokenCommand,
    },

    /// List your workspaces.
    Workspaces,

    /// List clips and whether they can be exported.
    List {
        /// Only this workspace (id).
        #[arg(short, long)]
        workspace: Option<String>,

        /// Include clips that cannot be exported yet.
        #[arg(short, long)]
        all: bool,
    },

    /// Export clips to the download directory.
    Export {
        /// Audio format: mp3 or wav.
        #[arg(short, long, default_value = "mp3")]
        format: ExportFormat,

        /// Only this workspace (id).
        #[arg(short, long)]
        workspace: Option<String>,

        /// Only these clip ids (comma separated).
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,

        /// Fetch clips again even if their file already exists.
        #[arg(long)]
        no_skip_existing: bool,
    },

    /// Convert previously exported MP3 files to WAV.
    ConvertLocal {
        /// Directory holding the MP3 exports (default: the download directory).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Store a bearer token (a leading "Bearer " is accepted).
    Set {
        /// Token value.
        token: String,
    },

    /// Show the stored token (redacted) and device id.
    Show,

    /// Forget the stored token.
    Clear,
}
