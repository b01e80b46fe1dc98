//! Core types for suno-export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A workspace ("project") owning a subset of the user's clips
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Workspace identifier used in feed filters
    pub id: String,
    /// Display name (empty when the server sends none)
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub name: String,
}

/// Generation status of a clip
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipStatus {
    /// Accepted but not started
    Submitted,
    /// Waiting for a worker
    Queued,
    /// Audio is being streamed while generation continues
    Streaming,
    /// Still rendering
    Processing,
    /// Rendering finished
    Complete,
    /// Generation failed
    Error,
    /// Any status this crate does not know about, or none at all
    #[default]
    #[serde(other)]
    Unknown,
}

/// One generated track, as returned by the feed
///
/// Clips are snapshots; the only local change is the workspace annotation
/// added after retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Opaque 36-character identifier
    pub id: String,
    /// Title (may be missing or empty)
    #[serde(default)]
    pub title: Option<String>,
    /// Generation status
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub status: ClipStatus,
    /// Rendered MP3 location, once available
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Creation timestamp, if the server sent a valid RFC 3339 one
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    /// Workspace the clip was listed from
    #[serde(default)]
    pub workspace_id: Option<String>,
    /// Name of the workspace the clip was listed from
    #[serde(default)]
    pub workspace_name: Option<String>,
}

impl Clip {
    /// Whether the clip can be exported: complete and with an audio URL
    pub fn is_exportable(&self) -> bool {
        self.status == ClipStatus::Complete
            && self.audio_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Tag the clip with the workspace it was fetched from
    pub fn annotate(&mut self, workspace: &Workspace) {
        self.workspace_id = Some(workspace.id.clone());
        self.workspace_name = Some(workspace.name.clone());
    }
}

/// Keep only exportable clips, preserving order
pub fn exportable(clips: &[Clip]) -> Vec<Clip> {
    clips.iter().filter(|c| c.is_exportable()).cloned().collect()
}

/// Opaque pagination token handed back to the feed unchanged
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub serde_json::Value);

/// One page of the feed
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Clips on this page, in feed order
    ///
    /// Records that are not clips at all (no id, wrong shape) are dropped
    /// with a warning instead of failing the page.
    #[serde(default, deserialize_with = "lenient::clips")]
    pub clips: Vec<Clip>,
    /// Whether another page follows
    #[serde(default)]
    pub has_more: bool,
    /// Cursor for the next page
    #[serde(default)]
    pub next_cursor: Option<Cursor>,
}

// Feed records are decoded one field and one clip at a time
mod lenient {
    use super::Clip;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc)))
    }

    pub fn clips<'de, D>(deserializer: D) -> Result<Vec<Clip>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let records = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
        Ok(records
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<Clip>(record) {
                Ok(clip) => Some(clip),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed feed record");
                    None
                }
            })
            .collect())
    }
}

/// Audio format to export
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Direct transfer of the rendered MP3
    Mp3,
    /// Server-side WAV conversion followed by a transfer
    Wav,
}

impl ExportFormat {
    /// File extension, without the dot
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Mp3 => "mp3",
            ExportFormat::Wav => "wav",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(ExportFormat::Mp3),
            "wav" => Ok(ExportFormat::Wav),
            other => Err(format!("unknown format '{other}' (expected mp3 or wav)")),
        }
    }
}

/// A clip selected for export, with its deterministic target name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportItem {
    /// Clip identifier
    pub clip_id: String,
    /// Clip title (empty when untitled)
    pub title: String,
    /// Source workspace name
    pub workspace_name: String,
    /// File name inside the download directory
    pub target_filename: String,
    /// Format to produce
    pub format: ExportFormat,
    /// MP3 location; required for the MP3 path, unused for WAV
    pub audio_url: Option<String>,
}

impl ExportItem {
    /// Build the export item for `clip` in `format`
    pub fn from_clip(clip: &Clip, format: ExportFormat) -> Self {
        let workspace_name = clip.workspace_name.clone().unwrap_or_default();
        let title = clip.title.clone().unwrap_or_default();
        Self {
            target_filename: crate::utils::export_filename(
                &workspace_name,
                &title,
                &clip.id,
                format,
            ),
            clip_id: clip.id.clone(),
            title,
            workspace_name,
            format,
            audio_url: clip.audio_url.clone(),
        }
    }
}

/// What happened to one export item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// File written
    Completed {
        /// Where the file landed
        path: PathBuf,
        /// Bytes written
        bytes: u64,
    },
    /// Target already existed; nothing fetched
    Skipped {
        /// Existing file
        path: PathBuf,
    },
    /// The item failed; the session moved on
    Failed {
        /// Underlying error message
        error: String,
    },
}

/// Outcome record for one item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    /// Clip identifier
    pub clip_id: String,
    /// Target file name
    pub target_filename: String,
    /// What happened
    pub outcome: ItemOutcome,
}

/// How a session ended
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "end", rename_all = "snake_case")]
pub enum SessionEnd {
    /// Every item was attempted
    #[default]
    Finished,
    /// Cancellation was requested; remaining items were not started
    Cancelled,
    /// The credential was rejected; remaining items were not started
    Aborted {
        /// The fatal error message
        reason: String,
    },
}

/// Running counters for a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Items in the session
    pub total: usize,
    /// Files written
    pub completed: usize,
    /// Items skipped because their file already existed
    pub skipped: usize,
    /// Items that failed
    pub failed: usize,
}

impl Progress {
    /// Items that have been processed one way or another
    pub fn processed(&self) -> usize {
        self.completed + self.skipped + self.failed
    }

    /// Whole-number percentage of processed items (100 for an empty session)
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed() as f64 / self.total as f64) * 100.0).round() as u8
    }
}

/// Final report of an export session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    /// Final counters
    pub progress: Progress,
    /// One record per item that was started, in processing order
    pub outcomes: Vec<ItemResult>,
    /// How the session ended
    pub end: SessionEnd,
}

impl SessionResult {
    /// Files written
    pub fn completed(&self) -> usize {
        self.progress.completed
    }

    /// Items skipped
    pub fn skipped(&self) -> usize {
        self.progress.skipped
    }

    /// Items failed
    pub fn failed(&self) -> usize {
        self.progress.failed
    }

    /// Items never started (cancelled or aborted sessions)
    pub fn untouched(&self) -> usize {
        self.progress.total - self.progress.processed()
    }

    /// Whether every item completed or was skipped
    pub fn is_success(&self) -> bool {
        self.progress.failed == 0 && self.end == SessionEnd::Finished
    }
}

/// A workspace whose listing failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFailure {
    /// The workspace
    pub workspace: Workspace,
    /// Underlying error message
    pub error: String,
}

/// Clips gathered across every workspace
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// All clips, annotated with their workspace, in workspace then feed order
    pub clips: Vec<Clip>,
    /// Workspaces whose pagination failed
    pub failures: Vec<WorkspaceFailure>,
}

/// Report of an `export_all` run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    /// Clips seen across all workspaces
    pub clips_listed: usize,
    /// Exportable clips scheduled
    pub clips_exportable: usize,
    /// Workspaces that could not be listed
    pub workspace_failures: Vec<WorkspaceFailure>,
    /// Scheduler result
    pub session: SessionResult,
}

/// Phase of one clip's WAV conversion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPhase {
    /// Conversion request sent and accepted
    Initiated,
    /// Waiting for the artifact
    Polling,
    /// Artifact URL available
    Ready,
    /// A request failed
    Failed,
    /// The polling budget ran out
    TimedOut,
    /// Cancellation was requested while waiting for the artifact
    Cancelled,
}

/// Event emitted during an export session
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Workspaces enumerated
    WorkspacesListed {
        /// Number of workspaces
        count: usize,
    },

    /// One workspace fully paginated
    WorkspaceListed {
        /// Workspace name
        workspace: String,
        /// Clips found
        clips: usize,
    },

    /// One workspace could not be paginated
    WorkspaceFailed {
        /// Workspace name
        workspace: String,
        /// Error message
        error: String,
    },

    /// Pausing before the next item
    Pacing {
        /// Pause length in milliseconds
        delay_ms: u64,
    },

    /// Item processing started
    ItemStarted {
        /// 1-based position
        index: usize,
        /// Items in the session
        total: usize,
        /// Clip identifier
        clip_id: String,
        /// Target file name
        filename: String,
    },

    /// WAV conversion moved to a new phase
    Conversion {
        /// Clip identifier
        clip_id: String,
        /// New phase
        phase: ConversionPhase,
    },

    /// Item finished (completed, skipped or failed)
    ItemFinished {
        /// Outcome record
        result: ItemResult,
        /// Counters after this item
        progress: Progress,
    },

    /// Session over
    SessionFinished {
        /// Final counters
        progress: Progress,
        /// How it ended
        end: SessionEnd,
    },
}
