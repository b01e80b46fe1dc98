//! Export session façade
//!
//! [`ExportSession`] wires the token store, feed paginator, conversion
//! orchestrator, scheduler and artifact writer into the operations a front-end
//! calls: export everything, export one workspace, export a selection, or
//! convert MP3 files already on disk.

use crate::auth::TokenStore;
use crate::client::{StudioApi, StudioClient};
use crate::config::{Config, ConversionConfig, DelayWindow};
use crate::conversion::ConversionOrchestrator;
use crate::error::{Error, Result};
use crate::feed::FeedPaginator;
use crate::retry::with_retry;
use crate::scheduler::{ExportStep, Scheduler};
use crate::types::{
    Clip, Event, ExportFormat, ExportItem, ExportReport, Listing, SessionEnd, SessionResult,
    Workspace,
};
use crate::utils::{clip_id_from_filename, with_format_extension};
use crate::writer::{ArtifactWriter, WriteOutcome};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Entry point for export operations
///
/// One session runs at most one export at a time; every export is strictly
/// sequential. Progress is published as [`Event`]s to every subscriber.
pub struct ExportSession {
    config: Config,
    api: Arc<dyn StudioApi>,
    writer: ArtifactWriter,
    event_tx: broadcast::Sender<Event>,
}

impl ExportSession {
    /// Session over an arbitrary API implementation and writer
    pub fn new(config: Config, api: Arc<dyn StudioApi>, writer: ArtifactWriter) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        Self {
            config,
            api,
            writer,
            event_tx,
        }
    }

    /// Session talking to the studio API described by `config`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use suno_export::{Config, ExportFormat, ExportSession, TokenStore};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = Config::default();
    /// let tokens = TokenStore::file(&config.credentials_path);
    /// let session = ExportSession::from_config(config, tokens)?;
    ///
    /// let mut events = session.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         println!("{event:?}");
    ///     }
    /// });
    ///
    /// let report = session
    ///     .export_all(ExportFormat::Mp3, &CancellationToken::new())
    ///     .await?;
    /// println!("{} written", report.session.completed());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_config(config: Config, tokens: TokenStore) -> Result<Self> {
        config.validate()?;
        let client = StudioClient::new(&config.api, tokens)?;

        // audio files can be large; only bound the connect phase
        let http = reqwest::Client::builder()
            .user_agent(config.api.user_agent.as_str())
            .connect_timeout(config.api.request_timeout)
            .build()?;
        let writer = ArtifactWriter::new(http, config.download.skip_existing)
            .with_referer(config.api.referer.clone());

        Ok(Self::new(config, Arc::new(client), writer))
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn paginator(&self, cancel: &CancellationToken) -> FeedPaginator<'_> {
        FeedPaginator::new(self.api.as_ref(), self.config.api.page_size)
            .with_retry(self.config.api.retry.clone())
            .with_events(self.event_tx.clone())
            .with_cancellation(cancel.clone())
    }

    /// Every workspace of the signed-in user
    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        with_retry(&self.config.api.retry, || self.api.list_workspaces()).await
    }

    /// Clips of every workspace, or of the workspace with id `workspace_id`
    pub async fn list_clips(&self, workspace_id: Option<&str>) -> Result<Listing> {
        self.list_clips_until(workspace_id, &CancellationToken::new())
            .await
    }

    async fn list_clips_until(
        &self,
        workspace_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Listing> {
        let Some(workspace_id) = workspace_id else {
            return self.paginator(cancel).list_all_workspaces().await;
        };

        let workspace = self
            .list_workspaces()
            .await?
            .into_iter()
            .find(|w| w.id == workspace_id)
            .unwrap_or_else(|| Workspace {
                id: workspace_id.to_string(),
                name: workspace_id.to_string(),
            });
        let clips = self.paginator(cancel).list_workspace(&workspace).await?;
        Ok(Listing {
            clips,
            failures: Vec::new(),
        })
    }

    /// Export every exportable clip of every workspace
    ///
    /// Workspaces that cannot be listed are reported in
    /// [`ExportReport::workspace_failures`]; the rest are exported. A rejected
    /// credential while listing fails the call. Cancellation during listing
    /// ends the report as [`SessionEnd::Cancelled`] with nothing scheduled.
    pub async fn export_all(
        &self,
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> Result<ExportReport> {
        self.export_listed(None, format, cancel).await
    }

    /// Export every exportable clip of one workspace
    pub async fn export_workspace(
        &self,
        workspace_id: &str,
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> Result<ExportReport> {
        self.export_listed(Some(workspace_id), format, cancel).await
    }

    async fn export_listed(
        &self,
        workspace_id: Option<&str>,
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> Result<ExportReport> {
        match self.list_clips_until(workspace_id, cancel).await {
            Ok(listing) => Ok(self.export_listing(listing, format, cancel).await),
            Err(e) if e.is_cancelled() => {
                tracing::info!("export cancelled while listing");
                let session = SessionResult {
                    end: SessionEnd::Cancelled,
                    ..SessionResult::default()
                };
                let _ = self.event_tx.send(Event::SessionFinished {
                    progress: session.progress,
                    end: session.end.clone(),
                });
                Ok(ExportReport {
                    session,
                    ..ExportReport::default()
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn export_listing(
        &self,
        listing: Listing,
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> ExportReport {
        let items = plan_items(&listing.clips, format);
        tracing::info!(
            listed = listing.clips.len(),
            exportable = items.len(),
            %format,
            "planned export"
        );
        let session = self.export_selection(&items, format, cancel).await;
        ExportReport {
            clips_listed: listing.clips.len(),
            clips_exportable: items.len(),
            workspace_failures: listing.failures,
            session,
        }
    }

    /// Export caller-chosen items in `format`, in the order given
    ///
    /// Items planned for another format are retargeted to `format`.
    pub async fn export_selection(
        &self,
        items: &[ExportItem],
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> SessionResult {
        let items: Vec<ExportItem> = items.iter().map(|i| retarget(i, format)).collect();
        let dir = self.config.download.download_dir.clone();
        self.run(&items, format, &dir, cancel).await
    }

    /// Convert exported MP3 files in `dir` to WAV, writing next to them
    ///
    /// Clip ids are recovered from the file names; files without one are
    /// ignored.
    pub async fn convert_local(
        &self,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<SessionResult> {
        let items = local_mp3_items(dir).await?;
        tracing::info!(dir = %dir.display(), found = items.len(), "local MP3 exports");
        Ok(self.run(&items, ExportFormat::Wav, dir, cancel).await)
    }

    async fn run(
        &self,
        items: &[ExportItem],
        format: ExportFormat,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> SessionResult {
        let scheduler =
            Scheduler::new(self.pacing(format)).with_events(self.event_tx.clone());
        match format {
            ExportFormat::Mp3 => {
                let step = Mp3Step {
                    writer: &self.writer,
                    dir,
                };
                scheduler.run(items, &step, cancel).await
            }
            ExportFormat::Wav => {
                let step = WavStep {
                    api: self.api.as_ref(),
                    conversion: &self.config.conversion,
                    writer: &self.writer,
                    dir,
                    events: self.event_tx.clone(),
                };
                scheduler.run(items, &step, cancel).await
            }
        }
    }

    fn pacing(&self, format: ExportFormat) -> DelayWindow {
        match format {
            ExportFormat::Mp3 => self.config.download.mp3_pacing,
            ExportFormat::Wav => self.config.download.wav_pacing,
        }
    }
}

/// Export items for the exportable subset of `clips`, in order
pub fn plan_items(clips: &[Clip], format: ExportFormat) -> Vec<ExportItem> {
    clips
        .iter()
        .filter(|c| c.is_exportable())
        .map(|c| ExportItem::from_clip(c, format))
        .collect()
}

fn retarget(item: &ExportItem, format: ExportFormat) -> ExportItem {
    let mut item = item.clone();
    if item.format != format {
        item.target_filename = with_format_extension(Path::new(&item.target_filename), format)
            .to_string_lossy()
            .into_owned();
        item.format = format;
    }
    item
}

/// WAV export items for the exported MP3 files found in `dir`
///
/// Each item targets the sibling `.wav` name. Sorted by file name.
pub async fn local_mp3_items(dir: &Path) -> Result<Vec<ExportItem>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::filesystem(dir, e))?;

    let mut items = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::filesystem(dir, e))?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().filter(|_| is_file) else {
            continue;
        };
        let Some(clip_id) = clip_id_from_filename(name) else {
            tracing::trace!(file = name, "no clip id in file name, ignoring");
            continue;
        };

        let path = PathBuf::from(name);
        items.push(ExportItem {
            title: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            target_filename: with_format_extension(&path, ExportFormat::Wav)
                .to_string_lossy()
                .into_owned(),
            clip_id,
            workspace_name: String::new(),
            format: ExportFormat::Wav,
            audio_url: None,
        });
    }

    items.sort_by(|a, b| a.target_filename.cmp(&b.target_filename));
    Ok(items)
}

/// Direct transfer of the rendered MP3
struct Mp3Step<'a> {
    writer: &'a ArtifactWriter,
    dir: &'a Path,
}

#[async_trait]
impl<'a> ExportStep for Mp3Step<'a> {
    async fn process(
        &self,
        item: &ExportItem,
        _cancel: &CancellationToken,
    ) -> Result<WriteOutcome> {
        let url = item
            .audio_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::MissingAudio {
                clip_id: item.clip_id.clone(),
            })?;
        self.writer
            .write(url, &self.dir.join(&item.target_filename))
            .await
    }
}

/// Server-side conversion, then transfer of the WAV
struct WavStep<'a> {
    api: &'a dyn StudioApi,
    conversion: &'a ConversionConfig,
    writer: &'a ArtifactWriter,
    dir: &'a Path,
    events: broadcast::Sender<Event>,
}

#[async_trait]
impl<'a> ExportStep for WavStep<'a> {
    async fn process(
        &self,
        item: &ExportItem,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome> {
        let destination = self.dir.join(&item.target_filename);
        // an existing WAV needs no conversion either
        if self.writer.would_skip(&destination).await {
            return Ok(WriteOutcome::Skipped { path: destination });
        }

        let url = ConversionOrchestrator::from_config(self.api, self.conversion)
            .with_events(self.events.clone())
            .convert(&item.clip_id, cancel)
            .await?;
        self.writer.write(&url, &destination).await
    }
}
