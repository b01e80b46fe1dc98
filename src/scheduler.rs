//! Download scheduler
//!
//! Runs export items strictly one after another, in the order given, with a
//! randomized pause between items to stay under the remote rate limit.
//!
//! A failing item is recorded and the scheduler moves on. Two things stop a
//! run early:
//! - the cancellation token, checked before every item and while pacing; an
//!   item in flight sees the same token and may stop at its own waits, in
//!   which case it counts as not started
//! - a session-fatal error ([`crate::Error::is_session_fatal`]), which ends the run
//!   as [`SessionEnd::Aborted`]

use crate::config::DelayWindow;
use crate::error::Result;
use crate::retry::pace;
use crate::types::{Event, ExportItem, ItemOutcome, ItemResult, Progress, SessionEnd, SessionResult};
use crate::writer::WriteOutcome;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Work performed for one export item
#[async_trait]
pub trait ExportStep: Send + Sync {
    /// Produce the file for `item`
    ///
    /// Returns [`crate::Error::Cancelled`] when `cancel` fired before the
    /// file was produced.
    async fn process(&self, item: &ExportItem, cancel: &CancellationToken) -> Result<WriteOutcome>;
}

/// Sequential, paced, cancellable item runner
#[derive(Clone, Debug)]
pub struct Scheduler {
    pacing: DelayWindow,
    events: Option<broadcast::Sender<Event>>,
}

impl Scheduler {
    /// Scheduler pausing for a duration drawn from `pacing` between items
    pub fn new(pacing: DelayWindow) -> Self {
        Self {
            pacing,
            events: None,
        }
    }

    /// Publish progress on `events`
    pub fn with_events(mut self, events: broadcast::Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run `step` for every item of `items`
    pub async fn run(
        &self,
        items: &[ExportItem],
        step: &dyn ExportStep,
        cancel: &CancellationToken,
    ) -> SessionResult {
        let total = items.len();
        let mut result = SessionResult {
            progress: Progress {
                total,
                ..Progress::default()
            },
            ..SessionResult::default()
        };
        // no pause before the first item, nor after one that made no request
        let mut pace_next = false;

        tracing::info!(total, "export session started");

        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                result.end = SessionEnd::Cancelled;
                break;
            }
            if pace_next {
                match pace(&self.pacing, cancel).await {
                    Some(delay) => self.emit(Event::Pacing {
                        delay_ms: delay.as_millis() as u64,
                    }),
                    None => {
                        result.end = SessionEnd::Cancelled;
                        break;
                    }
                }
            }

            self.emit(Event::ItemStarted {
                index: index + 1,
                total,
                clip_id: item.clip_id.clone(),
                filename: item.target_filename.clone(),
            });
            tracing::debug!(
                index = index + 1,
                total,
                clip_id = %item.clip_id,
                filename = %item.target_filename,
                "processing item"
            );

            let outcome = step.process(item, cancel).await;
            if matches!(&outcome, Err(e) if e.is_cancelled()) {
                tracing::info!(clip_id = %item.clip_id, "item interrupted by cancellation");
                result.end = SessionEnd::Cancelled;
                break;
            }
            pace_next = !matches!(outcome, Ok(WriteOutcome::Skipped { .. }));

            let (outcome, fatal) = match outcome {
                Ok(WriteOutcome::Written { path, bytes }) => {
                    result.progress.completed += 1;
                    (ItemOutcome::Completed { path, bytes }, None)
                }
                Ok(WriteOutcome::Skipped { path }) => {
                    result.progress.skipped += 1;
                    (ItemOutcome::Skipped { path }, None)
                }
                Err(e) => {
                    result.progress.failed += 1;
                    tracing::warn!(clip_id = %item.clip_id, error = %e, "item failed");
                    let fatal = e.is_session_fatal().then(|| e.to_string());
                    let error = e.to_string();
                    (ItemOutcome::Failed { error }, fatal)
                }
            };

            let record = ItemResult {
                clip_id: item.clip_id.clone(),
                target_filename: item.target_filename.clone(),
                outcome,
            };
            self.emit(Event::ItemFinished {
                result: record.clone(),
                progress: result.progress,
            });
            result.outcomes.push(record);

            if let Some(reason) = fatal {
                tracing::error!(%reason, "credential rejected, aborting session");
                result.end = SessionEnd::Aborted { reason };
                break;
            }
        }

        let progress = result.progress;
        tracing::info!(
            completed = progress.completed,
            skipped = progress.skipped,
            failed = progress.failed,
            untouched = result.untouched(),
            end = ?result.end,
            "export session finished"
        );
        self.emit(Event::SessionFinished {
            progress,
            end: result.end.clone(),
        });
        result
    }
}
