//! WAV conversion orchestrator
//!
//! One conversion per clip, strictly in order:
//!
//! ```text
//! INITIATED --accepted--> POLLING --ready--> READY
//!     |                     |  ^
//!     |                     |  | not ready (wait, retry)
//!     |                     +--+
//!     |                     +--error-----> FAILED
//!     |                     +--exhausted-> TIMED_OUT
//!     |                     +--cancel----> CANCELLED
//!     +--rejected--> FAILED
//! ```
//!
//! Jobs share no state; each one lives for a single `convert` call.

use crate::client::{StudioApi, WavFileStatus};
use crate::config::{ConversionConfig, DelayWindow};
use crate::error::{Error, Result};
use crate::retry::{Attempt, PollOutcome, PollPolicy, poll_until};
use crate::types::{ConversionPhase, Event};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

impl ConversionPhase {
    /// Phase reached after observing `status` while polling
    ///
    /// Only [`ConversionPhase::Polling`] reacts to status responses; every
    /// other phase is terminal or precedes polling and is returned unchanged.
    pub fn on_status(self, status: &WavFileStatus) -> ConversionPhase {
        match (self, status) {
            (ConversionPhase::Polling, WavFileStatus::Ready(_)) => ConversionPhase::Ready,
            (ConversionPhase::Polling, WavFileStatus::NotReady) => ConversionPhase::Polling,
            (ConversionPhase::Polling, WavFileStatus::Error { .. }) => ConversionPhase::Failed,
            (phase, _) => phase,
        }
    }

    /// Whether no further transition can happen
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConversionPhase::Ready
                | ConversionPhase::Failed
                | ConversionPhase::TimedOut
                | ConversionPhase::Cancelled
        )
    }
}

/// State of one clip's conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    /// Clip being converted
    pub clip_id: String,
    /// Current phase
    pub phase: ConversionPhase,
    /// Status queries issued so far
    pub attempts: u32,
}

/// Drives conversions against a [`StudioApi`]
pub struct ConversionOrchestrator<'a> {
    api: &'a dyn StudioApi,
    policy: PollPolicy,
    events: Option<broadcast::Sender<Event>>,
}

impl<'a> ConversionOrchestrator<'a> {
    /// Orchestrator polling every `interval`, at most `max_attempts` times
    pub fn new(api: &'a dyn StudioApi, interval: Duration, max_attempts: u32) -> Self {
        Self {
            api,
            policy: PollPolicy {
                window: DelayWindow::fixed(interval),
                max_attempts: max_attempts.max(1),
            },
            events: None,
        }
    }

    /// Orchestrator using the configured interval and attempt budget
    pub fn from_config(api: &'a dyn StudioApi, config: &ConversionConfig) -> Self {
        Self::new(api, config.poll_interval, config.max_poll_attempts)
    }

    /// Publish phase changes on `events`
    pub fn with_events(mut self, events: broadcast::Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    fn enter(&self, job: &mut ConversionJob, phase: ConversionPhase) {
        job.phase = phase;
        tracing::debug!(clip_id = %job.clip_id, phase = ?phase, "conversion phase");
        if let Some(tx) = &self.events {
            let _ = tx.send(Event::Conversion {
                clip_id: job.clip_id.clone(),
                phase,
            });
        }
    }

    /// Request the conversion; on success the job is polling
    pub async fn initiate(&self, clip_id: &str) -> Result<ConversionJob> {
        let mut job = ConversionJob {
            clip_id: clip_id.to_string(),
            phase: ConversionPhase::Initiated,
            attempts: 0,
        };
        self.enter(&mut job, ConversionPhase::Initiated);

        if let Err(e) = self.api.initiate_conversion(clip_id).await {
            self.enter(&mut job, ConversionPhase::Failed);
            return Err(e);
        }

        self.enter(&mut job, ConversionPhase::Polling);
        Ok(job)
    }

    /// Poll until the WAV is ready and return its URL
    ///
    /// "Not ready" answers wait one interval and retry. Any other error
    /// response fails at once with [`Error::ConversionPoll`]; running out of
    /// attempts fails with [`Error::ConversionTimeout`]. When `cancel` fires
    /// the wait ends early and the job stops with [`Error::Cancelled`].
    pub async fn poll(&self, job: &mut ConversionJob, cancel: &CancellationToken) -> Result<String> {
        if job.phase != ConversionPhase::Polling {
            return Err(Error::ConversionPoll {
                clip_id: job.clip_id.clone(),
                status: 0,
                body: format!("cannot poll a conversion in phase {:?}", job.phase),
            });
        }

        let api = self.api;
        let clip_id = job.clip_id.as_str();
        let outcome = poll_until(&self.policy, cancel, move |attempt| async move {
            let status = api.wav_file_status(clip_id).await?;
            match (ConversionPhase::Polling.on_status(&status), status) {
                (ConversionPhase::Ready, WavFileStatus::Ready(url)) => Ok(Attempt::Ready(url)),
                (_, WavFileStatus::Error { status, body }) => Err(Error::ConversionPoll {
                    clip_id: clip_id.to_string(),
                    status,
                    body,
                }),
                _ => {
                    if attempt % 5 == 1 {
                        tracing::info!(clip_id, attempt, "still converting");
                    }
                    Ok(Attempt::Pending)
                }
            }
        })
        .await;

        match outcome {
            Ok(PollOutcome::Ready { value, attempts }) => {
                job.attempts = attempts;
                self.enter(job, ConversionPhase::Ready);
                tracing::info!(clip_id = %job.clip_id, attempts, "WAV ready");
                Ok(value)
            }
            Ok(PollOutcome::Exhausted {
                attempts,
                total_wait,
            }) => {
                job.attempts = attempts;
                self.enter(job, ConversionPhase::TimedOut);
                Err(Error::ConversionTimeout {
                    clip_id: job.clip_id.clone(),
                    attempts,
                    total_wait_ms: total_wait.as_millis() as u64,
                })
            }
            Ok(PollOutcome::Cancelled { attempts }) => {
                job.attempts = attempts;
                self.enter(job, ConversionPhase::Cancelled);
                tracing::info!(clip_id = %job.clip_id, attempts, "WAV conversion cancelled");
                Err(Error::Cancelled)
            }
            Err(e) => {
                self.enter(job, ConversionPhase::Failed);
                Err(e)
            }
        }
    }

    /// Initiate, then poll: the WAV URL for `clip_id`
    pub async fn convert(&self, clip_id: &str, cancel: &CancellationToken) -> Result<String> {
        let mut job = self.initiate(clip_id).await?;
        self.poll(&mut job, cancel).await
    }
}
