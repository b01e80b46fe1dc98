//! Feed paginator
//!
//! Walks the cursor-paginated feed of one workspace, or of every workspace,
//! until the server reports no further pages. A cancellation token, when
//! given, is checked before every page and every workspace.

use crate::client::StudioApi;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::{Clip, Cursor, Event, Listing, Page, Workspace, WorkspaceFailure};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Drives feed pagination against a [`StudioApi`]
pub struct FeedPaginator<'a> {
    api: &'a dyn StudioApi,
    page_size: u32,
    retry: RetryConfig,
    events: Option<broadcast::Sender<Event>>,
    cancel: CancellationToken,
}

impl<'a> FeedPaginator<'a> {
    /// Paginator requesting `page_size` clips per page
    pub fn new(api: &'a dyn StudioApi, page_size: u32) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            retry: RetryConfig::default(),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Retry policy for transient page failures
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Publish listing progress on `events`
    pub fn with_events(mut self, events: broadcast::Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    /// Stop listing with [`Error::Cancelled`] once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.events {
            // no subscribers is fine
            let _ = tx.send(event);
        }
    }

    /// Fetch a single page, retrying transient failures
    pub async fn fetch_page(
        &self,
        cursor: Option<&Cursor>,
        limit: u32,
        workspace_id: &str,
    ) -> Result<Page> {
        with_retry(&self.retry, || self.api.fetch_page(cursor, limit, workspace_id)).await
    }

    /// Every clip of `workspace_id`, in feed order
    ///
    /// Follows `next_cursor` while `has_more` is set. An empty first page is a
    /// valid, empty workspace. A clip seen twice (the feed shifted while we
    /// paged through it) is kept once, at its first position.
    pub async fn list_all(&self, workspace_id: &str) -> Result<Vec<Clip>> {
        let mut clips = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<Cursor> = None;
        let mut pages = 0u32;

        loop {
            self.check_cancelled()?;
            let page = self
                .fetch_page(cursor.as_ref(), self.page_size, workspace_id)
                .await?;
            pages += 1;

            let on_page = page.clips.len();
            for clip in page.clips {
                if seen.insert(clip.id.clone()) {
                    clips.push(clip);
                }
            }
            tracing::debug!(
                workspace = workspace_id,
                page = pages,
                on_page,
                total = clips.len(),
                has_more = page.has_more,
                "fetched feed page"
            );

            let next = match (page.has_more, page.next_cursor) {
                (true, Some(next)) => next,
                _ => break,
            };
            if cursor.as_ref() == Some(&next) {
                tracing::warn!(
                    workspace = workspace_id,
                    "feed returned the same cursor twice, stopping"
                );
                break;
            }
            cursor = Some(next);
        }

        Ok(clips)
    }

    /// Every clip of every workspace, tagged with its workspace
    ///
    /// A workspace whose pagination fails is reported in
    /// [`Listing::failures`] and the others are still listed. Failing to
    /// enumerate the workspaces, a rejected credential, or cancellation fails
    /// the call.
    pub async fn list_all_workspaces(&self) -> Result<Listing> {
        self.check_cancelled()?;
        let workspaces = with_retry(&self.retry, || self.api.list_workspaces()).await?;
        self.emit(Event::WorkspacesListed {
            count: workspaces.len(),
        });
        tracing::info!(count = workspaces.len(), "enumerated workspaces");

        let mut listing = Listing::default();
        for workspace in workspaces {
            self.check_cancelled()?;
            match self.list_workspace(&workspace).await {
                Ok(clips) => {
                    tracing::info!(workspace = %workspace.name, clips = clips.len(), "listed workspace");
                    self.emit(Event::WorkspaceListed {
                        workspace: workspace.name.clone(),
                        clips: clips.len(),
                    });
                    listing.clips.extend(clips);
                }
                Err(e) if e.is_session_fatal() || e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(workspace = %workspace.name, error = %e, "workspace listing failed");
                    self.emit(Event::WorkspaceFailed {
                        workspace: workspace.name.clone(),
                        error: e.to_string(),
                    });
                    listing.failures.push(WorkspaceFailure {
                        workspace,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(listing)
    }

    /// Clips of one workspace, annotated with it
    pub async fn list_workspace(&self, workspace: &Workspace) -> Result<Vec<Clip>> {
        let mut clips = self.list_all(&workspace.id).await?;
        for clip in &mut clips {
            clip.annotate(workspace);
        }
        Ok(clips)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::WavFileStatus;
    use crate::types::ClipStatus;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory feed: pages are slices of a fixed clip list, the cursor is an offset
    #[derive(Default)]
    struct FakeFeed {
        workspaces: Vec<Workspace>,
        clips: HashMap<String, Vec<Clip>>,
        failing: HashSet<String>,
        unauthorized: bool,
        cancel_on_call: Option<(usize, CancellationToken)>,
        calls: Mutex<Vec<(Option<Cursor>, String)>>,
    }

    fn clip(id: usize) -> Clip {
        Clip {
            id: format!("clip-{id}"),
            title: Some(format!("Song {id}")),
            status: ClipStatus::Complete,
            audio_url: Some(format!("https://cdn/{id}.mp3")),
            created_at: None,
            workspace_id: None,
            workspace_name: None,
        }
    }

    #[async_trait]
    impl StudioApi for FakeFeed {
        async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
            Ok(self.workspaces.clone())
        }

        async fn fetch_page(
            &self,
            cursor: Option<&Cursor>,
            limit: u32,
            workspace_id: &str,
        ) -> Result<Page> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((cursor.cloned(), workspace_id.to_string()));
                calls.len()
            };
            if let Some((n, token)) = &self.cancel_on_call {
                if *n == call {
                    token.cancel();
                }
            }
            if self.unauthorized {
                return Err(Error::NotAuthenticated {
                    reason: "HTTP 401".into(),
                });
            }
            if self.failing.contains(workspace_id) {
                return Err(Error::RemoteApi {
                    status: 400,
                    body: "bad workspace".into(),
                });
            }

            let all = self.clips.get(workspace_id).cloned().unwrap_or_default();
            let offset = cursor
                .and_then(|c| c.0.as_u64())
                .unwrap_or(0) as usize;
            let end = (offset + limit as usize).min(all.len());
            let has_more = end < all.len();
            Ok(Page {
                clips: all[offset.min(end)..end].to_vec(),
                has_more,
                next_cursor: has_more.then(|| Cursor(serde_json::json!(end))),
            })
        }

        async fn initiate_conversion(&self, _clip_id: &str) -> Result<()> {
            unreachable!("not used by the paginator")
        }

        async fn wav_file_status(&self, _clip_id: &str) -> Result<WavFileStatus> {
            unreachable!("not used by the paginator")
        }
    }

    fn feed_with(n: usize) -> FakeFeed {
        let mut feed = FakeFeed::default();
        feed.clips
            .insert("default".into(), (0..n).map(clip).collect());
        feed
    }

    #[tokio::test]
    async fn list_all_returns_every_clip_once_for_any_page_size() {
        for n in [0usize, 1, 7, 20, 41] {
            for page_size in [1u32, 2, 3, 5, 20, 50] {
                let feed = feed_with(n);
                let clips = FeedPaginator::new(&feed, page_size)
                    .list_all("default")
                    .await
                    .unwrap();

                let ids: Vec<_> = clips.iter().map(|c| c.id.clone()).collect();
                let expected: Vec<_> = (0..n).map(|i| format!("clip-{i}")).collect();
                assert_eq!(ids, expected, "n={n} page_size={page_size}");
            }
        }
    }

    #[tokio::test]
    async fn first_request_has_no_cursor_and_later_ones_follow_next_cursor() {
        let feed = feed_with(5);
        FeedPaginator::new(&feed, 2).list_all("default").await.unwrap();

        let cursors: Vec<_> = feed
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _)| c.clone())
            .collect();
        assert_eq!(
            cursors,
            vec![
                None,
                Some(Cursor(serde_json::json!(2))),
                Some(Cursor(serde_json::json!(4)))
            ]
        );
    }

    #[tokio::test]
    async fn empty_workspace_is_not_an_error() {
        let feed = feed_with(0);
        let clips = FeedPaginator::new(&feed, 20).list_all("default").await.unwrap();
        assert!(clips.is_empty());
        assert_eq!(feed.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_workspace_is_reported_and_others_continue() {
        let mut feed = FakeFeed::default();
        feed.workspaces = vec![
            Workspace {
                id: "a".into(),
                name: "Alpha".into(),
            },
            Workspace {
                id: "b".into(),
                name: "Broken".into(),
            },
            Workspace {
                id: "c".into(),
                name: "Gamma".into(),
            },
        ];
        feed.clips.insert("a".into(), vec![clip(1), clip(2)]);
        feed.clips.insert("c".into(), vec![clip(3)]);
        feed.failing.insert("b".into());

        let listing = FeedPaginator::new(&feed, 20)
            .with_retry(RetryConfig {
                max_attempts: 0,
                ..RetryConfig::default()
            })
            .list_all_workspaces()
            .await
            .unwrap();

        assert_eq!(listing.clips.len(), 3);
        assert_eq!(listing.failures.len(), 1);
        assert_eq!(listing.failures[0].workspace.name, "Broken");
        assert!(listing.failures[0].error.contains("400"));

        let gamma = listing.clips.iter().find(|c| c.id == "clip-3").unwrap();
        assert_eq!(gamma.workspace_id.as_deref(), Some("c"));
        assert_eq!(gamma.workspace_name.as_deref(), Some("Gamma"));
    }

    #[tokio::test]
    async fn rejected_credential_aborts_the_listing() {
        let mut feed = feed_with(3);
        feed.workspaces = vec![Workspace {
            id: "default".into(),
            name: "Default".into(),
        }];
        feed.unauthorized = true;

        let err = FeedPaginator::new(&feed, 20)
            .list_all_workspaces()
            .await
            .unwrap_err();
        assert!(err.is_session_fatal());
    }

    #[tokio::test]
    async fn cancellation_stops_between_pages() {
        let cancel = CancellationToken::new();
        let mut feed = feed_with(10);
        feed.cancel_on_call = Some((2, cancel.clone()));

        let err = FeedPaginator::new(&feed, 2)
            .with_cancellation(cancel)
            .list_all("default")
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(feed.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_listing_skips_remaining_workspaces() {
        let cancel = CancellationToken::new();
        let mut feed = FakeFeed::default();
        feed.workspaces = ["a", "b", "c"]
            .into_iter()
            .map(|id| Workspace {
                id: id.into(),
                name: id.to_uppercase(),
            })
            .collect();
        for id in ["a", "b", "c"] {
            feed.clips.insert(id.into(), vec![clip(1)]);
        }
        feed.cancel_on_call = Some((1, cancel.clone()));

        let err = FeedPaginator::new(&feed, 20)
            .with_cancellation(cancel)
            .list_all_workspaces()
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        let workspaces: Vec<_> = feed
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, w)| w.clone())
            .collect();
        assert_eq!(workspaces, vec!["a"]);
    }

    #[tokio::test]
    async fn listing_events_are_published() {
        let mut feed = feed_with(2);
        feed.workspaces = vec![Workspace {
            id: "default".into(),
            name: "Default".into(),
        }];
        let (tx, mut rx) = broadcast::channel(16);

        FeedPaginator::new(&feed, 20)
            .with_events(tx)
            .list_all_workspaces()
            .await
            .unwrap();

        assert!(matches!(rx.recv().await.unwrap(), Event::WorkspacesListed { count: 1 }));
        match rx.recv().await.unwrap() {
            Event::WorkspaceListed { workspace, clips } => {
                assert_eq!(workspace, "Default");
                assert_eq!(clips, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
