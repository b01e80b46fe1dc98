//! End-to-end export tests against a mock studio API
//!
//! Every test runs a full session: workspace listing, feed pagination,
//! scheduling and file writes into a temporary download directory.

mod common;

use common::*;
use serde_json::json;
use suno_export::utils::export_filename;
use suno_export::{Event, ExportFormat, ItemOutcome, SessionEnd};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn default_workspace_with_three_clips(server: &MockServer) {
    mount_workspaces(server, &[("default", "Default")]).await;
    mount_feed(
        server,
        "default",
        vec![
            complete_clip(server, CLIP_1, "First Song"),
            clip_json(CLIP_2, "Still Rendering", "processing", None),
            complete_clip(server, CLIP_3, "Third: Song?"),
        ],
    )
    .await;
}

#[tokio::test]
async fn export_all_mp3_writes_exactly_the_exportable_clips() {
    let server = MockServer::start().await;
    default_workspace_with_three_clips(&server).await;
    mount_mp3(&server, CLIP_1, 1).await;
    mount_mp3(&server, CLIP_3, 1).await;
    let dir = TempDir::new().unwrap();
    let session = session_for(&server, dir.path()).await;

    let report = session
        .export_all(ExportFormat::Mp3, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.clips_listed, 3);
    assert_eq!(report.clips_exportable, 2);
    assert!(report.workspace_failures.is_empty());
    assert_eq!(report.session.completed(), 2);
    assert_eq!(report.session.failed(), 0);
    assert_eq!(report.session.end, SessionEnd::Finished);

    let first = format!("Default-First_Song-{CLIP_1}.mp3");
    let third = format!("Default-Third__Song_-{CLIP_3}.mp3");
    assert_eq!(files_in(dir.path()), {
        let mut expected = vec![first.clone(), third.clone()];
        expected.sort();
        expected
    });
    assert_eq!(std::fs::read(dir.path().join(&first)).unwrap(), mp3_bytes(CLIP_1));
    assert_eq!(
        first,
        export_filename("Default", "First Song", CLIP_1, ExportFormat::Mp3)
    );
}

#[tokio::test]
async fn second_run_skips_existing_files_without_transfers() {
    let server = MockServer::start().await;
    default_workspace_with_three_clips(&server).await;
    // each MP3 is fetched once across both runs
    mount_mp3(&server, CLIP_1, 1).await;
    mount_mp3(&server, CLIP_3, 1).await;
    let dir = TempDir::new().unwrap();
    let session = session_for(&server, dir.path()).await;
    let cancel = CancellationToken::new();

    let first = session.export_all(ExportFormat::Mp3, &cancel).await.unwrap();
    let second = session.export_all(ExportFormat::Mp3, &cancel).await.unwrap();

    assert_eq!(first.session.completed(), 2);
    assert_eq!(second.session.completed(), 0);
    assert_eq!(second.session.skipped(), 2);
    assert!(second.session.is_success());
    assert_eq!(second.session.progress.percent(), 100);
}

#[tokio::test]
async fn export_follows_feed_cursors_across_pages() {
    let server = MockServer::start().await;
    mount_workspaces(&server, &[("default", "Default")]).await;
    Mock::given(method("POST"))
        .and(path("/api/feed/v3"))
        .and(body_partial_json(json!({ "cursor": null })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "clips": [complete_clip(&server, CLIP_1, "One")],
            "has_more": true,
            "next_cursor": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/feed/v3"))
        .and(body_partial_json(json!({ "cursor": "page-2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "clips": [complete_clip(&server, CLIP_2, "Two")],
            "has_more": false,
            "next_cursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_mp3(&server, CLIP_1, 1).await;
    mount_mp3(&server, CLIP_2, 1).await;
    let dir = TempDir::new().unwrap();

    let report = session_for(&server, dir.path())
        .await
        .export_all(ExportFormat::Mp3, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.clips_listed, 2);
    assert_eq!(report.session.completed(), 2);
}

#[tokio::test]
async fn failing_workspace_is_reported_and_others_are_exported() {
    let server = MockServer::start().await;
    mount_workspaces(&server, &[("broken", "Broken"), ("default", "Default")]).await;
    Mock::given(method("POST"))
        .and(path("/api/feed/v3"))
        .and(body_partial_json(json!({
            "filters": { "workspace": { "workspaceId": "broken" } }
        })))
        .respond_with(ResponseTemplate::new(500).set_body_string("feed exploded"))
        .mount(&server)
        .await;
    mount_feed(&server, "default", vec![complete_clip(&server, CLIP_1, "Survivor")]).await;
    mount_mp3(&server, CLIP_1, 1).await;
    let dir = TempDir::new().unwrap();

    let report = session_for(&server, dir.path())
        .await
        .export_all(ExportFormat::Mp3, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.workspace_failures.len(), 1);
    assert_eq!(report.workspace_failures[0].workspace.id, "broken");
    assert!(report.workspace_failures[0].error.contains("feed exploded"));
    assert_eq!(report.session.completed(), 1);
}

#[tokio::test]
async fn odd_records_do_not_hide_the_valid_clips_of_a_workspace() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/project/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [{"id": "default", "name": null}],
            "num_total_results": 1
        })))
        .mount(&server)
        .await;
    let mut odd = clip_json(CLIP_2, "Odd", "complete", None);
    odd["status"] = json!(null);
    odd["created_at"] = json!("last tuesday");
    mount_feed(
        &server,
        "default",
        vec![
            complete_clip(&server, CLIP_1, "Valid"),
            odd,
            json!({"title": "no id at all"}),
        ],
    )
    .await;
    mount_mp3(&server, CLIP_1, 1).await;
    let dir = TempDir::new().unwrap();

    let report = session_for(&server, dir.path())
        .await
        .export_all(ExportFormat::Mp3, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.workspace_failures.is_empty());
    assert_eq!(report.clips_listed, 2);
    assert_eq!(report.clips_exportable, 1);
    assert_eq!(report.session.completed(), 1);
    assert_eq!(
        files_in(dir.path()),
        vec![format!("Unknown-Valid-{CLIP_1}.mp3")]
    );
}

#[tokio::test]
async fn failed_transfer_is_recorded_and_the_session_continues() {
    let server = MockServer::start().await;
    mount_workspaces(&server, &[("default", "Default")]).await;
    mount_feed(
        &server,
        "default",
        vec![
            complete_clip(&server, CLIP_1, "Gone"),
            complete_clip(&server, CLIP_2, "Fine"),
        ],
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("/audio/{CLIP_1}.mp3")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_mp3(&server, CLIP_2, 1).await;
    let dir = TempDir::new().unwrap();

    let report = session_for(&server, dir.path())
        .await
        .export_all(ExportFormat::Mp3, &CancellationToken::new())
        .await
        .unwrap();

    let session = report.session;
    assert_eq!((session.completed(), session.failed()), (1, 1));
    assert!(matches!(
        &session.outcomes[0].outcome,
        ItemOutcome::Failed { error } if error.contains("HTTP 404")
    ));
    assert_eq!(files_in(dir.path()), vec![format!("Default-Fine-{CLIP_2}.mp3")]);
}

#[tokio::test]
async fn rejected_token_fails_the_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/project/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let err = session_for(&server, dir.path())
        .await
        .export_all(ExportFormat::Mp3, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_session_fatal());
}

#[tokio::test]
async fn cancelled_before_start_lists_and_transfers_nothing() {
    let server = MockServer::start().await;
    default_workspace_with_three_clips(&server).await;
    mount_mp3(&server, CLIP_1, 0).await;
    mount_mp3(&server, CLIP_3, 0).await;
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = session_for(&server, dir.path())
        .await
        .export_all(ExportFormat::Mp3, &cancel)
        .await
        .unwrap();

    assert_eq!(report.session.end, SessionEnd::Cancelled);
    assert_eq!(report.clips_listed, 0);
    assert_eq!(requests_to(&server, "/api/project/me").await, 0);
    assert_eq!(requests_to(&server, "/api/feed/v3").await, 0);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn selection_cancelled_before_start_leaves_every_item_untouched() {
    let server = MockServer::start().await;
    default_workspace_with_three_clips(&server).await;
    mount_mp3(&server, CLIP_1, 0).await;
    mount_mp3(&server, CLIP_3, 0).await;
    let dir = TempDir::new().unwrap();
    let session = session_for(&server, dir.path()).await;
    let listing = session.list_clips(None).await.unwrap();
    let items = suno_export::session::plan_items(&listing.clips, ExportFormat::Mp3);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = session
        .export_selection(&items, ExportFormat::Mp3, &cancel)
        .await;

    assert_eq!(result.end, SessionEnd::Cancelled);
    assert_eq!(result.untouched(), 2);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn selection_exports_only_the_chosen_items() {
    let server = MockServer::start().await;
    default_workspace_with_three_clips(&server).await;
    mount_mp3(&server, CLIP_1, 0).await;
    mount_mp3(&server, CLIP_3, 1).await;
    let dir = TempDir::new().unwrap();
    let session = session_for(&server, dir.path()).await;

    let listing = session.list_clips(Some("default")).await.unwrap();
    let chosen: Vec<_> = listing
        .clips
        .into_iter()
        .filter(|c| c.id == CLIP_3)
        .collect();
    let items = suno_export::session::plan_items(&chosen, ExportFormat::Mp3);
    let result = session
        .export_selection(&items, ExportFormat::Mp3, &CancellationToken::new())
        .await;

    assert_eq!(result.completed(), 1);
    assert_eq!(result.outcomes[0].clip_id, CLIP_3);
}

#[tokio::test]
async fn progress_events_are_published_per_item() {
    let server = MockServer::start().await;
    default_workspace_with_three_clips(&server).await;
    mount_mp3(&server, CLIP_1, 1).await;
    mount_mp3(&server, CLIP_3, 1).await;
    let dir = TempDir::new().unwrap();
    let session = session_for(&server, dir.path()).await;
    let mut events = session.subscribe();

    session
        .export_all(ExportFormat::Mp3, &CancellationToken::new())
        .await
        .unwrap();

    let mut percents = Vec::new();
    let mut finished = false;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::ItemFinished { progress, .. } => percents.push(progress.percent()),
            Event::SessionFinished { progress, end } => {
                assert_eq!(progress.completed, 2);
                assert_eq!(end, SessionEnd::Finished);
                finished = true;
            }
            _ => {}
        }
    }
    assert_eq!(percents, vec![50, 100]);
    assert!(finished);
}
