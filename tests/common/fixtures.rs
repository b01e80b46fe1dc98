//! Feed fixtures and mock endpoint helpers

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Clip ids used across tests
pub const CLIP_1: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";
/// Second clip id
pub const CLIP_2: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
/// Third clip id
pub const CLIP_3: &str = "16fd2706-8baf-433b-82eb-8c7fada847da";

/// Fake MP3 payload served for a clip
pub fn mp3_bytes(clip_id: &str) -> Vec<u8> {
    format!("ID3-fake-mp3-{clip_id}").into_bytes()
}

/// Fake WAV payload served for a clip
pub fn wav_bytes(clip_id: &str) -> Vec<u8> {
    format!("RIFF-fake-wav-{clip_id}").into_bytes()
}

/// Feed JSON for one clip
pub fn clip_json(id: &str, title: &str, status: &str, audio_url: Option<String>) -> Value {
    json!({
        "id": id,
        "title": title,
        "status": status,
        "audio_url": audio_url,
        "created_at": "2025-03-01T10:15:30.000Z"
    })
}

/// Feed JSON for a complete clip whose MP3 is served by `server`
pub fn complete_clip(server: &MockServer, id: &str, title: &str) -> Value {
    clip_json(id, title, "complete", Some(format!("{}/audio/{id}.mp3", server.uri())))
}

/// Serve `workspaces` (as `(id, name)`) from the project listing endpoint
pub async fn mount_workspaces(server: &MockServer, workspaces: &[(&str, &str)]) {
    let projects: Vec<Value> = workspaces
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/project/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "projects": projects })))
        .mount(server)
        .await;
}

/// Serve a single-page feed of `clips` for `workspace_id`
pub async fn mount_feed(server: &MockServer, workspace_id: &str, clips: Vec<Value>) {
    Mock::given(method("POST"))
        .and(path("/api/feed/v3"))
        .and(body_partial_json(json!({
            "filters": { "workspace": { "workspaceId": workspace_id } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "clips": clips,
            "has_more": false,
            "next_cursor": null
        })))
        .mount(server)
        .await;
}

/// Serve the MP3 of `clip_id`, expecting exactly `times` transfers
pub async fn mount_mp3(server: &MockServer, clip_id: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/audio/{clip_id}.mp3")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(mp3_bytes(clip_id)))
        .expect(times)
        .mount(server)
        .await;
}

/// Accept conversion requests for `clip_id` with 204 No Content
pub async fn mount_convert(server: &MockServer, clip_id: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/api/gen/{clip_id}/convert_wav/")))
        .respond_with(ResponseTemplate::new(204))
        .expect(times)
        .mount(server)
        .await;
}

/// Report the WAV of `clip_id` as not ready `not_ready` times, then ready
///
/// The ready answer points at `/wav/<clip_id>.wav`, which is served too.
pub async fn mount_wav_ready_after(server: &MockServer, clip_id: &str, not_ready: u64) {
    let status_path = format!("/api/gen/{clip_id}/wav_file/");
    if not_ready > 0 {
        Mock::given(method("GET"))
            .and(path(status_path.clone()))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(not_ready)
            .with_priority(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(status_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "wav_file_url": format!("{}/wav/{clip_id}.wav", server.uri())
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/wav/{clip_id}.wav")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav_bytes(clip_id)))
        .mount(server)
        .await;
}

/// Requests the server received for `request_path`
pub async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}

/// File names in `dir`, sorted
pub fn files_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
