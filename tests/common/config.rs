//! Test configuration helpers for building sessions against a mock studio API

use std::path::Path;
use std::time::Duration;
use suno_export::{Config, DelayWindow, ExportSession, RetryConfig, TokenStore};
use wiremock::MockServer;

/// Bearer token the mock server expects
pub const TEST_TOKEN: &str = "test-bearer-token";

/// Device id attached to every request
pub const TEST_DEVICE_ID: &str = "5b0f4b7e-0000-4000-8000-000000000001";

/// Configuration pointing at `server`, writing into `download_dir`
///
/// Pacing and poll waits are shortened so tests run in milliseconds;
/// transient errors are not retried.
pub fn test_config(server: &MockServer, download_dir: &Path) -> Config {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.api.retry = RetryConfig {
        max_attempts: 0,
        ..RetryConfig::default()
    };
    config.download.download_dir = download_dir.to_path_buf();
    config.download.mp3_pacing = DelayWindow::none();
    config.download.wav_pacing = DelayWindow::none();
    config.conversion.poll_interval = Duration::from_millis(1);
    config.credentials_path = download_dir.join("credentials.json");
    config
}

/// In-memory token store holding [`TEST_TOKEN`]
pub async fn test_tokens() -> TokenStore {
    let tokens = TokenStore::in_memory();
    tokens.set(TEST_TOKEN).await.unwrap();
    tokens.set_device_id(TEST_DEVICE_ID).await.unwrap();
    tokens
}

/// Session using [`test_config`]
pub async fn session_for(server: &MockServer, download_dir: &Path) -> ExportSession {
    session_with(test_config(server, download_dir)).await
}

/// Session using `config`
pub async fn session_with(config: Config) -> ExportSession {
    ExportSession::from_config(config, test_tokens().await).unwrap()
}
