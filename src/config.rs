//! Configuration types for suno-export

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Remote API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the studio API (default: "https://studio-api.prod.suno.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Clips requested per feed page (default: 20)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "millis_serde")]
    pub request_timeout: Duration,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Origin header sent to the studio API (default: "https://suno.com")
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Referer header sent with every request, including audio transfers
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Retry policy for transient workspace/feed failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            origin: default_origin(),
            referer: default_referer(),
            retry: RetryConfig::default(),
        }
    }
}

/// Where and how exported files are written
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Skip items whose target file already exists (default: true)
    ///
    /// This is what makes repeated export runs cheap: only new clips are
    /// fetched or converted.
    #[serde(default = "default_true")]
    pub skip_existing: bool,

    /// Pause between direct MP3 transfers (default: 1000..3000 ms)
    #[serde(default = "default_mp3_pacing")]
    pub mp3_pacing: DelayWindow,

    /// Pause between WAV conversions (default: 2000..4000 ms)
    #[serde(default = "default_wav_pacing")]
    pub wav_pacing: DelayWindow,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            skip_existing: true,
            mp3_pacing: default_mp3_pacing(),
            wav_pacing: default_wav_pacing(),
        }
    }
}

/// WAV conversion polling settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Wait between status queries (default: 2000 ms)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    pub poll_interval: Duration,

    /// Status queries before giving up (default: 60, about two minutes)
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

/// Main configuration for an export session
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Output directory, skip policy and pacing
    #[serde(default)]
    pub download: DownloadConfig,

    /// WAV conversion polling
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// File backing the token store (default: "<config dir>/suno-export/credentials.json")
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            download: DownloadConfig::default(),
            conversion: ConversionConfig::default(),
            credentials_path: default_credentials_path(),
        }
    }
}

impl Config {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config {
            message: format!("failed to parse config: {e}"),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        app_dir().join("config.toml")
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.api.page_size == 0 {
            return Err(Error::config("api.page_size", "page size must be at least 1"));
        }
        if self.conversion.max_poll_attempts == 0 {
            return Err(Error::config(
                "conversion.max_poll_attempts",
                "at least one status query is required",
            ));
        }
        let multiplier = self.api.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::config(
                "api.retry.backoff_multiplier",
                format!("backoff multiplier must be a finite number >= 1.0, got {multiplier}"),
            ));
        }
        self.download.mp3_pacing.validate("download.mp3_pacing")?;
        self.download.wav_pacing.validate("download.wav_pacing")?;
        url::Url::parse(&self.api.base_url)?;
        Ok(())
    }
}

/// Closed interval a randomized pause is drawn from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayWindow {
    /// Shortest pause
    #[serde(with = "millis_serde")]
    pub min_delay: Duration,
    /// Longest pause
    #[serde(with = "millis_serde")]
    pub max_delay: Duration,
}

impl DelayWindow {
    /// Window between `min_ms` and `max_ms` milliseconds
    pub const fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_delay: Duration::from_millis(min_ms),
            max_delay: Duration::from_millis(max_ms),
        }
    }

    /// A window that always yields `delay`
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            min_delay: delay,
            max_delay: delay,
        }
    }

    /// A window that never pauses
    pub const fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    fn validate(&self, key: &str) -> Result<()> {
        if self.min_delay > self.max_delay {
            return Err(Error::config(
                key,
                format!(
                    "min_delay ({}ms) exceeds max_delay ({}ms)",
                    self.min_delay.as_millis(),
                    self.max_delay.as_millis()
                ),
            ));
        }
        Ok(())
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1000 ms)
    #[serde(default = "default_initial_delay", with = "millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30000 ms)
    #[serde(default = "default_max_delay", with = "millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("suno-export")
}

fn default_base_url() -> String {
    "https://studio-api.prod.suno.com".to_string()
}

fn default_page_size() -> u32 {
    20
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/142.0.0.0 Safari/537.36"
        .to_string()
}

fn default_origin() -> String {
    "https://suno.com".to_string()
}

fn default_referer() -> String {
    "https://suno.com/".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_true() -> bool {
    true
}

fn default_mp3_pacing() -> DelayWindow {
    DelayWindow::from_millis(1000, 3000)
}

fn default_wav_pacing() -> DelayWindow {
    DelayWindow::from_millis(2000, 4000)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(2000)
}

fn default_max_poll_attempts() -> u32 {
    60
}

fn default_credentials_path() -> PathBuf {
    app_dir().join("credentials.json")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Durations are written as integer milliseconds
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
