//! Artifact writer: fetch a remote file and persist it locally
//!
//! The writer never overwrites a file. With `skip_existing` an existing
//! target is reported as skipped without any network traffic; without it the
//! new copy lands next to the old one as `name (1).ext`, `name (2).ext`, ...
//! Bytes are streamed into a `.part` file that is renamed into place only
//! once complete, so an interrupted run never leaves a truncated file under
//! the final name.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Result of one write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file was fetched and written
    Written {
        /// Final location
        path: PathBuf,
        /// Bytes written
        bytes: u64,
    },
    /// The target already existed; nothing was fetched
    Skipped {
        /// Existing file
        path: PathBuf,
    },
}

/// Streams remote artifacts to the local filesystem
#[derive(Clone, Debug)]
pub struct ArtifactWriter {
    http: reqwest::Client,
    referer: Option<String>,
    skip_existing: bool,
}

impl ArtifactWriter {
    /// Writer using `http` for transfers
    pub fn new(http: reqwest::Client, skip_existing: bool) -> Self {
        Self {
            http,
            referer: None,
            skip_existing,
        }
    }

    /// Send `referer` with every transfer
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Whether existing targets are skipped
    pub fn skips_existing(&self) -> bool {
        self.skip_existing
    }

    /// Whether `destination` already holds a file this writer would skip
    pub async fn would_skip(&self, destination: &Path) -> bool {
        self.skip_existing && file_exists(destination).await
    }

    /// Fetch `source_url` into `destination`
    ///
    /// Fails with [`Error::Transfer`] on a non-2xx response and
    /// [`Error::Filesystem`] when the file cannot be written.
    pub async fn write(&self, source_url: &str, destination: &Path) -> Result<WriteOutcome> {
        if self.would_skip(destination).await {
            tracing::debug!(path = %destination.display(), "target exists, skipping");
            return Ok(WriteOutcome::Skipped {
                path: destination.to_path_buf(),
            });
        }

        let mut request = self.http.get(source_url);
        if let Some(referer) = &self.referer {
            request = request.header("referer", referer);
        }
        let mut response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transfer {
                url: source_url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::filesystem(parent, e))?;
        }

        let partial = partial_path(destination);
        let bytes = match stream_to_file(&mut response, &partial).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        let path = unique_path(destination).await?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| Error::filesystem(&path, e))?;

        tracing::info!(path = %path.display(), bytes, "wrote artifact");
        Ok(WriteOutcome::Written { path, bytes })
    }
}

async fn stream_to_file(response: &mut reqwest::Response, partial: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(partial)
        .await
        .map_err(|e| Error::filesystem(partial, e))?;

    let mut bytes = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::filesystem(partial, e))?;
        bytes += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| Error::filesystem(partial, e))?;
    Ok(bytes)
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// First free path among `path`, `stem (1).ext`, `stem (2).ext`, ...
async fn unique_path(path: &Path) -> Result<PathBuf> {
    if !file_exists(path).await {
        return Ok(path.to_path_buf());
    }

    let invalid = |reason: &str| Error::filesystem(path, std::io::Error::other(reason.to_string()));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid("cannot extract file stem"))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path
        .parent()
        .ok_or_else(|| invalid("cannot extract parent directory"))?;

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{stem} ({i}).{ext}"),
            None => format!("{stem} ({i})"),
        };
        let candidate = parent.join(new_name);
        if !file_exists(&candidate).await {
            return Ok(candidate);
        }
    }

    Err(invalid("no free file name left"))
}
