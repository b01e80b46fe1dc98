//! Remote API boundary
//!
//! [`StudioApi`] is the set of calls the export pipeline needs from the
//! studio API. [`StudioClient`] implements it over `reqwest`, attaching the
//! bearer token, device id and a fresh browser token to every request. A
//! 401/403 answer clears the rejected token from the store, so the next run
//! asks for a fresh one instead of replaying it.

use crate::auth::{Credential, TokenStore};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::{Cursor, Page, Workspace};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Upper bound on workspace listing pages, in case the server ignores `page`
const MAX_WORKSPACE_PAGES: u32 = 100;

/// Result of one WAV status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WavFileStatus {
    /// The artifact is ready at this URL
    Ready(String),
    /// Conversion still running
    NotReady,
    /// Any other non-success response
    Error {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
}

/// Calls the export pipeline makes against the remote service
#[async_trait]
pub trait StudioApi: Send + Sync {
    /// Every workspace of the signed-in user
    async fn list_workspaces(&self) -> Result<Vec<Workspace>>;

    /// One page of a workspace's feed
    async fn fetch_page(
        &self,
        cursor: Option<&Cursor>,
        limit: u32,
        workspace_id: &str,
    ) -> Result<Page>;

    /// Ask the server to render a WAV for `clip_id`
    async fn initiate_conversion(&self, clip_id: &str) -> Result<()>;

    /// Query whether the WAV for `clip_id` is ready
    async fn wav_file_status(&self, clip_id: &str) -> Result<WavFileStatus>;
}

/// Feed request body
#[derive(Debug, Serialize)]
struct FeedRequest<'a> {
    cursor: Option<&'a Cursor>,
    limit: u32,
    filters: FeedFilters<'a>,
}

#[derive(Debug, Serialize)]
struct FeedFilters<'a> {
    disliked: &'static str,
    trashed: &'static str,
    stem: Presence,
    workspace: WorkspaceFilter<'a>,
}

#[derive(Debug, Serialize)]
struct Presence {
    presence: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceFilter<'a> {
    presence: &'static str,
    workspace_id: &'a str,
}

impl<'a> FeedRequest<'a> {
    fn new(cursor: Option<&'a Cursor>, limit: u32, workspace_id: &'a str) -> Self {
        Self {
            cursor,
            limit,
            filters: FeedFilters {
                disliked: "False",
                trashed: "False",
                stem: Presence { presence: "False" },
                workspace: WorkspaceFilter {
                    presence: "True",
                    workspace_id,
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkspacesResponse {
    #[serde(default)]
    projects: Vec<Workspace>,
    #[serde(default)]
    num_total_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WavFileResponse {
    #[serde(default)]
    wav_file_url: Option<String>,
}

/// Request carrying the credential it was signed with
struct AuthorizedRequest {
    builder: RequestBuilder,
    bearer_token: String,
}

impl AuthorizedRequest {
    fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.builder = self.builder.json(body);
        self
    }
}

/// `reqwest` implementation of [`StudioApi`]
#[derive(Clone)]
pub struct StudioClient {
    http: reqwest::Client,
    base_url: Url,
    origin: String,
    referer: String,
    tokens: TokenStore,
}

impl StudioClient {
    /// Client for the API described by `config`, authenticating through `tokens`
    pub fn new(config: &ApiConfig, tokens: TokenStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            http,
            base_url: Url::parse(&config.base_url)?,
            origin: config.origin.clone(),
            referer: config.referer.clone(),
            tokens,
        })
    }

    /// Underlying HTTP client, shared with the artifact writer
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Token store used for every request
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::config("api.base_url", "base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(&self, method: Method, url: Url) -> Result<AuthorizedRequest> {
        let Credential {
            bearer_token,
            device_id,
        } = self.tokens.get().await?;

        let builder = self
            .http
            .request(method, url)
            .bearer_auth(&bearer_token)
            .header("accept", "*/*")
            .header("browser-token", TokenStore::browser_token())
            .header("device-id", device_id)
            .header("cache-control", "no-cache")
            .header("pragma", "no-cache")
            .header("origin", &self.origin)
            .header("referer", &self.referer);
        Ok(AuthorizedRequest {
            builder,
            bearer_token,
        })
    }

    async fn send(&self, request: AuthorizedRequest, what: &str) -> Result<Response> {
        let response = request.builder.send().await?;
        let status = response.status();
        tracing::debug!(endpoint = what, status = status.as_u16(), "studio API response");
        if is_auth_failure(status) {
            match self.tokens.invalidate(&request.bearer_token).await {
                Ok(true) => tracing::warn!(endpoint = what, "stored token rejected and cleared"),
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "could not clear rejected token"),
            }
            return Err(Error::NotAuthenticated {
                reason: format!("HTTP {} from {what}; capture a fresh token", status.as_u16()),
            });
        }
        Ok(response)
    }

    async fn fetch_workspace_page(&self, page: u32) -> Result<WorkspacesResponse> {
        let mut url = self.endpoint(&["api", "project", "me"])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("sort", "created_at")
            .append_pair("show_trashed", "false");

        let response = self
            .send(self.request(Method::GET, url).await?, "workspaces")
            .await?;
        let response = ensure_success(response).await?;
        read_json(response).await
    }
}

#[async_trait]
impl StudioApi for StudioClient {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let mut workspaces: Vec<Workspace> = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=MAX_WORKSPACE_PAGES {
            let response = self.fetch_workspace_page(page).await?;
            let before = workspaces.len();
            for workspace in response.projects {
                if seen.insert(workspace.id.clone()) {
                    workspaces.push(workspace);
                }
            }

            let added = workspaces.len() - before;
            let reached_total = response
                .num_total_results
                .is_none_or(|total| workspaces.len() >= total);
            if added == 0 || reached_total {
                break;
            }
        }

        tracing::debug!(count = workspaces.len(), "listed workspaces");
        Ok(workspaces)
    }

    async fn fetch_page(
        &self,
        cursor: Option<&Cursor>,
        limit: u32,
        workspace_id: &str,
    ) -> Result<Page> {
        let url = self.endpoint(&["api", "feed", "v3"])?;
        let body = FeedRequest::new(cursor, limit, workspace_id);
        let request = self.request(Method::POST, url).await?.json(&body);

        let response = ensure_success(self.send(request, "feed").await?).await?;
        read_json(response).await
    }

    async fn initiate_conversion(&self, clip_id: &str) -> Result<()> {
        let url = self.endpoint(&["api", "gen", clip_id, "convert_wav", ""])?;
        let response = self
            .send(self.request(Method::POST, url).await?, "convert_wav")
            .await?;

        // 204 No Content is how the server usually accepts the request
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Error::ConversionInitiation {
            clip_id: clip_id.to_string(),
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }

    async fn wav_file_status(&self, clip_id: &str) -> Result<WavFileStatus> {
        let url = self.endpoint(&["api", "gen", clip_id, "wav_file", ""])?;
        let response = self
            .send(self.request(Method::GET, url).await?, "wav_file")
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(WavFileStatus::NotReady);
        }
        if !status.is_success() {
            return Ok(WavFileStatus::Error {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: WavFileResponse = read_json(response).await?;
        Ok(match body.wav_file_url {
            Some(url) if !url.is_empty() => WavFileStatus::Ready(url),
            _ => WavFileStatus::NotReady,
        })
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Decode a JSON body; a body that does not match is a serialization error
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(Error::RemoteApi {
        status: status.as_u16(),
        body: response.text().await.unwrap_or_default(),
    })
}
