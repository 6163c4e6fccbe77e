// GitHub contents API client

use async_trait::async_trait;
use reqwest::{header, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::UploadError;

pub const API_BASE: &str = "https://api.github.com";

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Body of a create-or-update file request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutFileRequest {
    pub message: String,
    /// Base64 file content.
    pub content: String,
    pub branch: String,
    /// Current blob hash; present only when updating an existing file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// Body of a repository metadata patch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
}

impl RepoPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.homepage.is_none()
    }
}

#[derive(Debug, Serialize)]
struct TopicsRequest<'a> {
    names: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ContentMetadata {
    #[serde(default)]
    sha: String,
}

/// Remote content API used by the uploader
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Blob hash of `path` on the branch, `None` when it does not exist.
    async fn fetch_sha(&self, path: &str) -> Result<Option<String>, UploadError>;

    async fn put_file(&self, path: &str, request: &PutFileRequest) -> Result<(), UploadError>;

    async fn set_topics(&self, topics: &[String]) -> Result<(), UploadError>;

    async fn patch_repo(&self, patch: &RepoPatch) -> Result<(), UploadError>;
}

pub struct GithubApi {
    client: reqwest::Client,
    base: Url,
    token: String,
    repo: String,
    branch: String,
}

impl GithubApi {
    pub fn new(token: &str, repo: &str, branch: &str) -> Result<Self, UploadError> {
        Self::with_base(API_BASE, token, repo, branch)
    }

    pub fn with_base(base: &str, token: &str, repo: &str, branch: &str) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()?;
        let base = Url::parse(base).map_err(|e| UploadError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            client,
            base,
            token: token.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
        })
    }

    /// `<base>/repos/<owner>/<name>/<extra...>`, each segment percent-encoded.
    fn repo_url<'a>(&self, extra: impl IntoIterator<Item = &'a str>) -> Result<Url, UploadError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| UploadError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty().push("repos");
            segments.extend(self.repo.split('/'));
            segments.extend(extra);
        }
        Ok(url)
    }

    fn contents_url(&self, path: &str) -> Result<Url, UploadError> {
        let path = path.replace('\\', "/");
        let segments = std::iter::once("contents").chain(path.split('/').filter(|s| !s.is_empty()));
        self.repo_url(segments)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/vnd.github+json")
    }
}

async fn ensure_status(
    response: reqwest::Response,
    accepted: &[StatusCode],
    context: &str,
) -> Result<(), UploadError> {
    let status = response.status();
    if accepted.contains(&status) {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(UploadError::Api {
        context: context.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ContentApi for GithubApi {
    async fn fetch_sha(&self, path: &str) -> Result<Option<String>, UploadError> {
        let mut url = self.contents_url(path)?;
        url.query_pairs_mut().append_pair("ref", &self.branch);

        // any failure here means "treat as new file"
        let response = match self.request(Method::GET, url).send().await {
            Ok(r) if r.status() == StatusCode::OK => r,
            Ok(r) => {
                debug!(path, status = %r.status(), "no existing file");
                return Ok(None);
            }
            Err(e) => {
                debug!(path, "sha lookup failed: {}", e);
                return Ok(None);
            }
        };
        match response.json::<ContentMetadata>().await {
            Ok(meta) if !meta.sha.is_empty() => Ok(Some(meta.sha)),
            _ => Ok(None),
        }
    }

    async fn put_file(&self, path: &str, request: &PutFileRequest) -> Result<(), UploadError> {
        let url = self.contents_url(path)?;
        let response = self.request(Method::PUT, url).json(request).send().await?;
        ensure_status(response, &[StatusCode::OK, StatusCode::CREATED], path).await
    }

    async fn set_topics(&self, topics: &[String]) -> Result<(), UploadError> {
        let url = self.repo_url(["topics"])?;
        let response = self
            .request(Method::PUT, url)
            .json(&TopicsRequest { names: topics })
            .send()
            .await?;
        ensure_status(response, &[StatusCode::OK, StatusCode::CREATED], "topics").await
    }

    async fn patch_repo(&self, patch: &RepoPatch) -> Result<(), UploadError> {
        if patch.is_empty() {
            return Ok(());
        }
        let url = self.repo_url(std::iter::empty())?;
        let response = self.request(Method::PATCH, url).json(patch).send().await?;
        ensure_status(response, &[StatusCode::OK], "repository metadata").await
    }
}
