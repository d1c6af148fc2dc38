//! GitHub-backed manifest and artifact sync
//!
//! The manifest is the recursive git tree of a branch; only blobs under the
//! configured root directory are considered. Files are downloaded from the
//! raw content host.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::error::{RapidError, Result};
use crate::source::{ArtifactSync, Manifest, ManifestSource, is_relative_artifact, write_artifact};

/// Default GitHub REST API base URL
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default raw content base URL
pub const DEFAULT_RAW_URL: &str = "https://raw.githubusercontent.com";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Which repository, branch, and directory hold the worker scripts
#[derive(Debug, Clone)]
pub struct GithubTarget {
    pub api_url: String,
    pub raw_url: String,
    /// `owner/name`
    pub repo: String,
    pub branch: String,
    /// Directory prefix inside the repo, e.g. `applications/`
    pub root: String,
    /// Bearer token for private repositories and rate limits
    pub token: Option<String>,
}

impl GithubTarget {
    fn tree_url(&self) -> String {
        format!(
            "{}/repos/{}/git/trees/{}?recursive=1",
            self.api_url.trim_end_matches('/'),
            self.repo,
            self.branch
        )
    }

    fn raw_file_url(&self, file: &str) -> String {
        format!(
            "{}/{}/{}/{}{}",
            self.raw_url.trim_end_matches('/'),
            self.repo,
            self.branch,
            root_prefix(&self.root),
            file
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Directory prefix for `root`: no leading slash, exactly one trailing slash
///
/// An empty root selects the whole repository.
pub fn root_prefix(root: &str) -> String {
    let trimmed = root.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Turn a git tree listing into a manifest rooted at `root`
fn parse_tree(body: &str, root: &str, extension: &str) -> Result<Manifest> {
    let response: TreeResponse = serde_json::from_str(body)?;
    if response.truncated {
        log::warn!("GitHub tree listing was truncated; some applications may be missing");
    }

    let prefix = root_prefix(root);
    let files = response
        .tree
        .into_iter()
        .filter(|entry| entry.kind == "blob")
        .filter_map(|entry| entry.path.strip_prefix(prefix.as_str()).map(str::to_string))
        .filter(|path| {
            let safe = is_relative_artifact(path);
            if !safe {
                log::warn!("Ignoring manifest path outside the root: {}", path);
            }
            safe
        })
        .collect();

    Ok(Manifest::from_files(files, extension))
}

/// Manifest fetched from a repository tree
pub struct GithubManifest {
    client: Client,
    target: GithubTarget,
    extension: String,
}

impl GithubManifest {
    pub fn new(target: GithubTarget, extension: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            target,
            extension: extension.into(),
        })
    }
}

#[async_trait]
impl ManifestSource for GithubManifest {
    async fn fetch(&self) -> Result<Manifest> {
        let url = self.target.tree_url();
        let response = self
            .target
            .authorize(self.client.get(&url))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| RapidError::Manifest(format!("GET {}: {}", url, e)))?;

        if let Some(remaining) = response.headers().get("X-RateLimit-Remaining") {
            log::debug!("GitHub rate limit remaining: {:?}", remaining);
        }

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RapidError::Manifest(format!("GET {} returned {}: {}", url, status, body)));
        }

        parse_tree(&body, &self.target.root, &self.extension)
    }
}

/// Downloads application files from the raw content host
pub struct GithubSync {
    client: Client,
    target: GithubTarget,
    workdir: PathBuf,
}

impl GithubSync {
    pub fn new(target: GithubTarget, workdir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            target,
            workdir: workdir.into(),
        })
    }
}

#[async_trait]
impl ArtifactSync for GithubSync {
    async fn sync(&self, app: &str, manifest: &Manifest) -> Result<()> {
        for file in manifest.files_for(app) {
            let url = self.target.raw_file_url(file);
            log::info!("Downloading file: {}", file);

            let response = self
                .target
                .authorize(self.client.get(&url))
                .send()
                .await
                .map_err(|e| RapidError::Sync(format!("GET {}: {}", url, e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(RapidError::Sync(format!("GET {} returned {}", url, status)));
            }

            let body = response.bytes().await?;
            write_artifact(&self.workdir, file, &body).await?;
        }
        Ok(())
    }
}
