use crate::error::{Result, TrendError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RepoType {
    #[default]
    Space,
    Dataset,
    Model,
}

impl RepoType {
    fn url_prefix(self) -> &'static str {
        match self {
            RepoType::Space => "spaces/",
            RepoType::Dataset => "datasets/",
            RepoType::Model => "",
        }
    }

    fn api_segment(self) -> &'static str {
        match self {
            RepoType::Space => "spaces",
            RepoType::Dataset => "datasets",
            RepoType::Model => "models",
        }
    }
}

/// A file inside a Hub repository, on one branch.
#[derive(Debug, Clone, PartialEq)]
pub struct HubTarget {
    pub repo_id: String,
    pub file: String,
    pub branch: String,
    pub repo_type: RepoType,
}

impl HubTarget {
    pub fn describe(&self) -> String {
        format!("{}/{} on branch {}", self.repo_id, self.file, self.branch)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub commit_oid: String,
}

pub struct HubClient {
    http: Client,
    endpoint: String,
    token: Option<String>,
}

impl HubClient {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("codetrend/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn resolve_url(&self, target: &HubTarget) -> String {
        format!(
            "{}/{}{}/resolve/{}/{}",
            self.endpoint,
            target.repo_type.url_prefix(),
            target.repo_id,
            encode_revision(&target.branch),
            target.file
        )
    }

    pub fn commit_url(&self, target: &HubTarget) -> String {
        format!(
            "{}/api/{}/{}/commit/{}",
            self.endpoint,
            target.repo_type.api_segment(),
            target.repo_id,
            encode_revision(&target.branch)
        )
    }

    /// Fetch the file's text; `None` when it does not exist yet.
    pub fn download(&self, target: &HubTarget) -> Result<Option<String>> {
        let url = self.resolve_url(target);
        debug!(%url, "downloading dataset");
        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response)?;
        Ok(Some(response.text()?))
    }

    /// Replace the file with `content` in a single commit.
    pub fn commit(&self, target: &HubTarget, content: &[u8], message: &str) -> Result<CommitResponse> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| TrendError::Auth("a Hub token is required to upload".to_string()))?;

        let header = json!({"key": "header", "value": {"summary": message, "description": ""}});
        let file = json!({
            "key": "file",
            "value": {"content": STANDARD.encode(content), "path": target.file, "encoding": "base64"}
        });
        let body = format!("{header}\n{file}\n");

        let url = self.commit_url(target);
        debug!(%url, bytes = content.len(), "committing dataset");
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()?;
        let response = check_status(response)?;
        Ok(response.json()?)
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(TrendError::Auth(format!("{status}: {}", message.trim())));
    }
    Err(TrendError::Hub {
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}

fn encode_revision(revision: &str) -> String {
    revision.replace('/', "%2F")
}

/// Explicit token first, then the token file written by `huggingface-cli login`.
pub fn resolve_token(explicit: Option<String>) -> Option<String> {
    explicit
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            let path = token_path()?;
            let token = std::fs::read_to_string(path).ok()?;
            Some(token.trim().to_string()).filter(|t| !t.is_empty())
        })
}

fn token_path() -> Option<PathBuf> {
    match std::env::var_os("HF_HOME") {
        Some(home) => Some(PathBuf::from(home).join("token")),
        None => dirs::home_dir().map(|h| h.join(".cache").join("huggingface").join("token")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn target(repo_type: RepoType, branch: &str) -> HubTarget {
        HubTarget {
            repo_id: "me/trends".to_string(),
            file: "data/metrics.csv".to_string(),
            branch: branch.to_string(),
            repo_type,
        }
    }

    #[test]
    fn builds_resolve_urls_per_repo_type() {
        let client = HubClient::new("https://hub.example/", None).unwrap();
        assert_eq!(
            client.resolve_url(&target(RepoType::Space, "main")),
            "https://hub.example/spaces/me/trends/resolve/main/data/metrics.csv"
        );
        assert_eq!(
            client.resolve_url(&target(RepoType::Model, "release/v1")),
            "https://hub.example/me/trends/resolve/release%2Fv1/data/metrics.csv"
        );
    }

    #[test]
    fn builds_commit_urls() {
        let client = HubClient::new(DEFAULT_ENDPOINT, None).unwrap();
        assert_eq!(
            client.commit_url(&target(RepoType::Dataset, "main")),
            "https://huggingface.co/api/datasets/me/trends/commit/main"
        );
    }

    #[test]
    fn commit_without_token_fails_before_network() {
        let client = HubClient::new(DEFAULT_ENDPOINT, None).unwrap();
        let err = client
            .commit(&target(RepoType::Space, "main"), b"date\n", "msg")
            .unwrap_err();
        assert!(matches!(err, TrendError::Auth(_)));
    }

    #[test]
    fn explicit_token_wins() {
        assert_eq!(resolve_token(Some("hf_abc".to_string())), Some("hf_abc".to_string()));
    }
}
