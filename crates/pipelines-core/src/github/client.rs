//! GitHub REST client for issue comments.

use super::{IssueComment, IssueComments};
use crate::config::GitHubConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const USER_AGENT: &str = concat!("ci-pipelines/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;
const MAX_PAGES: u32 = 100;

/// Authenticated client scoped to one repository.
pub struct GitHubClient {
    config: GitHubConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { config, http })
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.config.api_url, self.config.repository.owner, self.config.repository.name, path
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .bearer_auth(self.config.token.expose())
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PipelineError::GitHubUnauthorized {
                status: status.as_u16(),
            });
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(text);
        Err(PipelineError::GitHubApi {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl IssueComments for GitHubClient {
    async fn list_comments(&self, issue_number: u64) -> Result<Vec<IssueComment>> {
        let url = self.repo_url(&format!("/issues/{issue_number}/comments"));
        let mut comments = Vec::new();

        for page in 1..=MAX_PAGES {
            let request = self.http.get(&url).query(&[
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ]);
            let batch: Vec<IssueComment> = self.send(request).await?.json().await?;
            let fetched = batch.len();
            debug!(issue = issue_number, page, fetched, "Fetched comment page");

            comments.extend(batch);
            if fetched < PER_PAGE {
                break;
            }
        }

        Ok(comments)
    }

    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<IssueComment> {
        let url = self.repo_url(&format!("/issues/{issue_number}/comments"));
        let request = self.http.post(&url).json(&json!({ "body": body }));
        Ok(self.send(request).await?.json().await?)
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<IssueComment> {
        let url = self.repo_url(&format!("/issues/comments/{comment_id}"));
        let request = self.http.patch(&url).json(&json!({ "body": body }));
        Ok(self.send(request).await?.json().await?)
    }
}
