//! Pull-request comments on GitHub.
//!
//! [`IssueComments`] is the seam between the coverage pipeline and the
//! platform: [`GitHubClient`] talks to the REST API, and
//! [`crate::fakes::MemoryIssueComments`] keeps comments in memory for tests.

pub mod client;

pub use client::GitHubClient;

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A comment on an issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl IssueComment {
    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// Comment operations on pull requests (GitHub models them as issues).
#[async_trait]
pub trait IssueComments: Send + Sync {
    /// All comments on the issue, oldest first.
    async fn list_comments(&self, issue_number: u64) -> Result<Vec<IssueComment>>;

    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<IssueComment>;

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<IssueComment>;
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created { id: u64 },
    Updated { id: u64 },
    /// The existing comment already had this exact body.
    Unchanged { id: u64 },
}

impl UpsertOutcome {
    pub fn id(&self) -> u64 {
        match self {
            UpsertOutcome::Created { id }
            | UpsertOutcome::Updated { id }
            | UpsertOutcome::Unchanged { id } => *id,
        }
    }
}

/// Create the comment identified by `marker`, or edit it if present.
///
/// `body` must itself contain `marker` so a later run finds it again.
/// When several comments carry the marker, the oldest is edited.
pub async fn upsert_comment(
    comments: &dyn IssueComments,
    issue_number: u64,
    marker: &str,
    body: &str,
) -> Result<UpsertOutcome> {
    if marker.is_empty() || !body.contains(marker) {
        return Err(PipelineError::InvalidInput(
            "comment body must contain its identity marker".to_string(),
        ));
    }

    let existing = comments
        .list_comments(issue_number)
        .await?
        .into_iter()
        .find(|c| c.body().contains(marker));

    let outcome = match existing {
        Some(comment) if comment.body() == body => UpsertOutcome::Unchanged { id: comment.id },
        Some(comment) => {
            comments.update_comment(comment.id, body).await?;
            UpsertOutcome::Updated { id: comment.id }
        }
        None => {
            let created = comments.create_comment(issue_number, body).await?;
            UpsertOutcome::Created { id: created.id }
        }
    };

    info!(issue = issue_number, comment_id = outcome.id(), outcome = ?outcome, "Upserted comment");
    Ok(outcome)
}
