//! In-memory fakes for the platform seams (testing only)
//!
//! Provides `MemoryIssueComments`, which satisfies the [`IssueComments`]
//! contract without network access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};
use crate::github::{IssueComment, IssueComments};

// ---------------------------------------------------------------------------
// MemoryIssueComments
// ---------------------------------------------------------------------------

/// In-memory comment store keyed by issue number.
#[derive(Debug)]
pub struct MemoryIssueComments {
    comments: Mutex<HashMap<u64, Vec<IssueComment>>>,
    next_id: AtomicU64,
    creates: AtomicUsize,
    updates: AtomicUsize,
    unauthorized: bool,
}

impl Default for MemoryIssueComments {
    fn default() -> Self {
        Self {
            comments: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            unauthorized: false,
        }
    }
}

impl MemoryIssueComments {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every call like a revoked token would.
    pub fn unauthorized() -> Self {
        Self {
            unauthorized: true,
            ..Self::default()
        }
    }

    /// Insert a comment directly, bypassing call counters. Returns its id.
    pub fn seed(&self, issue_number: u64, body: &str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.comments
            .lock()
            .unwrap()
            .entry(issue_number)
            .or_default()
            .push(IssueComment {
                id,
                body: Some(body.to_string()),
                html_url: None,
            });
        id
    }

    /// Comments on `issue_number`, oldest first.
    pub fn comments_on(&self, issue_number: u64) -> Vec<IssueComment> {
        self.comments
            .lock()
            .unwrap()
            .get(&issue_number)
            .cloned()
            .unwrap_or_default()
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn check_auth(&self) -> Result<()> {
        if self.unauthorized {
            Err(PipelineError::GitHubUnauthorized { status: 401 })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IssueComments for MemoryIssueComments {
    async fn list_comments(&self, issue_number: u64) -> Result<Vec<IssueComment>> {
        self.check_auth()?;
        Ok(self.comments_on(issue_number))
    }

    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<IssueComment> {
        self.check_auth()?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = self.seed(issue_number, body);
        Ok(IssueComment {
            id,
            body: Some(body.to_string()),
            html_url: None,
        })
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<IssueComment> {
        self.check_auth()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut comments = self.comments.lock().unwrap();
        let comment = comments
            .values_mut()
            .flat_map(|list| list.iter_mut())
            .find(|c| c.id == comment_id)
            .ok_or_else(|| PipelineError::GitHubApi {
                status: 404,
                message: "Not Found".to_string(),
            })?;
        comment.body = Some(body.to_string());
        Ok(comment.clone())
    }
}
