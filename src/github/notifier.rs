//! Pull-request status comments.
//!
//! Comment failures are logged and swallowed: a deployment never fails
//! because GitHub rejected a comment.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::PreviewError;
use crate::github::client::{AccessToken, GitHubApi};

pub const DEPLOYMENT_STARTED: &str = "Deployment started.";

pub fn deployment_complete(url: &str) -> String {
    format!("Deployment complete. Access the application at {}.", url)
}

pub fn deployment_failed(reason: &str) -> String {
    format!("Deployment failed: {}", reason)
}

/// Where a comment goes.
#[derive(Debug, Clone, Copy)]
pub struct CommentTarget<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    pub number: u64,
}

#[derive(Clone)]
pub struct Notifier {
    github: Arc<dyn GitHubApi>,
}

impl Notifier {
    pub fn new(github: Arc<dyn GitHubApi>) -> Self {
        Self { github }
    }

    /// Posts `text` and reports the outcome.
    pub async fn post_comment(
        &self,
        target: CommentTarget<'_>,
        token: &AccessToken,
        text: &str,
    ) -> Result<(), PreviewError> {
        self.github
            .post_issue_comment(target.owner, target.repo, target.number, token, text)
            .await?;
        info!(
            owner = %target.owner,
            repo = %target.repo,
            pr = target.number,
            "comment posted"
        );
        Ok(())
    }

    /// Like [`post_comment`](Self::post_comment) but only logs failures.
    pub async fn post_comment_logged(
        &self,
        target: CommentTarget<'_>,
        token: &AccessToken,
        text: &str,
    ) {
        if let Err(e) = self.post_comment(target, token, text).await {
            warn!(
                owner = %target.owner,
                repo = %target.repo,
                pr = target.number,
                error = %e,
                "failed to post comment"
            );
        }
    }
}
