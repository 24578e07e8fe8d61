//! Shared fakes for controller and router tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use preview_app::config::AppConfig;
use preview_app::deploy::{CommandRunner, PreviewController, ProcessInvocation, ProcessOutput};
use preview_app::github::{AccessToken, GitHubApi};
use preview_app::webhooks::{EventKind, WebhookEvent};
use preview_app::PreviewError;

pub const TEST_SECRET: &str = "test-webhook-secret";
pub const TEST_TOKEN: &str = "ghs_test_installation_token";

pub fn test_config(workspace_root: &Path) -> AppConfig {
    let vars: HashMap<&str, String> = HashMap::from([
        ("GITHUB_APP_ID", "12345".to_string()),
        ("GITHUB_PRIVATE_KEY", "unused by fakes".to_string()),
        ("GITHUB_WEBHOOK_SECRET", TEST_SECRET.to_string()),
        ("DEPLOYMENT_URL", "https://preview.example.com".to_string()),
        ("WORKSPACE_ROOT", workspace_root.to_string_lossy().to_string()),
    ]);
    AppConfig::from_lookup(|name| vars.get(name).cloned()).expect("test config")
}

pub fn opened_event(branch: &str) -> WebhookEvent {
    WebhookEvent {
        kind: EventKind::Opened,
        action: "opened".to_string(),
        pull_request_number: 7,
        head_branch: branch.to_string(),
        repo_name: "demo".to_string(),
        repo_owner: "acme".to_string(),
        installation_id: Some(99),
    }
}

pub fn closed_event() -> WebhookEvent {
    WebhookEvent {
        kind: EventKind::Closed,
        action: "closed".to_string(),
        pull_request_number: 7,
        head_branch: "feature-x".to_string(),
        repo_name: "demo".to_string(),
        repo_owner: "acme".to_string(),
        installation_id: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedComment {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub body: String,
}

#[derive(Default)]
pub struct FakeGitHub {
    pub comments: Mutex<Vec<PostedComment>>,
    pub tokens_issued: AtomicUsize,
    pub fail_token: bool,
    pub fail_comments: bool,
}

impl FakeGitHub {
    pub fn comments(&self) -> Vec<PostedComment> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn installation_token(&self, installation_id: u64) -> Result<AccessToken, PreviewError> {
        if self.fail_token {
            return Err(PreviewError::AuthError(format!(
                "Unknown installation {}",
                installation_id
            )));
        }
        self.tokens_issued.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken::new(TEST_TOKEN))
    }

    async fn post_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        token: &AccessToken,
        body: &str,
    ) -> Result<(), PreviewError> {
        assert_eq!(token.secret(), TEST_TOKEN);
        if self.fail_comments {
            return Err(PreviewError::NotifyError("comments disabled".to_string()));
        }
        self.comments.lock().unwrap().push(PostedComment {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Records every invocation and simulates just enough of git to make the
/// controllers' filesystem checks meaningful: `clone` creates `<dir>/.git`.
#[derive(Default)]
pub struct FakeRunner {
    pub calls: Mutex<Vec<ProcessInvocation>>,
    /// Step labels in completion order; a delayed checkout logs a start and an end.
    pub steps: Mutex<Vec<String>>,
    pub failing_step: Option<&'static str>,
    /// Step whose runner call reports a timeout instead of an exit status.
    pub timing_out_step: Option<&'static str>,
    pub checkout_delay: Option<Duration>,
    pub checkout_started: Notify,
}

impl FakeRunner {
    pub fn failing(step: &'static str) -> Self {
        Self {
            failing_step: Some(step),
            ..Self::default()
        }
    }

    pub fn timing_out(step: &'static str) -> Self {
        Self {
            timing_out_step: Some(step),
            ..Self::default()
        }
    }

    pub fn with_checkout_delay(delay: Duration) -> Self {
        Self {
            checkout_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<ProcessInvocation> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, step: &str) {
        self.steps.lock().unwrap().push(step.to_string());
    }
}

pub fn step_of(invocation: &ProcessInvocation) -> &str {
    invocation
        .args
        .iter()
        .map(String::as_str)
        .find(|a| matches!(*a, "clone" | "fetch" | "checkout" | "up" | "down"))
        .unwrap_or("other")
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, invocation: &ProcessInvocation) -> Result<ProcessOutput, PreviewError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let step = step_of(invocation).to_string();

        if self.timing_out_step == Some(step.as_str()) {
            self.record(&step);
            return Err(PreviewError::TimeoutError(format!("{} timed out", invocation)));
        }

        if self.failing_step == Some(step.as_str()) {
            self.record(&step);
            return Ok(ProcessOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: format!("{} failed", step),
            });
        }

        match step.as_str() {
            "clone" => {
                let cwd = invocation.cwd.clone().expect("clone runs in the workspace root");
                let target = invocation.args.last().expect("clone target");
                std::fs::create_dir_all(cwd.join(target).join(".git")).unwrap();
                self.record("clone");
            }
            "checkout" => {
                if let Some(delay) = self.checkout_delay {
                    self.record("checkout-start");
                    self.checkout_started.notify_one();
                    tokio::time::sleep(delay).await;
                    self.record("checkout-end");
                } else {
                    self.record("checkout");
                }
            }
            other => self.record(other),
        }

        Ok(ProcessOutput {
            exit_code: Some(0),
            ..ProcessOutput::default()
        })
    }
}

pub fn controller(
    workspace_root: &Path,
    github: Arc<FakeGitHub>,
    runner: Arc<FakeRunner>,
) -> PreviewController {
    PreviewController::new(Arc::new(test_config(workspace_root)), github, runner)
}
