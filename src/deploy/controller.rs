//! Deployment and teardown of per-repository preview environments.
//!
//! Every step that touches a workspace runs under that repository's lock, so a
//! checkout can never interleave with a concurrent teardown's delete, and two
//! updates for the same repository run one after the other.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::deploy::process::{CommandRunner, ProcessInvocation, ProcessOutput};
use crate::deploy::workspace::{validate_branch_name, Workspaces};
use crate::error::{ClassificationError, PreviewError};
use crate::github::client::{AccessToken, GitHubApi};
use crate::github::notifier::{self, CommentTarget, Notifier};
use crate::webhooks::events::{EventKind, WebhookEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub url: String,
    pub workspace: PathBuf,
    /// `true` when the workspace was cloned fresh rather than fetched.
    pub cloned: bool,
}

#[derive(Debug)]
pub struct TeardownReport {
    pub workspace: PathBuf,
    /// `false` when there was nothing to tear down.
    pub workspace_existed: bool,
    /// Orchestration failure from step one. Removal still went ahead.
    pub environment_error: Option<PreviewError>,
}

#[derive(Debug)]
pub enum Dispatched {
    Deployed(DeployOutcome),
    TornDown(TeardownReport),
    Ignored,
}

pub struct PreviewController {
    config: Arc<AppConfig>,
    github: Arc<dyn GitHubApi>,
    notifier: Notifier,
    runner: Arc<dyn CommandRunner>,
    workspaces: Workspaces,
}

impl PreviewController {
    pub fn new(
        config: Arc<AppConfig>,
        github: Arc<dyn GitHubApi>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let workspaces = Workspaces::new(config.workspace_root.clone());
        Self {
            notifier: Notifier::new(Arc::clone(&github)),
            config,
            github,
            runner,
            workspaces,
        }
    }

    pub fn workspaces(&self) -> &Workspaces {
        &self.workspaces
    }

    /// Routes a classified event to the matching controller.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<Dispatched, PreviewError> {
        match event.kind {
            EventKind::Opened => self.deploy(event).await.map(Dispatched::Deployed),
            EventKind::Closed => self.teardown(event).await.map(Dispatched::TornDown),
            EventKind::Unknown => {
                info!(action = %event.action, "ignoring pull request action");
                Ok(Dispatched::Ignored)
            }
        }
    }

    /// Brings the preview for `event.head_branch` up, cloning or refreshing
    /// the repository's workspace first.
    ///
    /// Safe to repeat: a second call fetches, force-checks-out and restarts
    /// the environment in the same directory.
    pub async fn deploy(&self, event: &WebhookEvent) -> Result<DeployOutcome, PreviewError> {
        let installation_id = event
            .installation_id
            .ok_or(ClassificationError::MissingInstallation)?;
        validate_branch_name(&event.head_branch)?;
        let path = self.workspaces.path_for(&event.repo_name)?;

        info!(
            repo = %event.repo_name,
            branch = %event.head_branch,
            pr = event.pull_request_number,
            "deploying preview"
        );

        let token = self.github.installation_token(installation_id).await.map_err(|e| {
            error!(repo = %event.repo_name, error = %e, "could not acquire installation token");
            e
        })?;

        let target = CommentTarget {
            owner: &event.repo_owner,
            repo: &event.repo_name,
            number: event.pull_request_number,
        };

        let guard = self.workspaces.lock(&event.repo_name).await;

        let cloned = self
            .sync_workspace(&path, &event.repo_owner, &event.repo_name, &token)
            .await?;
        self.checkout(&path, &event.head_branch).await?;

        self.notifier
            .post_comment_logged(target, &token, notifier::DEPLOYMENT_STARTED)
            .await;

        if let Err(e) = self.compose_up(&path).await {
            drop(guard);
            error!(repo = %event.repo_name, branch = %event.head_branch, error = %e, "environment failed to start");
            self.notifier
                .post_comment_logged(target, &token, &notifier::deployment_failed(&e.to_string()))
                .await;
            return Err(e);
        }
        drop(guard);

        let url = self.config.preview_url(&event.head_branch);
        info!(repo = %event.repo_name, branch = %event.head_branch, url = %url, "preview is up");

        self.notifier
            .post_comment_logged(target, &token, &notifier::deployment_complete(&url))
            .await;

        Ok(DeployOutcome {
            url,
            workspace: path,
            cloned,
        })
    }

    /// Stops the environment and removes the workspace.
    ///
    /// Orchestration failure does not stop directory removal; it is logged and
    /// returned in the report.
    pub async fn teardown(&self, event: &WebhookEvent) -> Result<TeardownReport, PreviewError> {
        let path = self.workspaces.path_for(&event.repo_name)?;
        let guard = self.workspaces.lock(&event.repo_name).await;
        let report = self.remove_workspace(event, path).await;
        drop(guard);
        self.workspaces.forget(&event.repo_name);
        report
    }

    async fn remove_workspace(
        &self,
        event: &WebhookEvent,
        path: PathBuf,
    ) -> Result<TeardownReport, PreviewError> {
        if !exists(&path).await {
            info!(repo = %event.repo_name, "no workspace to tear down");
            return Ok(TeardownReport {
                workspace: path,
                workspace_existed: false,
                environment_error: None,
            });
        }

        info!(repo = %event.repo_name, pr = event.pull_request_number, "tearing down preview");

        let environment_error = match self.compose_down(&path).await {
            Ok(_) => None,
            Err(e) => {
                warn!(repo = %event.repo_name, error = %e, "environment teardown failed, removing workspace anyway");
                Some(e)
            }
        };

        tokio::fs::remove_dir_all(&path).await.map_err(|e| {
            let err = PreviewError::FilesystemError(format!(
                "Failed to remove workspace {}: {}",
                path.display(),
                e
            ));
            error!(repo = %event.repo_name, error = %err, "workspace removal failed");
            err
        })?;

        info!(repo = %event.repo_name, "workspace removed");
        Ok(TeardownReport {
            workspace: path,
            workspace_existed: true,
            environment_error,
        })
    }

    /// Clones into `path` or fetches into the existing checkout. Returns
    /// whether a clone happened.
    async fn sync_workspace(
        &self,
        path: &Path,
        owner: &str,
        repo: &str,
        token: &AccessToken,
    ) -> Result<bool, PreviewError> {
        if exists(&path.join(".git")).await {
            let fetch = self
                .git_authenticated(token)
                .args(["fetch", "--prune", "origin"])
                .current_dir(path);
            self.run_checked(fetch, "git fetch", PreviewError::SourceControlError)
                .await?;
            return Ok(false);
        }

        if exists(path).await {
            warn!(workspace = %path.display(), "removing workspace without a git checkout");
            tokio::fs::remove_dir_all(path).await.map_err(|e| {
                PreviewError::FilesystemError(format!(
                    "Failed to clear stale workspace {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }

        let root = self.workspaces.root();
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            PreviewError::FilesystemError(format!(
                "Failed to create workspace root {}: {}",
                root.display(),
                e
            ))
        })?;

        let url = format!("{}/{}/{}.git", self.config.github_clone_base, owner, repo);
        let clone = self
            .git_authenticated(token)
            .arg("clone")
            .arg(url)
            .arg(repo)
            .current_dir(root);
        self.run_checked(clone, "git clone", PreviewError::SourceControlError)
            .await?;
        Ok(true)
    }

    async fn checkout(&self, path: &Path, branch: &str) -> Result<(), PreviewError> {
        let checkout = ProcessInvocation::new(&self.config.git_command)
            .args(["checkout", "--force", "-B"])
            .arg(branch)
            .arg(format!("origin/{}", branch))
            .current_dir(path);
        self.run_checked(checkout, "git checkout", PreviewError::SourceControlError)
            .await
            .map(|_| ())
    }

    async fn compose_up(&self, path: &Path) -> Result<(), PreviewError> {
        let up = self
            .compose()
            .args(["up", "-d", "--build"])
            .current_dir(path);
        self.run_checked(up, "compose up", PreviewError::EnvironmentError)
            .await
            .map(|_| ())
    }

    async fn compose_down(&self, path: &Path) -> Result<(), PreviewError> {
        let down = self
            .compose()
            .args(["down", "-v", "--rmi", "all", "--remove-orphans"])
            .current_dir(path);
        self.run_checked(down, "compose down", PreviewError::EnvironmentError)
            .await
            .map(|_| ())
    }

    /// `COMPOSE_COMMAND` may be two words (`docker compose`).
    fn compose(&self) -> ProcessInvocation {
        let mut parts = self.config.compose_command.split_whitespace();
        let program = parts.next().unwrap_or("docker-compose");
        ProcessInvocation::new(program).args(parts)
    }

    /// Git with the installation token passed as a one-shot HTTP header, so it
    /// never lands in the workspace's git config.
    fn git_authenticated(&self, token: &AccessToken) -> ProcessInvocation {
        let credentials = BASE64.encode(format!("x-access-token:{}", token.secret()));
        ProcessInvocation::new(&self.config.git_command)
            .arg("-c")
            .arg(format!("http.extraHeader=AUTHORIZATION: basic {}", credentials))
            .redacted()
    }

    async fn run_checked(
        &self,
        invocation: ProcessInvocation,
        step: &str,
        failure: fn(String) -> PreviewError,
    ) -> Result<ProcessOutput, PreviewError> {
        let output = match self.runner.run(&invocation).await {
            Ok(output) => output,
            Err(PreviewError::EnvironmentError(msg)) => return Err(failure(msg)),
            Err(e) => return Err(e),
        };
        if !output.success() {
            return Err(failure(exit_failure(step, &output)));
        }
        Ok(output)
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// `"git clone exited with 128: fatal: ..."`, or `"... exited with signal"`
/// when the process was killed.
fn exit_failure(step: &str, output: &ProcessOutput) -> String {
    let status = output
        .exit_code
        .map_or_else(|| "signal".to_string(), |code| code.to_string());
    match output.stderr.trim() {
        "" => format!("{} exited with {}", step, status),
        stderr => format!("{} exited with {}: {}", step, status, stderr),
    }
}
