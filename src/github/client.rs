use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PreviewError;

const USER_AGENT: &str = concat!("preview-app/", env!("CARGO_PKG_VERSION"));

/// Installation-scoped credential. Fetched per event, never persisted, and
/// never rendered by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// The two GitHub REST capabilities the controllers need.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn installation_token(&self, installation_id: u64) -> Result<AccessToken, PreviewError>;

    async fn post_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        token: &AccessToken,
        body: &str,
    ) -> Result<(), PreviewError>;
}

/// Claims for the GitHub App JWT.
#[derive(Debug, Serialize)]
struct Claims {
    iat: u64,
    exp: u64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
}

pub struct GitHubClient {
    app_id: u64,
    key: EncodingKey,
    api_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl GitHubClient {
    pub fn new(
        app_id: u64,
        private_key_pem: &str,
        api_url: &str,
        timeout: Duration,
    ) -> Result<Self, PreviewError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| PreviewError::ConfigError(format!("Invalid GitHub App private key: {}", e)))?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PreviewError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            app_id,
            key,
            api_url: api_url.trim_end_matches('/').to_string(),
            timeout,
            http,
        })
    }

    pub fn from_config(config: &crate::config::AppConfig) -> Result<Self, PreviewError> {
        Self::new(
            config.github_app_id,
            &config.github_private_key,
            &config.github_api_url,
            config.api_timeout,
        )
    }

    /// App JWT valid for ten minutes, backdated a minute for clock skew.
    fn app_jwt(&self) -> Result<String, PreviewError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PreviewError::AuthError(format!("System clock error: {}", e)))?
            .as_secs();
        let claims = Claims {
            iat: now.saturating_sub(60),
            exp: now + 10 * 60,
            iss: self.app_id.to_string(),
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| PreviewError::AuthError(format!("Failed to sign app JWT: {}", e)))
    }

    fn map_request_error(&self, what: &str, err: reqwest::Error) -> PreviewError {
        if err.is_timeout() {
            PreviewError::TimeoutError(format!("{} after {:?}", what, self.timeout))
        } else {
            PreviewError::AuthError(format!("{}: {}", what, err))
        }
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn installation_token(&self, installation_id: u64) -> Result<AccessToken, PreviewError> {
        let jwt = self.app_jwt()?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, installation_id
        );

        debug!(installation_id, "requesting installation token");

        let response = self
            .http
            .post(&url)
            .bearer_auth(jwt)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| self.map_request_error("Installation token request failed", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PreviewError::AuthError(format!(
                "Unknown installation {}",
                installation_id
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PreviewError::AuthError(format!(
                "Installation token request failed with status {}: {}",
                status, body
            )));
        }

        let parsed: InstallationTokenResponse = response
            .json()
            .await
            .map_err(|e| self.map_request_error("Malformed installation token response", e))?;

        info!(installation_id, "installation token acquired");
        Ok(AccessToken::new(parsed.token))
    }

    async fn post_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        token: &AccessToken,
        body: &str,
    ) -> Result<(), PreviewError> {
        let octocrab = Octocrab::builder()
            .personal_token(token.secret().to_string())
            .base_uri(self.api_url.as_str())
            .map_err(|e| PreviewError::NotifyError(format!("Invalid API URL: {}", e)))?
            .build()
            .map_err(|e| PreviewError::NotifyError(format!("Failed to create GitHub client: {}", e)))?;

        let issues = octocrab.issues(owner, repo);
        let request = issues.create_comment(number, body);
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(_comment)) => Ok(()),
            Ok(Err(e)) => Err(PreviewError::NotifyError(format!(
                "Failed to comment on {}/{}#{}: {}",
                owner, repo, number, e
            ))),
            Err(_) => Err(PreviewError::TimeoutError(format!(
                "Commenting on {}/{}#{} took longer than {:?}",
                owner, repo, number, self.timeout
            ))),
        }
    }
}
