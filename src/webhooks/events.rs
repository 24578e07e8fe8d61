//! Turns an untrusted `pull_request` webhook body into a [`WebhookEvent`].

use serde_json::Value;

use crate::error::ClassificationError;

/// What the controllers should do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `opened` or `synchronize`: bring the preview up to date.
    Opened,
    /// `closed`: tear the preview down.
    Closed,
    /// Any other action. Acknowledged and dropped.
    Unknown,
}

impl EventKind {
    pub fn from_action(action: &str) -> Self {
        match action {
            "opened" | "synchronize" => EventKind::Opened,
            "closed" => EventKind::Closed,
            _ => EventKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub kind: EventKind,
    /// Raw action string, kept for logging.
    pub action: String,
    pub pull_request_number: u64,
    pub head_branch: String,
    pub repo_name: String,
    pub repo_owner: String,
    /// Always `Some` for [`EventKind::Opened`].
    pub installation_id: Option<u64>,
}

/// Parse and classify a raw body.
pub fn classify(raw_body: &[u8]) -> Result<WebhookEvent, ClassificationError> {
    let payload: Value = serde_json::from_slice(raw_body)
        .map_err(|e| ClassificationError::MalformedJson(e.to_string()))?;
    classify_value(&payload)
}

pub fn classify_value(payload: &Value) -> Result<WebhookEvent, ClassificationError> {
    let action = payload
        .get("action")
        .and_then(|v| v.as_str())
        .ok_or(ClassificationError::MissingAction)?;

    let pull_request = context_object(payload, "pull_request")?;
    let repository = context_object(payload, "repository")?;

    let kind = EventKind::from_action(action);

    let head_branch = pull_request
        .get("head")
        .and_then(|h| h.get("ref"))
        .and_then(|r| r.as_str());
    let repo_name = repository.get("name").and_then(|n| n.as_str());
    let repo_owner = repository
        .get("owner")
        .and_then(|o| o.get("login"))
        .and_then(|l| l.as_str());
    let pull_request_number = pull_request.get("number").and_then(|n| n.as_u64());
    let installation_id = installation_id(payload, repository);

    match kind {
        EventKind::Opened => Ok(WebhookEvent {
            kind,
            action: action.to_string(),
            pull_request_number: pull_request_number
                .ok_or(ClassificationError::MissingField("pull_request.number"))?,
            head_branch: head_branch
                .ok_or(ClassificationError::MissingField("pull_request.head.ref"))?
                .to_string(),
            repo_name: repo_name
                .ok_or(ClassificationError::MissingField("repository.name"))?
                .to_string(),
            repo_owner: repo_owner
                .ok_or(ClassificationError::MissingField("repository.owner.login"))?
                .to_string(),
            installation_id: Some(installation_id.ok_or(ClassificationError::MissingInstallation)?),
        }),
        EventKind::Closed => Ok(WebhookEvent {
            kind,
            action: action.to_string(),
            pull_request_number: pull_request_number.unwrap_or_default(),
            head_branch: head_branch.unwrap_or_default().to_string(),
            repo_name: repo_name
                .ok_or(ClassificationError::MissingField("repository.name"))?
                .to_string(),
            repo_owner: repo_owner.unwrap_or_default().to_string(),
            installation_id,
        }),
        EventKind::Unknown => Ok(WebhookEvent {
            kind,
            action: action.to_string(),
            pull_request_number: pull_request_number.unwrap_or_default(),
            head_branch: head_branch.unwrap_or_default().to_string(),
            repo_name: repo_name.unwrap_or_default().to_string(),
            repo_owner: repo_owner.unwrap_or_default().to_string(),
            installation_id,
        }),
    }
}

/// A context object must be present, non-null and non-empty.
fn context_object<'a>(
    payload: &'a Value,
    key: &str,
) -> Result<&'a serde_json::Map<String, Value>, ClassificationError> {
    payload
        .get(key)
        .and_then(|v| v.as_object())
        .filter(|o| !o.is_empty())
        .ok_or(ClassificationError::MissingContext)
}

/// The installation reference lives under `repository.installation` in
/// hand-built payloads and at the top level in GitHub App deliveries.
fn installation_id(payload: &Value, repository: &serde_json::Map<String, Value>) -> Option<u64> {
    let id_of = |installation: Option<&Value>| {
        installation
            .and_then(|i| i.get("id"))
            .and_then(|id| id.as_u64())
    };
    id_of(repository.get("installation")).or_else(|| id_of(payload.get("installation")))
}
