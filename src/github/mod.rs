pub mod client;
pub mod notifier;

pub use client::{AccessToken, GitHubApi, GitHubClient};
pub use notifier::{CommentTarget, Notifier};
