pub mod config;
pub mod deploy;
pub mod error;
pub mod github;
pub mod server;
pub mod webhooks;

pub use error::{ClassificationError, PreviewError};
