pub mod events;
pub mod github;
pub mod signature;

pub use events::{classify, EventKind, WebhookEvent};
pub use signature::verify;
