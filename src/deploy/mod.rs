pub mod controller;
pub mod process;
pub mod workspace;

pub use controller::{DeployOutcome, Dispatched, PreviewController, TeardownReport};
pub use process::{CommandRunner, ProcessInvocation, ProcessOutput, SystemRunner};
pub use workspace::Workspaces;
