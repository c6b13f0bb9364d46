//! Session lifecycle: registry, run-cycle guard, confirmation loop and the
//! notification sink that connects a conversation to the client.

pub mod confirmation;
pub mod registry;
pub mod runner;
pub mod sink;
pub mod task_guard;

pub use registry::{RegistryConfig, SessionRegistry};
pub use runner::{run_prompt, run_with_confirmation, Confirmer, RunOutcome};
pub use sink::NotificationSink;
pub use task_guard::{RunningTask, TaskGuard, TaskOutcome};
