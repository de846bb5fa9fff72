pub mod builtins;
#[allow(clippy::module_inception)]
mod executor;
pub mod job_manager;
pub mod wiring;

pub use executor::Executor;
pub use job_manager::JobManager;
