mod core;
mod error;
mod executor;
mod expander;
mod parser;
mod readline;
#[allow(clippy::module_inception)]
mod shell;
mod signals;
mod state;
mod status;
mod variables;

pub use self::core::Interpreter;
pub use shell::Shell;
pub use status::ExitStatus;
pub use variables::Variables;
