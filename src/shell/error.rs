use std::io;

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A redirection target could not be opened.
    #[error("{reason}: {path}")]
    Execution { path: String, reason: String },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("{program}: {}", describe_io_error(.source))]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Sys(#[from] nix::Error),
}

impl ShellError {
    pub fn syntax(message: impl Into<String>) -> Self {
        ShellError::Syntax(message.into())
    }

    pub fn execution(path: &str, err: &io::Error) -> Self {
        ShellError::Execution {
            path: path.to_string(),
            reason: describe_io_error(err),
        }
    }

    /// Status a stage reports when it fails with this error.
    pub fn status_code(&self) -> i32 {
        match self {
            ShellError::Syntax(_) => 2,
            ShellError::CommandNotFound(_) => 127,
            ShellError::Spawn { .. } => 126,
            _ => 1,
        }
    }
}

/// Shell wording for the errno values users hit most often.
pub fn describe_io_error(err: &io::Error) -> String {
    match err.raw_os_error().map(Errno::from_raw) {
        Some(Errno::ENOENT) => "no such file or directory".to_string(),
        Some(Errno::EACCES) | Some(Errno::EPERM) => "permission denied".to_string(),
        Some(Errno::EISDIR) => "is a directory".to_string(),
        Some(Errno::ENOTDIR) => "not a directory".to_string(),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_message_uses_shell_wording() {
        let err = io::Error::from_raw_os_error(Errno::ENOENT as i32);
        let shell_err = ShellError::execution("missing.txt", &err);
        assert_eq!(shell_err.to_string(), "no such file or directory: missing.txt");
        assert_eq!(shell_err.status_code(), 1);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ShellError::CommandNotFound("nope".into()).status_code(), 127);
        let spawn = ShellError::Spawn {
            program: "./script".into(),
            source: io::Error::from_raw_os_error(Errno::EACCES as i32),
        };
        assert_eq!(spawn.status_code(), 126);
        assert_eq!(spawn.to_string(), "./script: permission denied");
    }
}
