use std::fmt;

use nix::sys::wait::WaitStatus;

/// How a command or pipeline finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    /// Terminated by the given signal number.
    Signaled(i32),
}

impl ExitStatus {
    pub const SUCCESS: ExitStatus = ExitStatus::Code(0);

    pub fn success(self) -> bool {
        self == ExitStatus::SUCCESS
    }

    /// The numeric status in `[0, 255]`, `128 + signal` for signaled exits.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Code(code) => code & 0xff,
            ExitStatus::Signaled(sig) => 128 + sig,
        }
    }

    /// Converts a terminal wait result; stops and continues are not terminal.
    pub fn from_wait(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(ExitStatus::Code(code)),
            WaitStatus::Signaled(_, sig, _core_dumped) => Some(ExitStatus::Signaled(sig as i32)),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit {}", code),
            ExitStatus::Signaled(sig) => write!(f, "signal {}", sig),
        }
    }
}
