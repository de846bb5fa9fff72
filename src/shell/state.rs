use crate::shell::executor::JobManager;
use crate::shell::status::ExitStatus;
use crate::shell::variables::Variables;

/// Everything a line can change in the shell process itself.
pub struct ShellState {
    pub vars: Variables,
    pub jobs: JobManager,
    pub last_status: ExitStatus,
    /// Set by `exit`; the loop stops once the current line is done.
    pub exit_request: Option<i32>,
}

impl ShellState {
    pub fn new(vars: Variables) -> Self {
        Self {
            vars,
            jobs: JobManager::new(),
            last_status: ExitStatus::SUCCESS,
            exit_request: None,
        }
    }

    pub fn set_last_status(&mut self, status: ExitStatus) {
        self.last_status = status;
        self.vars.set_last_status(status);
    }
}
