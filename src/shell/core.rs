use log::{debug, error, info};

use crate::shell::error::ShellError;
use crate::shell::executor::job_manager::Job;
use crate::shell::executor::Executor;
use crate::shell::expander::Expander;
use crate::shell::parser::lexer::{tokenize, Token};
use crate::shell::parser::{parse, parse_expanded, split_sequence};
use crate::shell::state::ShellState;
use crate::shell::status::ExitStatus;
use crate::shell::variables::Variables;

/// Lexer → Expander → Parser → Executor for whole input lines, independent of
/// where the lines come from.
pub struct Interpreter {
    executor: Executor,
    state: ShellState,
}

impl Interpreter {
    pub fn new(vars: Variables) -> Self {
        Self {
            executor: Executor::new(),
            state: ShellState::new(vars),
        }
    }

    /// Runs one line and returns the status of its last pipeline. A syntax
    /// error anywhere in the line stops it before anything runs.
    pub fn run_line(&mut self, line: &str) -> ExitStatus {
        debug!("执行命令: {}", line);
        let segments = match self.check(line) {
            Ok(segments) => segments,
            Err(err) => {
                error!("解析失败: {}", err);
                eprintln!("forksh: {}", err);
                let status = ExitStatus::Code(err.status_code());
                self.state.set_last_status(status);
                return status;
            }
        };

        let mut status = self.state.last_status;
        for segment in segments {
            status = match self.run_segment(segment) {
                Ok(status) => status,
                Err(err) => {
                    error!("执行失败: {}", err);
                    eprintln!("forksh: {}", err);
                    ExitStatus::Code(err.status_code())
                }
            };
            self.state.set_last_status(status);
            if self.state.exit_request.is_some() {
                info!("收到退出请求");
                break;
            }
        }
        status
    }

    /// Tokenizes the line and parses every segment on its unexpanded words.
    fn check(&self, line: &str) -> Result<Vec<Vec<Token>>, ShellError> {
        let tokens = tokenize(line)?;
        debug!("词法单元数量: {}", tokens.len());
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let segments = split_sequence(tokens)?;
        for segment in &segments {
            parse(segment.iter().map(Token::to_unexpanded))?;
        }
        Ok(segments)
    }

    fn run_segment(&mut self, segment: Vec<Token>) -> Result<ExitStatus, ShellError> {
        let tokens = Expander::new(&self.state.vars).expand_tokens(segment)?;
        let pipeline = parse_expanded(tokens)?;
        self.executor.execute(&pipeline, &mut self.state)
    }

    /// Background jobs that finished since the last call.
    pub fn reap_jobs(&mut self) -> Vec<Job> {
        self.state.jobs.reap()
    }

    pub fn exit_request(&self) -> Option<i32> {
        self.state.exit_request
    }

    pub fn last_status(&self) -> ExitStatus {
        self.state.last_status
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    fn interpreter() -> Interpreter {
        Interpreter::new(Variables::with_exported([(
            "PATH".to_string(),
            "/bin:/usr/bin".to_string(),
        )]))
    }

    #[test]
    fn test_assignment_visible_to_next_segment() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut shell = interpreter();
        let status = shell.run_line(&format!("A=5; echo $A > {}", out.display()));
        assert!(status.success());
        assert_eq!(fs::read_to_string(&out).unwrap(), "5\n");
    }

    #[test]
    fn test_last_status_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut shell = interpreter();
        shell.run_line(&format!("false; echo $? > {}", out.display()));
        assert_eq!(fs::read_to_string(&out).unwrap(), "1\n");
        assert!(shell.last_status().success());
    }

    #[test]
    fn test_syntax_error_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut shell = interpreter();
        let status = shell.run_line(&format!("echo hi > {}; | ls", out.display()));
        assert_eq!(status, ExitStatus::Code(2));
        assert!(!out.exists());

        assert_eq!(shell.run_line("echo 'open"), ExitStatus::Code(2));
        assert_eq!(shell.last_status(), ExitStatus::Code(2));
    }

    #[test]
    fn test_unset_variable_expands_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut shell = interpreter();
        shell.run_line(&format!("echo $UNSET_VAR end > {}", out.display()));
        assert_eq!(fs::read_to_string(&out).unwrap(), "end\n");
    }

    #[test]
    fn test_exit_stops_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut shell = interpreter();
        let status = shell.run_line(&format!("exit 3; echo late > {}", out.display()));
        assert_eq!(status, ExitStatus::Code(3));
        assert_eq!(shell.exit_request(), Some(3));
        assert!(!out.exists());
    }

    #[test]
    fn test_quoted_or_expanded_assignment_is_a_command() {
        let mut shell = interpreter();
        assert_eq!(shell.run_line("'A=1'"), ExitStatus::Code(127));
        assert_eq!(shell.state.vars.get("A"), None);

        assert_eq!(shell.run_line("V='B=2'; $V"), ExitStatus::Code(127));
        assert_eq!(shell.state.vars.get("V"), Some("B=2"));
        assert_eq!(shell.state.vars.get("B"), None);
    }

    #[test]
    fn test_command_expanding_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut shell = interpreter();
        shell.run_line("false");
        assert!(shell.run_line("$UNSET_VAR").success());

        let status = shell.run_line(&format!("$UNSET_VAR > {}", out.display()));
        assert!(status.success());
        assert_eq!(fs::read_to_string(&out).unwrap(), "");
    }

    #[test]
    fn test_exit_in_pipeline_does_not_end_the_shell() {
        let mut shell = interpreter();
        assert!(shell.run_line("exit 3 | cat").success());
        assert_eq!(shell.exit_request(), None);
    }

    #[test]
    fn test_blank_line_keeps_status() {
        let mut shell = interpreter();
        shell.run_line("false");
        assert_eq!(shell.run_line("   "), ExitStatus::Code(1));
    }
}
