use log::{debug, error, warn};
use std::error::Error;
use std::io::Write;

use crate::shell::core::Interpreter;
use crate::shell::executor::job_manager::JobStatus;
use crate::shell::readline::{Input, LineEditor};
use crate::shell::signals;
use crate::shell::variables::Variables;
use crate::utils::config::Config;
use crate::utils::theme::Theme;

/// The interactive loop: prompt, read a line, run it, report finished jobs.
pub struct Shell<'a> {
    theme: &'a Theme,
    editor: LineEditor,
    interpreter: Interpreter,
}

impl<'a> Shell<'a> {
    pub fn new(config: &'a Config, theme: &'a Theme) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            theme,
            editor: LineEditor::new(config)?,
            interpreter: Interpreter::new(Variables::from_env()),
        })
    }

    /// Returns the status the process should exit with.
    pub fn run(&mut self) -> Result<i32, Box<dyn Error>> {
        debug!("初始化 forksh...");

        // 忽略终端信号，如 Ctrl-C, Ctrl-\ 等
        signals::ignore_block_signals();

        println!("{}", self.theme.welcome());
        debug!("forksh 准备就绪...");

        let code = self.run_loop()?;
        self.editor.persist_history();

        debug!("退出 forksh, 状态 {}", code);
        Ok(code)
    }

    fn run_loop(&mut self) -> Result<i32, Box<dyn Error>> {
        loop {
            self.report_jobs();
            std::io::stdout().flush()?;
            let prompt = self.theme.prompt(self.interpreter.last_status());

            match self.editor.read(&prompt) {
                Ok(Input::Line(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.interpreter.run_line(&line);
                    if let Some(code) = self.interpreter.exit_request() {
                        println!("{}", self.theme.goodbye());
                        return Ok(code);
                    }
                }
                Ok(Input::Eof) => {
                    warn!("接收到 EOF 信号，退出 forksh...");
                    println!("{}", self.theme.goodbye());
                    return Ok(self.interpreter.last_status().code());
                }
                Ok(Input::Interrupted) => {
                    // Ctrl-C 丢弃当前输入
                    debug!("接收到中断信号...");
                }
                Err(err) => {
                    error!("发生错误: {}", err);
                    eprintln!("{}: {}", self.theme.error("forksh"), err);
                    return Err(err.into());
                }
            }
        }
    }

    fn report_jobs(&mut self) {
        for job in self.interpreter.reap_jobs() {
            let status = match job.status {
                JobStatus::Killed => "killed",
                _ => "done",
            };
            println!("[{}] {} {}", job.index, status, job.command);
        }
    }
}
