use std::path::PathBuf;

use log::{debug, error, warn};
pub use rustyline::error::ReadlineError;
use rustyline::{Config as RLConfig, DefaultEditor};

use crate::utils::config::Config;

const HISTORY_SIZE: usize = 1000;

/// What one prompt produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// Ctrl-C: the pending line is discarded.
    Interrupted,
    /// Ctrl-D on an empty line.
    Eof,
}

impl Input {
    fn from_readline(result: Result<String, ReadlineError>) -> Result<Self, ReadlineError> {
        match result {
            Ok(line) => Ok(Input::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Ok(Input::Eof),
            Err(err) => Err(err),
        }
    }
}

/// Line editing with a history file that survives between sessions.
/// Non-blank lines enter the history as they are read.
pub struct LineEditor {
    editor: DefaultEditor,
    history: PathBuf,
}

impl LineEditor {
    pub fn new(config: &Config) -> Result<Self, ReadlineError> {
        let rl_config = RLConfig::builder()
            .max_history_size(HISTORY_SIZE)?
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .auto_add_history(true)
            .edit_mode(config.get_edit_mode())
            .build();
        let editor = DefaultEditor::with_config(rl_config)
            .inspect_err(|err| error!("无法初始化 readline: {}", err))?;

        let mut line_editor = Self {
            editor,
            history: config.history_file.clone(),
        };
        line_editor.restore_history();
        Ok(line_editor)
    }

    fn restore_history(&mut self) {
        match self.editor.load_history(&self.history) {
            Ok(()) => debug!("历史记录加载成功: {}", self.history.display()),
            // 首次启动时历史文件还不存在
            Err(err) => warn!("无法加载历史记录 {}: {}", self.history.display(), err),
        }
    }

    pub fn read(&mut self, prompt: &str) -> Result<Input, ReadlineError> {
        Input::from_readline(self.editor.readline(prompt))
    }

    pub fn persist_history(&mut self) {
        if let Err(err) = self.editor.save_history(&self.history) {
            error!("保存历史记录失败 {}: {}", self.history.display(), err);
        }
    }
}
