use dotenv::dotenv;
use rustyline::EditMode;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

pub struct Config {
    pub name: String,
    pub theme: String,
    pub history_file: PathBuf,
    pub editor_mode: String,
    pub logger_level: String,
    pub logger_dir: PathBuf,
    pub logger_stderr: bool,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = Self::get_config_dir();
        Config {
            name: env!("CARGO_PKG_NAME").to_string(),
            theme: String::from("default"),
            history_file: config_dir.join(".forksh_history"),
            editor_mode: String::from("vi"),
            logger_level: String::from("info"),
            logger_dir: config_dir.join("logs"),
            logger_stderr: false,
        }
    }
}

impl Config {
    fn get_config_dir() -> PathBuf {
        if let Ok(home) = env::var("HOME") {
            PathBuf::from(home).join(".config/forksh")
        } else {
            env::temp_dir().join("forksh")
        }
    }

    pub fn new() -> io::Result<Self> {
        // 优先加载环境变量
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }

        let mut config = Config::default();
        config.apply(|key| env::var(key).ok());

        // 确保历史文件和日志目录存在
        if let Some(parent) = config.history_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&config.logger_dir)?;

        Ok(config)
    }

    /// Overrides defaults with whatever `lookup` finds for the `FORKSH_*` keys.
    fn apply(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(theme) = lookup("FORKSH_THEME") {
            self.theme = theme;
        }
        if let Some(editor) = lookup("FORKSH_EDITOR") {
            self.editor_mode = editor;
        }
        if let Some(history) = lookup("FORKSH_HISTORY") {
            self.history_file = PathBuf::from(history);
        }
        if let Some(level) = lookup("FORKSH_LOG_LEVEL") {
            self.logger_level = level;
        }
        if let Some(dir) = lookup("FORKSH_LOG_DIR") {
            self.logger_dir = PathBuf::from(dir);
        }
        self.logger_stderr = lookup("FORKSH_LOG_STDERR").is_some();
    }

    pub fn get_edit_mode(&self) -> EditMode {
        match self.editor_mode.to_lowercase().as_str() {
            "emacs" => EditMode::Emacs,
            _ => EditMode::Vi,
        }
    }
}
