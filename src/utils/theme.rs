use colored::Colorize;
use rand::seq::SliceRandom;

use crate::shell::ExitStatus;

pub struct Theme {
    pub prompt: String,
    pub error_symbol: String,
    pub greetings: Vec<String>,
    pub exit_message: String,
    pub error_style: Box<dyn Fn(String) -> String>,
    pub success_style: Box<dyn Fn(String) -> String>,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            prompt: "forksh> ".bright_cyan().to_string(),
            error_symbol: "✗".red().to_string(),
            greetings: vec![
                "欢迎使用 forksh".to_string(),
                "forksh 已就绪, 输入 exit 退出".to_string(),
                "fork, exec, wait. 开始吧".to_string(),
            ],
            exit_message: "再见".to_string(),
            error_style: Box::new(|s| s.bright_red().to_string()),
            success_style: Box::new(|s| s.bright_green().to_string()),
        }
    }
}

impl Theme {
    pub fn load_theme(theme_name: &str) -> Theme {
        match theme_name {
            "dark" => Theme {
                prompt: "forksh ➤ ".bright_purple().to_string(),
                error_symbol: "✗".red().to_string(),
                greetings: vec![
                    "夜深了, 还在写管道吗".to_string(),
                    "forksh 在黑暗中等待命令".to_string(),
                ],
                exit_message: "晚安".to_string(),
                error_style: Box::new(|s| s.red().to_string()),
                success_style: Box::new(|s| s.magenta().to_string()),
            },
            _ => Theme::default(),
        }
    }

    /// Prompt for the next line; a failed last pipeline shows its status.
    pub fn prompt(&self, last_status: ExitStatus) -> String {
        if last_status.success() {
            self.prompt.clone()
        } else {
            format!(
                "{} {} {}",
                self.error_symbol,
                (self.error_style)(last_status.code().to_string()),
                self.prompt
            )
        }
    }

    pub fn welcome(&self) -> String {
        let greeting = self
            .greetings
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default();
        (self.success_style)(greeting)
    }

    pub fn goodbye(&self) -> String {
        (self.success_style)(self.exit_message.clone())
    }

    pub fn error(&self, message: &str) -> String {
        (self.error_style)(message.to_string())
    }
}
