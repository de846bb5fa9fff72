use log::debug;
use std::env;
use std::process;

use crate::shell::{Interpreter, Shell};
use crate::utils::config::Config;
use crate::utils::log::init_logger;
use crate::utils::theme::Theme;

mod shell;
mod utils;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new()?;
    init_logger(&config)?;
    debug!("配置加载成功, 历史文件 {}", config.history_file.display());

    let args: Vec<String> = env::args().skip(1).collect();
    let code = match args.as_slice() {
        [flag, line, ..] if flag == "-c" => {
            debug!("非交互模式: {}", line);
            let mut interpreter = Interpreter::new(shell::Variables::from_env());
            let status = interpreter.run_line(line);
            interpreter.exit_request().unwrap_or(status.code())
        }
        [flag] if flag == "-c" => {
            eprintln!("forksh: -c: option requires an argument");
            2
        }
        _ => {
            let theme = Theme::load_theme(&config.theme);
            let mut shell = Shell::new(&config, &theme)?;
            shell.run()?
        }
    };
    process::exit(code)
}
