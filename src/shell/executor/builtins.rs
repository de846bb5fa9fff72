use std::collections::HashMap;
use std::env;
use std::io::{self, Write};

use log::debug;

use crate::shell::error::describe_io_error;
use crate::shell::state::ShellState;
use crate::shell::variables::parse_assignment;
use crate::utils::path;

/// A command run inside the shell process. It gets the full argv and writes
/// to the stage's stdout; the returned code becomes the stage status.
pub type BuiltinFn = fn(&[String], &mut ShellState, &mut dyn Write) -> io::Result<i32>;

/// Name → handler table consulted before searching PATH.
pub struct Builtins {
    table: HashMap<&'static str, BuiltinFn>,
}

impl Default for Builtins {
    fn default() -> Self {
        let mut builtins = Self::empty();
        builtins.register("cd", builtin_cd);
        builtins.register("pwd", builtin_pwd);
        builtins.register("exit", builtin_exit);
        builtins.register("export", builtin_export);
        builtins.register("unset", builtin_unset);
        builtins.register("jobs", builtin_jobs);
        builtins
    }
}

impl Builtins {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, handler: BuiltinFn) {
        self.table.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.table.get(name).copied()
    }
}

fn invalid_input(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

fn builtin_cd(args: &[String], state: &mut ShellState, out: &mut dyn Write) -> io::Result<i32> {
    let target = match args.get(1).map(String::as_str) {
        None => state
            .vars
            .get("HOME")
            .map(str::to_string)
            .ok_or_else(|| invalid_input("HOME not set".to_string()))?,
        Some("-") => {
            let previous = state
                .vars
                .get("OLDPWD")
                .map(str::to_string)
                .ok_or_else(|| invalid_input("OLDPWD not set".to_string()))?;
            writeln!(out, "{}", previous)?;
            previous
        }
        Some(dir) => dir.to_string(),
    };

    let previous = path::current_dir();
    env::set_current_dir(&target)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", describe_io_error(&e), target)))?;
    debug!("切换目录: {} -> {}", previous, target);

    state.vars.set("OLDPWD".to_string(), previous);
    state.vars.set("PWD".to_string(), path::current_dir());
    Ok(0)
}

fn builtin_pwd(_args: &[String], _state: &mut ShellState, out: &mut dyn Write) -> io::Result<i32> {
    writeln!(out, "{}", path::current_dir())?;
    Ok(0)
}

fn builtin_exit(args: &[String], state: &mut ShellState, _out: &mut dyn Write) -> io::Result<i32> {
    let code = match args.get(1) {
        None => state.last_status.code(),
        Some(arg) => match arg.parse::<i32>() {
            Ok(code) => code & 0xff,
            Err(_) => {
                state.exit_request = Some(2);
                return Err(invalid_input(format!("{}: numeric argument required", arg)));
            }
        },
    };
    state.exit_request = Some(code);
    Ok(code)
}

fn builtin_export(args: &[String], state: &mut ShellState, out: &mut dyn Write) -> io::Result<i32> {
    if args.len() < 2 {
        let mut exported: Vec<_> = state.vars.exported().iter().collect();
        exported.sort();
        for (name, value) in exported {
            writeln!(out, "export {}={}", name, shell_words::quote(value))?;
        }
        return Ok(0);
    }

    let mut status = 0;
    for arg in &args[1..] {
        match parse_assignment(arg) {
            Some((name, value)) => state.vars.export(name.to_string(), Some(value.to_string())),
            None if is_name(arg) => state.vars.export(arg.clone(), None),
            None => {
                eprintln!("forksh: export: not a valid identifier: {}", arg);
                status = 1;
            }
        }
    }
    Ok(status)
}

fn builtin_unset(args: &[String], state: &mut ShellState, _out: &mut dyn Write) -> io::Result<i32> {
    for name in &args[1..] {
        state.vars.unset(name);
    }
    Ok(0)
}

fn builtin_jobs(_args: &[String], state: &mut ShellState, out: &mut dyn Write) -> io::Result<i32> {
    for job in state.jobs.get_jobs() {
        writeln!(out, "{}", job)?;
    }
    Ok(0)
}

fn is_name(word: &str) -> bool {
    parse_assignment(&format!("{}=", word)).is_some()
}
