use std::collections::HashMap;
use std::env;

use log::debug;

use crate::shell::status::ExitStatus;

/// The expansion context: exported variables (handed to children), shell-local
/// variables that shadow them, and the special parameters `$?` and `$$`.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    exported: HashMap<String, String>,
    local_vars: HashMap<String, String>,
    last_status: String,
    shell_pid: String,
}

impl Variables {
    /// A context seeded from the process environment.
    pub fn from_env() -> Self {
        Self::with_exported(env::vars())
    }

    pub fn with_exported(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            exported: vars.into_iter().collect(),
            local_vars: HashMap::new(),
            last_status: "0".to_string(),
            shell_pid: std::process::id().to_string(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "?" => Some(&self.last_status),
            "$" => Some(&self.shell_pid),
            _ => self
                .local_vars
                .get(name)
                .or_else(|| self.exported.get(name))
                .map(String::as_str),
        }
    }

    /// Sets a variable; an already exported name stays exported.
    pub fn set(&mut self, name: String, value: String) {
        if let Some(slot) = self.exported.get_mut(&name) {
            debug!("更新环境变量: {}={}", name, value);
            *slot = value;
            self.local_vars.remove(&name);
        } else {
            debug!("设置局部变量: {}={}", name, value);
            self.local_vars.insert(name, value);
        }
    }

    /// Marks a variable for export, moving an existing local value over.
    pub fn export(&mut self, name: String, value: Option<String>) {
        let value = value
            .or_else(|| self.local_vars.remove(&name))
            .or_else(|| self.exported.get(&name).cloned())
            .unwrap_or_default();
        self.local_vars.remove(&name);
        debug!("导出环境变量: {}={}", name, value);
        self.exported.insert(name, value);
    }

    pub fn unset(&mut self, name: &str) {
        self.local_vars.remove(name);
        self.exported.remove(name);
    }

    /// The environment a child process starts with.
    pub fn exported(&self) -> &HashMap<String, String> {
        &self.exported
    }

    pub fn set_last_status(&mut self, status: ExitStatus) {
        self.last_status = status.code().to_string();
    }
}

/// `NAME=value`, as accepted on its own or in front of a command.
pub fn parse_assignment(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once('=')?;
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    valid.then_some((name, value))
}
