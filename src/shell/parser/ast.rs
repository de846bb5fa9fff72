use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectMode {
    Input,  // <
    Output, // >
    Append, // >>
}

impl RedirectMode {
    /// Whether the redirection replaces the command's stdin rather than stdout.
    pub fn is_input(self) -> bool {
        self == RedirectMode::Input
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Redirection {
    pub mode: RedirectMode,
    pub target: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Command {
    /// Leading `NAME=value` words. Alone they set shell variables, in front
    /// of a program they only reach its environment.
    pub assignments: Vec<(String, String)>,
    /// `argv[0]` is the program name. May be empty once expansion removed
    /// every word.
    pub argv: Vec<String>,
    pub redirections: Vec<Redirection>,
}

impl Command {
    /// The redirection that decides where this command reads or writes; later
    /// ones override earlier ones of the same direction.
    pub fn effective_input(&self) -> Option<&Redirection> {
        self.redirections.iter().rev().find(|r| r.mode.is_input())
    }

    pub fn effective_output(&self) -> Option<&Redirection> {
        self.redirections.iter().rev().find(|r| !r.mode.is_input())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let assignments = self
            .assignments
            .iter()
            .map(|(name, value)| format!("{}={}", name, shell_words::quote(value)));
        let words: Vec<String> = assignments
            .chain(self.argv.iter().map(|arg| shell_words::quote(arg).into_owned()))
            .collect();
        f.write_str(&words.join(" "))?;
        for redirection in &self.redirections {
            let op = match redirection.mode {
                RedirectMode::Input => "<",
                RedirectMode::Output => ">",
                RedirectMode::Append => ">>",
            };
            write!(f, " {} {}", op, shell_words::quote(&redirection.target))?;
        }
        Ok(())
    }
}

/// Commands connected stdout-to-stdin, never empty once parsed.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    pub background: bool,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, command) in self.commands.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", command)?;
        }
        if self.background {
            f.write_str(" &")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_redirection_wins() {
        let command = Command {
            assignments: vec![],
            argv: vec!["cat".into()],
            redirections: vec![
                Redirection {
                    mode: RedirectMode::Output,
                    target: "a.txt".into(),
                },
                Redirection {
                    mode: RedirectMode::Input,
                    target: "in.txt".into(),
                },
                Redirection {
                    mode: RedirectMode::Append,
                    target: "b.txt".into(),
                },
            ],
        };
        assert_eq!(command.effective_output().map(|r| r.target.as_str()), Some("b.txt"));
        assert_eq!(command.effective_input().map(|r| r.target.as_str()), Some("in.txt"));
    }

    #[test]
    fn test_display_quotes_arguments() {
        let pipeline = Pipeline {
            commands: vec![
                Command {
                    assignments: vec![("LANG".into(), "C".into())],
                    argv: vec!["echo".into(), "hello world".into()],
                    redirections: vec![],
                },
                Command {
                    assignments: vec![],
                    argv: vec!["wc".into(), "-w".into()],
                    redirections: vec![Redirection {
                        mode: RedirectMode::Output,
                        target: "out.txt".into(),
                    }],
                },
            ],
            background: true,
        };
        assert_eq!(pipeline.to_string(), "LANG=C echo 'hello world' | wc -w > out.txt &");
    }
}
