use std::mem;

use super::ast::{Command, Pipeline, RedirectMode, Redirection};
use super::lexer::{Operator, Token};
use crate::shell::error::ShellError;
use crate::shell::variables::parse_assignment;

pub struct Parser<I: Iterator<Item = Token<String>>> {
    tokens: I,
    current_token: Option<Token<String>>,
    /// Expansion may leave a command without words; the structure was
    /// already checked on the unexpanded line.
    allow_empty: bool,
}

impl<I: Iterator<Item = Token<String>>> Parser<I> {
    pub fn new(tokens: impl IntoIterator<IntoIter = I>) -> Self {
        let mut tokens = tokens.into_iter();
        let current_token = tokens.next();
        Parser {
            tokens,
            current_token,
            allow_empty: false,
        }
    }

    pub fn allow_empty_commands(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    fn next_token(&mut self) {
        self.current_token = self.tokens.next();
    }

    pub fn parse_pipeline(&mut self) -> Result<Pipeline, ShellError> {
        if self.current_token.is_none() && !self.allow_empty {
            return Err(ShellError::syntax("empty command"));
        }

        let mut commands = Vec::new();
        let mut background = false;

        loop {
            commands.push(self.parse_simple_command()?);

            match self.current_token {
                Some(Token::Operator(Operator::Pipe)) => {
                    self.next_token();
                    if self.current_token.is_none() && !self.allow_empty {
                        return Err(ShellError::syntax("expected a command after '|'"));
                    }
                }
                Some(Token::Operator(Operator::Background)) => {
                    self.next_token();
                    background = true;
                    if let Some(token) = &self.current_token {
                        return Err(ShellError::syntax(format!(
                            "unexpected {} after '&'",
                            describe(token)
                        )));
                    }
                    break;
                }
                Some(Token::Operator(Operator::Sequence)) => {
                    return Err(ShellError::syntax("unexpected ';'"));
                }
                _ => break,
            }
        }

        Ok(Pipeline {
            commands,
            background,
        })
    }

    fn parse_simple_command(&mut self) -> Result<Command, ShellError> {
        let mut command = Command::default();

        loop {
            match &self.current_token {
                None | Some(Token::Operator(Operator::Pipe))
                | Some(Token::Operator(Operator::Background))
                | Some(Token::Operator(Operator::Sequence)) => break,
                Some(Token::Operator(op)) => {
                    let op = *op;
                    let mode = match op {
                        Operator::RedirectIn => RedirectMode::Input,
                        Operator::RedirectOut => RedirectMode::Output,
                        _ => RedirectMode::Append,
                    };
                    let redirection = self.parse_redirection(mode, op)?;
                    command.redirections.push(redirection);
                }
                Some(Token::Assignment(word)) => {
                    match parse_assignment(word) {
                        Some((name, value)) if command.argv.is_empty() => command
                            .assignments
                            .push((name.to_string(), value.to_string())),
                        _ => command.argv.push(word.clone()),
                    }
                    self.next_token();
                }
                Some(Token::Word(word)) => {
                    command.argv.push(word.clone());
                    self.next_token();
                }
            }
        }

        if command.argv.is_empty() && command.assignments.is_empty() && !self.allow_empty {
            return Err(match &self.current_token {
                Some(token) => {
                    ShellError::syntax(format!("expected a command before {}", describe(token)))
                }
                None => ShellError::syntax("expected a command"),
            });
        }
        Ok(command)
    }

    fn parse_redirection(
        &mut self,
        mode: RedirectMode,
        op: Operator,
    ) -> Result<Redirection, ShellError> {
        self.next_token(); // skip the operator

        match self.current_token.take() {
            Some(Token::Word(target)) | Some(Token::Assignment(target)) => {
                self.next_token();
                Ok(Redirection { mode, target })
            }
            other => Err(ShellError::syntax(format!(
                "expected a file name after '{}', found {}",
                op,
                other.as_ref().map(describe).unwrap_or_else(|| "end of line".into())
            ))),
        }
    }
}

fn describe(token: &Token<String>) -> String {
    match token {
        Token::Word(word) | Token::Assignment(word) => format!("'{}'", word),
        Token::Operator(op) => format!("'{}'", op),
    }
}

/// Builds a Pipeline from a token stream, rejecting commands with no words.
pub fn parse(tokens: impl IntoIterator<Item = Token<String>>) -> Result<Pipeline, ShellError> {
    Parser::new(tokens).parse_pipeline()
}

/// Builds a Pipeline from an expanded token stream of a line that already
/// passed [`parse`]. Commands whose words all expanded away stay in place
/// with an empty argv.
pub fn parse_expanded(
    tokens: impl IntoIterator<Item = Token<String>>,
) -> Result<Pipeline, ShellError> {
    Parser::new(tokens).allow_empty_commands().parse_pipeline()
}

/// Cuts a line at `;` into the token runs of its pipelines. One trailing `;`
/// is allowed; any other empty run is an error.
pub fn split_sequence<W>(tokens: Vec<Token<W>>) -> Result<Vec<Vec<Token<W>>>, ShellError> {
    let mut segments = Vec::new();
    let mut current = Vec::new();

    for token in tokens {
        match token {
            Token::Operator(Operator::Sequence) => {
                if current.is_empty() {
                    return Err(ShellError::syntax("unexpected ';'"));
                }
                segments.push(mem::take(&mut current));
            }
            token => current.push(token),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    Ok(segments)
}
