use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::shell::error::ShellError;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Operator {
    Pipe,           // |
    RedirectIn,     // <
    RedirectOut,    // >
    RedirectAppend, // >>
    Background,     // &
    Sequence,       // ;
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operator::Pipe => "|",
            Operator::RedirectIn => "<",
            Operator::RedirectOut => ">",
            Operator::RedirectAppend => ">>",
            Operator::Background => "&",
            Operator::Sequence => ";",
        };
        f.write_str(text)
    }
}

/// How a piece of a word was written on the command line.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Quoting {
    Unquoted,
    Single,
    Double,
    /// A single character preceded by an unquoted backslash.
    Escaped,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum WordPart {
    Literal { text: String, quoting: Quoting },
    /// `$NAME`, `${NAME}`, `$?` or `$$`; `quoted` is set inside double quotes.
    Variable { name: String, quoted: bool },
}

/// A lexed word that still carries its quoting, so the expander knows which
/// stages apply to each piece.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Word {
    parts: Vec<WordPart>,
}

impl Word {
    pub fn parts(&self) -> &[WordPart] {
        &self.parts
    }

    /// An unquoted word made of plain text.
    pub fn unquoted(text: &str) -> Self {
        Word {
            parts: vec![WordPart::Literal {
                text: text.to_string(),
                quoting: Quoting::Unquoted,
            }],
        }
    }

    /// A word whose whole text is single-quoted.
    #[cfg(test)]
    pub fn single_quoted(text: &str) -> Self {
        Word {
            parts: vec![WordPart::Literal {
                text: text.to_string(),
                quoting: Quoting::Single,
            }],
        }
    }

    fn literal_mut(&mut self, quoting: Quoting) -> &mut String {
        let reuse = matches!(
            self.parts.last(),
            Some(WordPart::Literal { quoting: q, .. }) if *q == quoting
        );
        if !reuse {
            self.parts.push(WordPart::Literal {
                text: String::new(),
                quoting,
            });
        }
        match self.parts.last_mut() {
            Some(WordPart::Literal { text, .. }) => text,
            _ => unreachable!("a literal part was just ensured"),
        }
    }

    fn push_char(&mut self, c: char, quoting: Quoting) {
        self.literal_mut(quoting).push(c);
    }

    fn push_variable(&mut self, name: String, quoted: bool) {
        self.parts.push(WordPart::Variable { name, quoted });
    }
}

impl fmt::Display for Word {
    /// Renders the word back in shell syntax with equivalent quoting.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                WordPart::Literal { text, quoting } => match quoting {
                    Quoting::Unquoted => f.write_str(text)?,
                    Quoting::Single => write!(f, "'{}'", text)?,
                    Quoting::Double => {
                        f.write_str("\"")?;
                        for c in text.chars() {
                            if matches!(c, '"' | '\\' | '$') {
                                f.write_str("\\")?;
                            }
                            write!(f, "{}", c)?;
                        }
                        f.write_str("\"")?;
                    }
                    Quoting::Escaped => {
                        for c in text.chars() {
                            write!(f, "\\{}", c)?;
                        }
                    }
                },
                WordPart::Variable { name, quoted: true } => write!(f, "\"${{{}}}\"", name)?,
                WordPart::Variable { name, quoted: false } => write!(f, "${{{}}}", name)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token<W = Word> {
    Word(W),
    /// `NAME=value` written unquoted in command position. Only the expander
    /// produces these; the lexer leaves every word a `Word`.
    Assignment(W),
    Operator(Operator),
}

impl Token<Word> {
    /// The same token with its word rendered as source text, for checking the
    /// structure of a line before anything is expanded.
    pub fn to_unexpanded(&self) -> Token<String> {
        match self {
            Token::Word(word) | Token::Assignment(word) => Token::Word(word.to_string()),
            Token::Operator(op) => Token::Operator(*op),
        }
    }
}

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.chars().peekable(),
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, ShellError> {
        self.skip_whitespace();

        let c = match self.peek_char() {
            None => return Ok(None),
            Some(c) => c,
        };
        let token = match c {
            '|' => {
                self.read_char();
                Token::Operator(Operator::Pipe)
            }
            ';' => {
                self.read_char();
                Token::Operator(Operator::Sequence)
            }
            '&' => {
                self.read_char();
                Token::Operator(Operator::Background)
            }
            '<' => {
                self.read_char();
                Token::Operator(Operator::RedirectIn)
            }
            '>' => {
                self.read_char();
                if self.peek_char() == Some('>') {
                    self.read_char();
                    Token::Operator(Operator::RedirectAppend)
                } else {
                    Token::Operator(Operator::RedirectOut)
                }
            }
            _ => Token::Word(self.read_word()?),
        };
        Ok(Some(token))
    }

    fn read_char(&mut self) -> Option<char> {
        self.input.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.read_char();
        }
    }

    fn read_word(&mut self) -> Result<Word, ShellError> {
        let mut word = Word::default();

        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || is_operator_char(c) {
                break;
            }
            self.read_char();
            match c {
                '\\' => match self.read_char() {
                    Some(next) => word.push_char(next, Quoting::Escaped),
                    // nothing left to escape
                    None => word.push_char('\\', Quoting::Unquoted),
                },
                '\'' => self.read_single_quoted(&mut word)?,
                '"' => self.read_double_quoted(&mut word)?,
                '$' => self.read_variable(&mut word, false)?,
                c => word.push_char(c, Quoting::Unquoted),
            }
        }

        Ok(word)
    }

    fn read_single_quoted(&mut self, word: &mut Word) -> Result<(), ShellError> {
        let text = word.literal_mut(Quoting::Single);
        loop {
            match self.input.next() {
                Some('\'') => return Ok(()),
                Some(c) => text.push(c),
                None => return Err(ShellError::syntax("unterminated single quote")),
            }
        }
    }

    fn read_double_quoted(&mut self, word: &mut Word) -> Result<(), ShellError> {
        word.literal_mut(Quoting::Double);
        loop {
            match self.read_char() {
                Some('"') => return Ok(()),
                Some('\\') => match self.peek_char() {
                    Some(next @ ('"' | '\\' | '$')) => {
                        self.read_char();
                        word.push_char(next, Quoting::Double);
                    }
                    _ => word.push_char('\\', Quoting::Double),
                },
                Some('$') => self.read_variable(word, true)?,
                Some(c) => word.push_char(c, Quoting::Double),
                None => return Err(ShellError::syntax("unterminated double quote")),
            }
        }
    }

    /// Reads what follows a `$`. A `$` that does not start a name stays literal.
    fn read_variable(&mut self, word: &mut Word, quoted: bool) -> Result<(), ShellError> {
        let literal_quoting = if quoted {
            Quoting::Double
        } else {
            Quoting::Unquoted
        };

        match self.peek_char() {
            Some('{') => {
                self.read_char();
                let mut name = String::new();
                loop {
                    match self.read_char() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(ShellError::syntax("bad substitution: missing '}'")),
                    }
                }
                if !is_valid_name(&name) {
                    return Err(ShellError::syntax(format!("bad substitution: ${{{}}}", name)));
                }
                word.push_variable(name, quoted);
            }
            Some(c @ ('?' | '$')) => {
                self.read_char();
                word.push_variable(c.to_string(), quoted);
            }
            Some(c) if c.is_ascii_digit() => {
                self.read_char();
                word.push_variable(c.to_string(), quoted);
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(c) = self.peek_char() {
                    if !(c.is_ascii_alphanumeric() || c == '_') {
                        break;
                    }
                    name.push(c);
                    self.read_char();
                }
                word.push_variable(name, quoted);
            }
            _ => word.push_char('$', literal_quoting),
        }
        Ok(())
    }
}

fn is_operator_char(c: char) -> bool {
    "|&;<>".contains(c)
}

fn is_valid_name(name: &str) -> bool {
    match name {
        "?" | "$" => true,
        _ => {
            let mut chars = name.chars();
            match chars.next() {
                Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                }
                Some(first) if first.is_ascii_digit() => chars.all(|c| c.is_ascii_digit()),
                _ => false,
            }
        }
    }
}

/// Splits a raw line into a flat token sequence.
pub fn tokenize(line: &str) -> Result<Vec<Token>, ShellError> {
    let mut lexer = Lexer::new(line);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}
