use std::mem;

use glob::{MatchOptions, Pattern};
use log::debug;
use nix::unistd::{getuid, User};

use crate::shell::error::ShellError;
use crate::shell::parser::lexer::{Operator, Quoting, Token, Word, WordPart};
use crate::shell::variables::{parse_assignment, Variables};

/// One output word under construction. `pattern` mirrors `text` with quoted
/// characters escaped, so only unquoted metacharacters take part in globbing.
#[derive(Default)]
struct Field {
    text: String,
    pattern: String,
    has_glob: bool,
    started: bool,
}

impl Field {
    fn push_quoted(&mut self, s: &str) {
        self.text.push_str(s);
        self.pattern.push_str(&Pattern::escape(s));
        self.started = true;
    }

    fn push_unquoted(&mut self, s: &str) {
        self.text.push_str(s);
        self.pattern.push_str(s);
        self.has_glob |= s.contains(['*', '?', '[']);
        self.started = true;
    }
}

/// Resolves words through tilde expansion, variable substitution, word
/// splitting and filename globbing, in that order.
pub struct Expander<'a> {
    vars: &'a Variables,
}

impl<'a> Expander<'a> {
    pub fn new(vars: &'a Variables) -> Self {
        Self { vars }
    }

    /// Expands one word into zero or more arguments.
    pub fn expand(&self, word: &Word) -> Vec<String> {
        let mut fields = Vec::new();
        let mut current = Field::default();

        for (i, part) in word.parts().iter().enumerate() {
            match part {
                WordPart::Literal {
                    text,
                    quoting: Quoting::Unquoted,
                } => {
                    let rest = if i == 0 {
                        self.expand_tilde(text, &mut current)
                    } else {
                        text.as_str()
                    };
                    if !rest.is_empty() {
                        current.push_unquoted(rest);
                    }
                }
                WordPart::Literal { text, .. } => current.push_quoted(text),
                WordPart::Variable { name, quoted: true } => {
                    current.push_quoted(self.vars.get(name).unwrap_or_default());
                }
                WordPart::Variable {
                    name,
                    quoted: false,
                } => {
                    let value = self.vars.get(name).unwrap_or_default();
                    // 未加引号的变量结果按空白拆分
                    for c in value.chars() {
                        if c.is_whitespace() {
                            if current.started {
                                fields.push(mem::take(&mut current));
                            }
                        } else {
                            let mut buf = [0u8; 4];
                            current.push_unquoted(c.encode_utf8(&mut buf));
                        }
                    }
                }
            }
        }
        if current.started {
            fields.push(current);
        }

        fields.into_iter().flat_map(glob_field).collect()
    }

    /// Expands every word of a token stream. A redirection target has to stay
    /// exactly one word. Unquoted `NAME=value` words in front of a command are
    /// emitted as assignments, with their value expanded but not split or
    /// globbed.
    pub fn expand_tokens(&self, tokens: Vec<Token>) -> Result<Vec<Token<String>>, ShellError> {
        let mut expanded = Vec::with_capacity(tokens.len());
        let mut after_redirect = false;
        let mut command_start = true;

        for token in tokens {
            match token {
                Token::Operator(op) => {
                    after_redirect = matches!(
                        op,
                        Operator::RedirectIn | Operator::RedirectOut | Operator::RedirectAppend
                    );
                    if op == Operator::Pipe {
                        command_start = true;
                    }
                    expanded.push(Token::Operator(op));
                }
                Token::Word(word) | Token::Assignment(word) => {
                    if after_redirect {
                        let mut fields = self.expand(&word);
                        if fields.len() != 1 {
                            return Err(ShellError::syntax(format!(
                                "ambiguous redirect: {}",
                                word
                            )));
                        }
                        after_redirect = false;
                        expanded.extend(fields.pop().map(Token::Word));
                        continue;
                    }
                    if command_start {
                        if let Some(assignment) = self.expand_assignment(&word) {
                            expanded.push(Token::Assignment(assignment));
                            continue;
                        }
                    }
                    command_start = false;
                    expanded.extend(self.expand(&word).into_iter().map(Token::Word));
                }
            }
        }
        debug!("展开后的词法单元: {:?}", expanded);
        Ok(expanded)
    }

    /// `NAME=value` when the word starts with an unquoted `NAME=`; quoting or
    /// a substitution before the `=` makes it an ordinary word.
    fn expand_assignment(&self, word: &Word) -> Option<String> {
        let (first, rest) = word.parts().split_first()?;
        let WordPart::Literal {
            text,
            quoting: Quoting::Unquoted,
        } = first
        else {
            return None;
        };
        let (name, head) = parse_assignment(text)?;

        let mut value = head.to_string();
        for part in rest {
            match part {
                WordPart::Literal { text, .. } => value.push_str(text),
                WordPart::Variable { name, .. } => {
                    value.push_str(self.vars.get(name).unwrap_or_default())
                }
            }
        }
        Some(format!("{}={}", name, value))
    }

    /// Handles a leading `~` or `~user`; returns the text left to process.
    fn expand_tilde<'t>(&self, text: &'t str, field: &mut Field) -> &'t str {
        if !text.starts_with('~') {
            return text;
        }
        let end = text.find('/').unwrap_or(text.len());
        let (prefix, rest) = text.split_at(end);

        let home = match &prefix[1..] {
            "" => {
                let expanded = shellexpand::tilde_with_context(prefix, || self.home_dir());
                (expanded != prefix).then(|| expanded.into_owned())
            }
            user if user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) =>
            {
                match User::from_name(user) {
                    Ok(Some(entry)) => Some(entry.dir.to_string_lossy().into_owned()),
                    _ => None,
                }
            }
            _ => None,
        };

        match home {
            Some(home) => {
                field.push_quoted(&home);
                rest
            }
            None => text,
        }
    }

    fn home_dir(&self) -> Option<String> {
        match self.vars.get("HOME") {
            Some(home) if !home.is_empty() => Some(home.to_string()),
            _ => User::from_uid(getuid())
                .ok()
                .flatten()
                .map(|user| user.dir.to_string_lossy().into_owned()),
        }
    }
}

/// Replaces a field by the sorted paths its pattern matches; no match, or an
/// invalid pattern, leaves the text as typed.
fn glob_field(field: Field) -> Vec<String> {
    if !field.has_glob {
        return vec![field.text];
    }

    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };
    let paths = match glob::glob_with(&field.pattern, options) {
        Ok(paths) => paths,
        Err(err) => {
            debug!("无效的通配模式 {}: {}", field.pattern, err);
            return vec![field.text];
        }
    };

    let mut matches: Vec<String> = paths
        .filter_map(Result::ok)
        .map(|path| path.to_string_lossy().into_owned())
        .collect();
    if matches.is_empty() {
        return vec![field.text];
    }
    matches.sort();
    matches
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::parser::lexer::tokenize;
    use std::fs::File;

    fn vars() -> Variables {
        Variables::with_exported([
            ("HOME".to_string(), "/home/zako".to_string()),
            ("SPACED".to_string(), "  one two  ".to_string()),
            ("NAME".to_string(), "world".to_string()),
        ])
    }

    fn expand_line(line: &str, vars: &Variables) -> Vec<String> {
        let expander = Expander::new(vars);
        expander
            .expand_tokens(tokenize(line).unwrap())
            .unwrap()
            .into_iter()
            .map(|t| match t {
                Token::Word(w) | Token::Assignment(w) => w,
                Token::Operator(op) => op.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_unset_variable_expands_to_nothing() {
        assert_eq!(expand_line("echo $UNSET_VAR end", &vars()), vec!["echo", "end"]);
    }

    #[test]
    fn test_variable_substitution() {
        let vars = vars();
        assert_eq!(
            expand_line("echo $NAME ${NAME}s x${NAME}y", &vars),
            vec!["echo", "world", "worlds", "xworldy"]
        );
        assert_eq!(expand_line("echo \"hello $NAME\"", &vars), vec!["echo", "hello world"]);
    }

    #[test]
    fn test_word_splitting_only_when_unquoted() {
        let vars = vars();
        assert_eq!(expand_line("a${SPACED}b", &vars), vec!["a", "one", "two", "b"]);
        assert_eq!(expand_line("\"$SPACED\"", &vars), vec!["  one two  "]);
        assert_eq!(expand_line("echo \"$UNSET\"", &vars), vec!["echo", ""]);
    }

    #[test]
    fn test_single_quotes_suppress_everything() {
        assert_eq!(
            expand_line("echo '$NAME ~ *' \\$NAME", &vars()),
            vec!["echo", "$NAME ~ *", "$NAME"]
        );
    }

    #[test]
    fn test_tilde_expansion() {
        let vars = vars();
        assert_eq!(
            expand_line("ls ~ ~/src a~ '~'", &vars),
            vec!["ls", "/home/zako", "/home/zako/src", "a~", "~"]
        );
        assert_eq!(
            expand_line("ls ~no_such_user_xyz/x", &vars),
            vec!["ls", "~no_such_user_xyz/x"]
        );
    }

    #[test]
    fn test_tilde_named_user() {
        let root = User::from_name("root").unwrap();
        if let Some(root) = root {
            let expected = format!("{}/bin", root.dir.display());
            assert_eq!(expand_line("~root/bin", &vars()), vec![expected]);
        }
    }

    #[test]
    fn test_glob_no_match_keeps_literal() {
        assert_eq!(
            expand_line("ls *.nomatchxyz", &vars()),
            vec!["ls", "*.nomatchxyz"]
        );
    }

    #[test]
    fn test_glob_matches_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c.log", ".hidden.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let base = dir.path().display().to_string();
        let words = expand_line(&format!("{}/*.txt", base), &vars());
        assert_eq!(words, vec![format!("{}/a.txt", base), format!("{}/b.txt", base)]);

        let quoted = expand_line(&format!("'{}/*.txt'", base), &vars());
        assert_eq!(quoted, vec![format!("{}/*.txt", base)]);

        let half_quoted = expand_line(&format!("{}/\"*\".txt", base), &vars());
        assert_eq!(half_quoted, vec![format!("{}/*.txt", base)]);
    }

    #[test]
    fn test_glob_from_unquoted_variable() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("only.rs")).unwrap();
        let base = dir.path().display().to_string();
        let vars = Variables::with_exported([("PAT".to_string(), format!("{}/*.rs", base))]);
        assert_eq!(expand_line("$PAT", &vars), vec![format!("{}/only.rs", base)]);
        assert_eq!(expand_line("\"$PAT\"", &vars), vec![format!("{}/*.rs", base)]);
    }

    #[test]
    fn test_quoted_expansion_is_idempotent() {
        let vars = vars();
        let expander = Expander::new(&vars);
        let once = expander.expand(&Word::single_quoted("$NAME * ~"));
        assert_eq!(once, vec!["$NAME * ~"]);
        let twice = expander.expand(&Word::single_quoted(&once[0]));
        assert_eq!(twice, once);
    }

    #[test]
    fn test_assignments_only_in_command_position() {
        let vars = vars();
        let expander = Expander::new(&vars);
        let tokens = expander
            .expand_tokens(tokenize("A=$SPACED B=\"$NAME\"s echo C=1 | D=~ env").unwrap())
            .unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Assignment("A=  one two  ".to_string()),
                Token::Assignment("B=worlds".to_string()),
                Token::Word("echo".to_string()),
                Token::Word("C=1".to_string()),
                Token::Operator(Operator::Pipe),
                Token::Assignment("D=~".to_string()),
                Token::Word("env".to_string()),
            ]
        );
    }

    #[test]
    fn test_quoted_or_substituted_assignment_is_a_word() {
        let vars = Variables::with_exported([("V".to_string(), "B=2".to_string())]);
        let expander = Expander::new(&vars);
        for line in ["'A=1'", "\"A=1\"", "A\\=1", "$V"] {
            let tokens = expander.expand_tokens(tokenize(line).unwrap()).unwrap();
            assert!(
                matches!(tokens.as_slice(), [Token::Word(_)]),
                "{:?} gave {:?}",
                line,
                tokens
            );
        }
    }

    #[test]
    fn test_ambiguous_redirect() {
        let vars = vars();
        let expander = Expander::new(&vars);
        let tokens = tokenize("cat > $SPACED").unwrap();
        assert!(matches!(
            expander.expand_tokens(tokens),
            Err(ShellError::Syntax(_))
        ));
        let tokens = tokenize("cat < $UNSET").unwrap();
        assert!(expander.expand_tokens(tokens).is_err());
    }
}
