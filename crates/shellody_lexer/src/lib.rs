//! Tokenizer for interactive shell input.
//!
//! The grammar is deliberately small:
//!
//! - whitespace outside quotes separates tokens;
//! - `'…'` and `"…"` quote, and quotes may start or stop in the middle of a token, so
//!   `a"b c"d` is the single token `ab cd` and `""` is an empty token;
//! - a backslash escapes the next character, inside or outside quotes;
//! - an unterminated quote or a trailing lone backslash is a [`LexError`] carrying the 1-based
//!   column of the offending character.
//!
//! [`tokenize_partial`] is the completion-time variant: it never fails and reports the word
//! under the cursor separately. [`join_tokens`] renders tokens back into a line that tokenizes
//! to the same sequence.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One token with its unescaped text and byte span in the source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Unescaped, unquoted text.
    pub text: String,
    /// Byte offset of the first character of the token.
    pub start: usize,
    /// Byte offset one past the last character of the token.
    pub end: usize,
    /// Whether any part of the token was quoted.
    pub quoted: bool,
}

/// Tokenization failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} at column {column}")]
pub struct LexError {
    /// 1-based character column.
    pub column: usize,
    /// Human-readable message.
    pub message: String,
}

impl LexError {
    fn new(column: usize, message: impl Into<String>) -> Self {
        Self {
            column,
            message: message.into(),
        }
    }
}

/// Splits `line` into tokens.
pub fn tokenize(line: &str) -> Result<Vec<Token>, LexError> {
    let scan = scan(line);
    if let Some(column) = scan.dangling_escape {
        return Err(LexError::new(column, "dangling escape sequence"));
    }
    if let Some((_, column)) = scan.open_quote {
        return Err(LexError::new(column, "unterminated quoted string"));
    }
    let mut tokens = scan.tokens;
    if let Some(word) = scan.trailing {
        tokens.push(word.finish(line.len()));
    }
    Ok(tokens)
}

/// Splits `line` into token texts.
pub fn split(line: &str) -> Result<Vec<String>, LexError> {
    Ok(tokenize(line)?.into_iter().map(|token| token.text).collect())
}

/// Tokens of a line that is still being typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialLine {
    /// Tokens completed before the word under the cursor.
    pub tokens: Vec<Token>,
    /// Word under the cursor; `None` when the line is empty or ends in unquoted whitespace.
    pub current: Option<Token>,
    /// Quote character left open at the end of the line.
    pub open_quote: Option<char>,
    /// Length of the tokenized text in bytes.
    pub len: usize,
}

impl PartialLine {
    /// Text typed so far for the word under the cursor.
    pub fn prefix(&self) -> &str {
        self.current
            .as_ref()
            .map(|token| token.text.as_str())
            .unwrap_or("")
    }

    /// Byte offset where a completion replacing the current word starts.
    pub fn replace_from(&self) -> usize {
        self.current
            .as_ref()
            .map(|token| token.start)
            .unwrap_or(self.len)
    }

    /// Texts of the completed tokens.
    pub fn words(&self) -> Vec<String> {
        self.tokens.iter().map(|token| token.text.clone()).collect()
    }
}

/// Tokenizes a partial line; never fails.
///
/// An open quote keeps the current word open, and a trailing lone backslash is ignored.
pub fn tokenize_partial(line: &str) -> PartialLine {
    let scan = scan(line);
    PartialLine {
        tokens: scan.tokens,
        current: scan.trailing.map(|word| word.finish(line.len())),
        open_quote: scan.open_quote.map(|(quote, _)| quote),
        len: line.len(),
    }
}

/// Renders one token so that [`tokenize`] reads it back unchanged.
pub fn quote_token(text: &str) -> Cow<'_, str> {
    let needs_quotes = text.is_empty()
        || text
            .chars()
            .any(|ch| ch.is_whitespace() || matches!(ch, '"' | '\'' | '\\'));
    if !needs_quotes {
        return Cow::Borrowed(text);
    }
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        if matches!(ch, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Canonical line for a token sequence.
pub fn join_tokens<I, S>(tokens: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .map(|token| quote_token(token.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

struct Word {
    text: String,
    start: usize,
    quoted: bool,
}

impl Word {
    fn finish(self, end: usize) -> Token {
        Token {
            text: self.text,
            start: self.start,
            end,
            quoted: self.quoted,
        }
    }
}

struct Scan {
    tokens: Vec<Token>,
    trailing: Option<Word>,
    open_quote: Option<(char, usize)>,
    dangling_escape: Option<usize>,
}

fn word_at(word: &mut Option<Word>, offset: usize) -> &mut Word {
    word.get_or_insert_with(|| Word {
        text: String::new(),
        start: offset,
        quoted: false,
    })
}

fn scan(line: &str) -> Scan {
    let mut tokens = Vec::new();
    let mut word = None::<Word>;
    let mut quote = None::<(char, usize)>;
    let mut dangling_escape = None;
    let mut chars = line.char_indices().enumerate();

    while let Some((index, (offset, ch))) = chars.next() {
        let column = index + 1;
        match quote {
            Some((active, _)) if ch == active => quote = None,
            _ if ch == '\\' => {
                let current = word_at(&mut word, offset);
                match chars.next() {
                    Some((_, (_, next))) => current.text.push(next),
                    None => dangling_escape = Some(column),
                }
            }
            Some(_) => word_at(&mut word, offset).text.push(ch),
            None if ch == '"' || ch == '\'' => {
                word_at(&mut word, offset).quoted = true;
                quote = Some((ch, column));
            }
            None if ch.is_whitespace() => {
                if let Some(done) = word.take() {
                    tokens.push(done.finish(offset));
                }
            }
            None => word_at(&mut word, offset).text.push(ch),
        }
    }

    Scan {
        tokens,
        trailing: word,
        open_quote: quote,
        dangling_escape,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_quoted_segments() {
        assert_eq!(
            split("open \"hello world\"").expect("parse"),
            vec!["open", "hello world"]
        );
    }

    #[test]
    fn tokenizes_escaped_whitespace() {
        assert_eq!(
            split("open hello\\ world").expect("parse"),
            vec!["open", "hello world"]
        );
    }

    #[test]
    fn quotes_join_mid_token_and_keep_empty_tokens() {
        assert_eq!(split("a\"b c\"d ''").expect("parse"), vec!["ab cd", ""]);
    }

    #[test]
    fn blank_line_has_no_tokens() {
        assert!(split("   ").expect("parse").is_empty());
    }

    #[test]
    fn records_byte_spans() {
        let tokens = tokenize("greet  'Ada L'").expect("parse");
        assert_eq!(tokens[0].start, 0);
        assert_eq!(tokens[0].end, 5);
        assert_eq!(tokens[1].start, 7);
        assert_eq!(tokens[1].end, 14);
        assert!(tokens[1].quoted);
    }

    #[test]
    fn unterminated_quote_reports_opening_column() {
        let error = tokenize("open \"unterminated").expect_err("should fail");
        assert_eq!(error.column, 6);
        assert!(error.message.contains("unterminated"));
    }

    #[test]
    fn dangling_escape_reports_its_column() {
        let error = tokenize("echo é\\").expect_err("should fail");
        assert_eq!(error.column, 7);
    }

    #[test]
    fn partial_line_tracks_word_under_cursor() {
        let partial = tokenize_partial("db qu");
        assert_eq!(partial.words(), vec!["db"]);
        assert_eq!(partial.prefix(), "qu");
        assert_eq!(partial.replace_from(), 3);

        let partial = tokenize_partial("db ");
        assert_eq!(partial.current, None);
        assert_eq!(partial.replace_from(), 3);
    }

    #[test]
    fn partial_line_tolerates_open_quote() {
        let partial = tokenize_partial("greet \"Ada Lov");
        assert_eq!(partial.words(), vec!["greet"]);
        assert_eq!(partial.prefix(), "Ada Lov");
        assert_eq!(partial.open_quote, Some('"'));
    }

    #[test]
    fn quote_token_only_quotes_when_needed() {
        assert_eq!(quote_token("plain"), "plain");
        assert_eq!(quote_token(""), "\"\"");
        assert_eq!(quote_token("a \"b\""), "\"a \\\"b\\\"\"");
        assert_eq!(join_tokens(["greet", "Ada Lovelace"]), "greet \"Ada Lovelace\"");
    }
}
