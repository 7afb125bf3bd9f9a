//! Just enough SQL tokenizing to find placeholders and the outline of a statement.
//!
//! Quoted strings, quoted identifiers and comments are skipped as units, so a `?` or a
//! keyword inside them is never mistaken for structure.

use memchr::{memchr, memchr2, memmem};
use smallvec::SmallVec;

use crate::arguments::MySqlArguments;
use crate::error::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// Keywords, bare identifiers and numbers.
    Word,
    /// `` `name` ``
    QuotedIdent,
    /// `'text'` or `"text"`
    Literal,
    Placeholder,
    OpenParen,
    CloseParen,
    Comma,
    Semicolon,
    /// Any other punctuation or operator byte.
    Symbol,
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl Token {
    pub(crate) fn text<'a>(&self, sql: &'a str) -> &'a str {
        &sql[self.start..self.end]
    }

    pub(crate) fn is_keyword(&self, sql: &str, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text(sql).eq_ignore_ascii_case(keyword)
    }
}

pub(crate) struct Lexer<'a> {
    sql: &'a [u8],
    pos: usize,
    no_backslash_escapes: bool,
    executable_comment: bool,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(sql: &'a str, no_backslash_escapes: bool) -> Self {
        Self {
            sql: sql.as_bytes(),
            pos: 0,
            no_backslash_escapes,
            executable_comment: false,
        }
    }

    /// Whether a `/*! ... */` comment was skipped so far. The server executes its content,
    /// so the statement is not what the tokens alone describe.
    pub(crate) fn saw_executable_comment(&self) -> bool {
        self.executable_comment
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.sql.get(self.pos + offset).copied()
    }

    fn skip_line(&mut self) {
        self.pos = match memchr(b'\n', &self.sql[self.pos..]) {
            Some(idx) => self.pos + idx + 1,
            None => self.sql.len(),
        };
    }

    fn skip_block_comment(&mut self) {
        if self.peek(2) == Some(b'!') {
            self.executable_comment = true;
        }

        self.pos = match memmem::find(&self.sql[self.pos + 2..], b"*/") {
            Some(idx) => self.pos + 2 + idx + 2,
            None => self.sql.len(),
        };
    }

    // positions `pos` after the closing quote; an unterminated quote runs to the end
    fn skip_quoted(&mut self, quote: u8) {
        let escapes = quote != b'`' && !self.no_backslash_escapes;
        let mut pos = self.pos + 1;

        loop {
            let rest = &self.sql[pos..];
            let found = if escapes {
                memchr2(quote, b'\\', rest)
            } else {
                memchr(quote, rest)
            };

            let Some(idx) = found else {
                self.pos = self.sql.len();
                return;
            };

            let at = pos + idx;

            if self.sql[at] == b'\\' {
                pos = at + 2;
            } else if self.sql.get(at + 1) == Some(&quote) {
                // doubled quote
                pos = at + 2;
            } else {
                self.pos = at + 1;
                return;
            }

            if pos >= self.sql.len() {
                self.pos = self.sql.len();
                return;
            }
        }
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            let b = self.peek(0)?;
            let start = self.pos;

            let kind = match b {
                _ if b.is_ascii_whitespace() => {
                    self.pos += 1;
                    continue;
                }

                b'#' => {
                    self.skip_line();
                    continue;
                }

                // `--` only starts a comment when followed by whitespace
                b'-' if self.peek(1) == Some(b'-')
                    && self.peek(2).map_or(true, |c| c.is_ascii_whitespace()) =>
                {
                    self.skip_line();
                    continue;
                }

                b'/' if self.peek(1) == Some(b'*') => {
                    self.skip_block_comment();
                    continue;
                }

                b'\'' | b'"' => {
                    self.skip_quoted(b);
                    TokenKind::Literal
                }

                b'`' => {
                    self.skip_quoted(b);
                    TokenKind::QuotedIdent
                }

                _ if is_word_byte(b) => {
                    let len = self.sql[self.pos..]
                        .iter()
                        .position(|&c| !is_word_byte(c))
                        .unwrap_or(self.sql.len() - self.pos);

                    self.pos += len;
                    TokenKind::Word
                }

                _ => {
                    self.pos += 1;

                    match b {
                        b'?' => TokenKind::Placeholder,
                        b'(' => TokenKind::OpenParen,
                        b')' => TokenKind::CloseParen,
                        b',' => TokenKind::Comma,
                        b';' => TokenKind::Semicolon,
                        _ => TokenKind::Symbol,
                    }
                }
            };

            return Some(Token {
                kind,
                start,
                end: self.pos,
            });
        }
    }
}

/// Byte offsets of the `?` placeholders in `sql`.
pub(crate) fn placeholders(sql: &str, no_backslash_escapes: bool) -> SmallVec<[usize; 8]> {
    Lexer::new(sql, no_backslash_escapes)
        .filter(|token| token.kind == TokenKind::Placeholder)
        .map(|token| token.start)
        .collect()
}

/// The first keyword of the statement, skipping comments and opening parentheses.
pub(crate) fn first_keyword(sql: &str) -> Option<&str> {
    Lexer::new(sql, false)
        .find(|token| token.kind != TokenKind::OpenParen)
        .filter(|token| token.kind == TokenKind::Word)
        .map(|token| token.text(sql))
}

/// Replaces every placeholder with the literal form of its argument.
pub(crate) fn interpolate(
    sql: &str,
    arguments: &MySqlArguments,
    no_backslash_escapes: bool,
) -> Result<String, Error> {
    let positions = placeholders(sql, no_backslash_escapes);

    if positions.len() != arguments.len() {
        return Err(Error::InvalidArgument(format!(
            "statement has {} placeholders but {} arguments were bound",
            positions.len(),
            arguments.len()
        )));
    }

    let mut out = String::with_capacity(sql.len() + arguments.len() * 8);
    let mut copied = 0;

    for (position, value) in positions.iter().zip(arguments.values()) {
        out.push_str(&sql[copied..*position]);
        value.write_sql_literal(&mut out, no_backslash_escapes);
        copied = position + 1;
    }

    out.push_str(&sql[copied..]);

    Ok(out)
}
