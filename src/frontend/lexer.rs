use std::{
    collections::{BTreeMap, VecDeque},
    str::Chars,
};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;
use thiserror::Error;

use crate::frontend::{
    SourceFile,
    syntax::{MetaKind, Relop},
};

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    line_number: usize,
    chars: PeekNth<Chars<'source>>,
    peek_buffer: VecDeque<Token>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword),   // while
    Type(MetaKind),     // int
    Identifier,         // main

    /* Literals */
    IntegerLiteral(i32), // 1, 0x1F, 017
    FloatLiteral(f32),   // 1.5, 1.5e3

    /* Delimiters */
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }
    Semicolon,    // ;
    Comma,        // ,
    Dot,          // .

    /* Operators */
    Equals,     // =
    Plus,       // +
    Minus,      // -
    Asterisk,   // *
    Divide,     // /
    LogicalAnd, // &&
    LogicalOr,  // ||
    Bang,       // !
    Relop(Relop),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Struct,
    Return,
    If,
    Else,
    While,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('[', TokenKind::OpenBracket),
        (']', TokenKind::CloseBracket),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        ('.', TokenKind::Dot),
        ('=', TokenKind::Equals),
        ('+', TokenKind::Plus),
        ('-', TokenKind::Minus),
        ('*', TokenKind::Asterisk),
        ('/', TokenKind::Divide),
        ('!', TokenKind::Bang),
        ('<', TokenKind::Relop(Relop::Lt)),
        ('>', TokenKind::Relop(Relop::Gt)),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexical error. Lexing stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error type A at Line {line}: {message}.")]
pub struct LexError {
    pub line: usize,
    pub message: String,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            line_number: 1,
            peek_buffer: VecDeque::new(),
        }
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn value_of_span(&self, span: Span) -> &'source str {
        &self.source.contents[span.start..span.end]
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, LexError> {
        Err(LexError {
            line: self.line_number,
            message: message.into(),
        })
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.position += c.len_utf8();

        if c == '\n' {
            self.line_number += 1;
        }

        Some(c)
    }

    fn peek_is(&mut self, n: usize, expected: char) -> bool {
        self.chars.peek_nth(n).is_some_and(|c| *c == expected)
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.bump();
        }
    }

    fn ignore_block_comment(&mut self) -> Result<(), LexError> {
        let start_line = self.line_number;

        // Consume the opening `/*`
        self.bump();
        self.bump();

        loop {
            match self.bump() {
                Some('*') if self.peek_is(0, '/') => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    return Err(LexError {
                        line: start_line,
                        message: "Unterminated block comment".to_owned(),
                    });
                }
            }
        }
    }

    // Keyword, type keyword or identifier
    fn read_word(&mut self) -> Token {
        let start_position = self.position;
        let line = self.line_number;

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }

            self.bump();
        }

        let span = self.new_span(start_position);
        let value = self.value_of_span(span);

        let kind = if let Ok(keyword) = value.parse() {
            TokenKind::Keyword(keyword)
        } else if let Ok(meta) = value.parse() {
            TokenKind::Type(meta)
        } else {
            TokenKind::Identifier
        };

        Token { kind, span, line }
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start_position = self.position;
        let line = self.line_number;
        let mut is_float = false;

        while let Some(c) = self.chars.peek().copied() {
            let is_exponent_sign = (c == '+' || c == '-')
                && is_float
                && matches!(
                    self.value_of_span(self.new_span(start_position)).chars().last(),
                    Some('e' | 'E')
                );

            if c == '.' || is_exponent_sign {
                is_float = true;
            } else if (c == 'e' || c == 'E') && !self.is_hex_prefix(start_position) {
                is_float = true;
            } else if !c.is_ascii_alphanumeric() {
                break;
            }

            self.bump();
        }

        let span = self.new_span(start_position);
        let text = self.value_of_span(span);

        let kind = if is_float {
            match text.parse::<f32>() {
                Ok(value) => TokenKind::FloatLiteral(value),
                Err(_) => return self.error(format!("Illegal floating point number \"{text}\"")),
            }
        } else {
            match parse_integer(text) {
                Some(value) => TokenKind::IntegerLiteral(value),
                None => return self.error(format!("Illegal integer \"{text}\"")),
            }
        };

        Ok(Token { kind, span, line })
    }

    fn is_hex_prefix(&self, start_position: usize) -> bool {
        let text = &self.source.contents[start_position..self.position];
        text.starts_with("0x") || text.starts_with("0X")
    }

    fn read_single(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;
        let line = self.line_number;

        self.bump();

        Token {
            kind,
            span: self.new_span(start_position),
            line,
        }
    }

    fn read_double(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;
        let line = self.line_number;

        self.bump();
        self.bump();

        Token {
            kind,
            span: self.new_span(start_position),
            line,
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    pub fn peek(&mut self) -> Result<Option<Token>, LexError> {
        self.peek_nth(0)
    }

    /// Looks `n` tokens ahead without consuming anything
    pub fn peek_nth(&mut self, n: usize) -> Result<Option<Token>, LexError> {
        while self.peek_buffer.len() <= n {
            match self.scan()? {
                Some(token) => self.peek_buffer.push_back(token),
                None => break,
            }
        }

        Ok(self.peek_buffer.get(n).copied())
    }

    pub fn next(&mut self) -> Result<Option<Token>, LexError> {
        if let Some(token) = self.peek_buffer.pop_front() {
            return Ok(Some(token));
        }

        self.scan()
    }

    fn scan(&mut self) -> Result<Option<Token>, LexError> {
        while let Some(c) = self.chars.peek().copied() {
            let token = match c {
                // Ignore whitespace
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                // Ignore comments
                '/' if self.peek_is(1, '/') => {
                    self.ignore_line();
                    continue;
                }
                '/' if self.peek_is(1, '*') => {
                    self.ignore_block_comment()?;
                    continue;
                }

                // Integer and float literals
                n if n.is_ascii_digit() => self.read_number()?,
                '.' if self.chars.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.read_number()?
                }

                // Identifiers and keywords
                a if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

                '=' if self.peek_is(1, '=') => self.read_double(TokenKind::Relop(Relop::Eq)),
                '!' if self.peek_is(1, '=') => self.read_double(TokenKind::Relop(Relop::Ne)),
                '<' if self.peek_is(1, '=') => self.read_double(TokenKind::Relop(Relop::Le)),
                '>' if self.peek_is(1, '=') => self.read_double(TokenKind::Relop(Relop::Ge)),
                '&' if self.peek_is(1, '&') => self.read_double(TokenKind::LogicalAnd),
                '|' if self.peek_is(1, '|') => self.read_double(TokenKind::LogicalOr),

                c => match SINGLE_TOKENS.get(&c) {
                    Some(kind) => self.read_single(*kind),
                    None => return self.error(format!("Mysterious character \"{c}\"")),
                },
            };

            return Ok(Some(token));
        }

        Ok(None)
    }
}

/// Parses a decimal, octal (`017`) or hexadecimal (`0x1F`) integer literal.
/// Values up to `u32::MAX` are accepted and wrap into `i32`.
fn parse_integer(text: &str) -> Option<i32> {
    let (digits, radix) = if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        (hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };

    if digits.is_empty() {
        return None;
    }

    u32::from_str_radix(digits, radix).ok().map(|v| v as i32)
}

#[cfg(test)]
mod tests {
    use super::{Keyword, Lexer, TokenKind};
    use crate::frontend::{
        SourceFile,
        syntax::{MetaKind, Relop},
    };

    fn kinds(source: &str) -> Vec<TokenKind> {
        let source = SourceFile::from_memory(source);
        let mut lexer = Lexer::new(&source);
        let mut kinds = Vec::new();

        while let Some(token) = lexer.next().unwrap() {
            kinds.push(token.kind);
        }

        kinds
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            kinds("int a[10];"),
            vec![
                TokenKind::Type(MetaKind::Int),
                TokenKind::Identifier,
                TokenKind::OpenBracket,
                TokenKind::IntegerLiteral(10),
                TokenKind::CloseBracket,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn lexes_operators_and_keywords() {
        assert_eq!(
            kinds("while (a <= b && !c || d != 0x1f) return 017;"),
            vec![
                TokenKind::Keyword(Keyword::While),
                TokenKind::OpenParen,
                TokenKind::Identifier,
                TokenKind::Relop(Relop::Le),
                TokenKind::Identifier,
                TokenKind::LogicalAnd,
                TokenKind::Bang,
                TokenKind::Identifier,
                TokenKind::LogicalOr,
                TokenKind::Identifier,
                TokenKind::Relop(Relop::Ne),
                TokenKind::IntegerLiteral(31),
                TokenKind::CloseParen,
                TokenKind::Keyword(Keyword::Return),
                TokenKind::IntegerLiteral(15),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn skips_comments_and_tracks_lines() {
        let source = SourceFile::from_memory("// one\n/* two\n three */ x");
        let mut lexer = Lexer::new(&source);
        let token = lexer.next().unwrap().unwrap();

        assert_eq!(token.kind, TokenKind::Identifier);
        assert_eq!(token.line, 3);
    }

    #[test]
    fn floats() {
        assert_eq!(kinds("1.5"), vec![TokenKind::FloatLiteral(1.5)]);
        assert_eq!(kinds("2.5e2"), vec![TokenKind::FloatLiteral(250.0)]);
    }

    #[test]
    fn reports_mysterious_characters() {
        let source = SourceFile::from_memory("int a;\n a = ~b;");
        let mut lexer = Lexer::new(&source);
        let error = loop {
            match lexer.next() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected a lexical error"),
                Err(error) => break error,
            }
        };

        assert_eq!(error.line, 2);
        assert_eq!(
            error.to_string(),
            "Error type A at Line 2: Mysterious character \"~\"."
        );
    }

    #[test]
    fn rejects_malformed_numbers() {
        let source = SourceFile::from_memory("09");
        let mut lexer = Lexer::new(&source);

        assert!(lexer.next().is_err());
    }
}
