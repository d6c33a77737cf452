use thiserror::Error;

use crate::token::{Token, TokenKind, keyword_kind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at line {line}, column {column}")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("Unterminated string at line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },
    #[error("Integer literal '{literal}' out of range at line {line}, column {column}")]
    IntegerOutOfRange {
        literal: String,
        line: usize,
        column: usize,
    },
}

/// Single forward scan over the source text. Errors accumulate; an
/// `Invalid` token is emitted in place of the offending lexeme and the
/// scan continues.
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            errors: Vec::new(),
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens.push(Token::eof(self.line, self.column));
        tokens
    }

    pub fn errors(&self) -> &[LexError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            self.skip_whitespace();

            let start = self.pos;
            let line = self.line;
            let column = self.column;
            let c = self.advance()?;

            let kind = match c {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                ',' => TokenKind::Comma,
                '.' => TokenKind::Dot,
                ':' => TokenKind::Colon,
                ';' => TokenKind::Semicolon,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '%' => TokenKind::Percent,
                '!' => {
                    if self.match_char('=') {
                        TokenKind::NotEqual
                    } else {
                        TokenKind::Bang
                    }
                }
                '=' => {
                    if self.match_char('=') {
                        TokenKind::EqualEqual
                    } else {
                        TokenKind::Assign
                    }
                }
                '<' => {
                    if self.match_char('=') {
                        TokenKind::LessEqual
                    } else {
                        TokenKind::Less
                    }
                }
                '>' => {
                    if self.match_char('=') {
                        TokenKind::GreaterEqual
                    } else {
                        TokenKind::Greater
                    }
                }
                '&' => {
                    if self.match_char('&') {
                        TokenKind::AndAnd
                    } else {
                        self.report_unexpected('&', line, column);
                        TokenKind::Invalid
                    }
                }
                '|' => {
                    if self.match_char('|') {
                        TokenKind::OrOr
                    } else {
                        self.report_unexpected('|', line, column);
                        TokenKind::Invalid
                    }
                }
                '/' => {
                    if self.match_char('/') {
                        self.skip_line_comment();
                        continue;
                    }
                    if self.match_char('*') {
                        self.skip_block_comment();
                        continue;
                    }
                    TokenKind::Slash
                }
                '"' | '\'' => return Some(self.string(c, line, column)),
                '#' => return Some(self.directive(start, line, column)),
                c if c.is_ascii_digit() => return Some(self.number(start, line, column)),
                c if c.is_ascii_alphabetic() || c == '$' => {
                    return Some(self.identifier(start, line, column));
                }
                other => {
                    self.report_unexpected(other, line, column);
                    TokenKind::Invalid
                }
            };

            return Some(Token::new(kind, &self.source[start..self.pos], line, column));
        }
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Token {
        let mut value = String::new();

        while let Some(c) = self.peek() {
            if c == quote {
                break;
            }
            self.advance();
            if c == '\\' {
                // Unknown escapes yield the raw following character.
                match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some('\'') => value.push('\''),
                    Some(other) => value.push(other),
                    None => break,
                }
            } else {
                value.push(c);
            }
        }

        if self.peek().is_none() {
            self.errors.push(LexError::UnterminatedString { line, column });
            return Token::new(TokenKind::Invalid, value, line, column);
        }

        self.advance(); // closing quote
        Token::new(TokenKind::Str(value.clone()), value, line, column)
    }

    fn number(&mut self, start: usize, line: usize, column: usize) -> Token {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance(); // '.'
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let lexeme = &self.source[start..self.pos];
        if is_float {
            let value = lexeme.parse::<f64>().unwrap_or_default();
            return Token::new(TokenKind::Float(value), lexeme, line, column);
        }

        match lexeme.parse::<i64>() {
            Ok(value) => Token::new(TokenKind::Int(value), lexeme, line, column),
            Err(_) => {
                self.errors.push(LexError::IntegerOutOfRange {
                    literal: lexeme.to_string(),
                    line,
                    column,
                });
                Token::new(TokenKind::Invalid, lexeme, line, column)
            }
        }
    }

    fn identifier(&mut self, start: usize, line: usize, column: usize) -> Token {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }

        let lexeme = &self.source[start..self.pos];
        let kind = keyword_kind(lexeme)
            .unwrap_or_else(|| TokenKind::Identifier(lexeme.to_string()));
        Token::new(kind, lexeme, line, column)
    }

    fn directive(&mut self, start: usize, line: usize, column: usize) -> Token {
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.advance();
        }
        let lexeme = &self.source[start..self.pos];
        let name = lexeme.trim_start_matches('#').to_string();
        Token::new(TokenKind::Directive(name), lexeme, line, column)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        // Non-nesting; an unterminated block comment runs to end of input.
        while let Some(c) = self.peek() {
            if c == '*' && self.peek_next() == Some('/') {
                self.advance();
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn report_unexpected(&mut self, character: char, line: usize, column: usize) {
        self.errors.push(LexError::UnexpectedCharacter {
            character,
            line,
            column,
        });
    }
}

/// Tokenize a whole source text, returning the token stream (always ending
/// in `Eof`) together with any accumulated lexical errors.
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<LexError>) {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize();
    (tokens, lexer.errors)
}
