use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Identifier(String),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    Null,

    // Operators
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %
    Assign,       // =
    EqualEqual,   // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    AndAnd,       // &&
    OrOr,         // ||
    Bang,         // !

    // Delimiters
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Comma,     // ,
    Dot,       // .
    Colon,     // :
    Semicolon, // ;

    // Keywords
    If,
    Else,
    While,
    For,
    ForEach,
    Repeat,
    Until,
    Function,
    Return,
    Break,
    Continue,
    Try,
    Catch,
    Finally,
    In,

    // Directives (#include and friends; ignored downstream)
    Directive(String),

    Eof,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            line,
            column,
        }
    }

    pub fn eof(line: usize, column: usize) -> Self {
        Self::new(TokenKind::Eof, "", line, column)
    }
}

/// Keyword lookup. Case-sensitive, except that `ForEach` is a recognized
/// alias for `foreach`.
pub fn keyword_kind(ident: &str) -> Option<TokenKind> {
    static KEYWORDS: OnceLock<HashMap<&'static str, TokenKind>> = OnceLock::new();
    let keywords = KEYWORDS.get_or_init(|| {
        HashMap::from([
            ("if", TokenKind::If),
            ("else", TokenKind::Else),
            ("while", TokenKind::While),
            ("for", TokenKind::For),
            ("foreach", TokenKind::ForEach),
            ("ForEach", TokenKind::ForEach),
            ("repeat", TokenKind::Repeat),
            ("until", TokenKind::Until),
            ("function", TokenKind::Function),
            ("return", TokenKind::Return),
            ("break", TokenKind::Break),
            ("continue", TokenKind::Continue),
            ("try", TokenKind::Try),
            ("catch", TokenKind::Catch),
            ("finally", TokenKind::Finally),
            ("in", TokenKind::In),
            ("true", TokenKind::True),
            ("false", TokenKind::False),
            ("null", TokenKind::Null),
        ])
    });
    keywords.get(ident).cloned()
}
