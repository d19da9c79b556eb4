//! Token types for the Menter lexer.
//!
//! Defines [`TokenKind`] covering every lexeme class and [`Token`], which
//! pairs a kind with its text and source position.

use menter_types::Span;
use std::fmt;

/// Reserved words. `true`, `false` and `null` are literals, and `pass`,
/// `break` and `continue` get their own kinds; everything else here is
/// emitted as [`TokenKind::Keyword`].
pub const ALL_KEYWORDS: &[&str] = &[
    "if", "else", "elif", "true", "false", "null", "export", "as", "import", "inline", "native",
    "return", "while", "for", "break", "continue", "in", "new", "instanceof", "pass",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

/// A single token produced by the Menter lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal text. String literals hold their decoded content without
    /// quotes; numbers hold their decimal text (prefixed forms converted).
    pub text: String,
    pub span: Span,
    /// Byte offset of the first character in the source.
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span, offset: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
            offset,
        }
    }

    /// A token that does not originate from source text.
    pub fn synthetic(kind: TokenKind, text: impl Into<String>) -> Self {
        Self::new(kind, text, Span::point(0, 0), 0)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == keyword
    }

    pub fn is_operator(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == symbol
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Number
                | TokenKind::String
                | TokenKind::Boolean
                | TokenKind::Regex
                | TokenKind::Null
        )
    }

    pub fn is_opener(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace
        )
    }

    pub fn is_closer(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
        )
    }
}

/// Renders the token the way it would be written in source.
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::String => {
                f.write_str("\"")?;
                for ch in self.text.chars() {
                    match ch {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("\"")
            }
            TokenKind::Newline => f.write_str("\n"),
            TokenKind::Eof => Ok(()),
            _ => f.write_str(&self.text),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    Number,
    String,
    Boolean,
    /// `r/pattern/flags`, text kept verbatim.
    Regex,
    /// `null`
    Null,

    Identifier,
    Keyword,
    /// Any symbol found in the operator table.
    Operator,

    // ── Punctuation ──────────────────────────────────────────
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Dot,

    // ── Flow words ───────────────────────────────────────────
    Pass,
    Break,
    Continue,

    // ── Layout ───────────────────────────────────────────────
    Newline,
    Comment,
    Eof,
}

impl TokenKind {
    /// Classify a word that is not an identifier.
    pub fn from_word(word: &str) -> Option<TokenKind> {
        match word {
            "true" | "false" => Some(TokenKind::Boolean),
            "null" => Some(TokenKind::Null),
            "pass" => Some(TokenKind::Pass),
            "break" => Some(TokenKind::Break),
            "continue" => Some(TokenKind::Continue),
            _ if ALL_KEYWORDS.contains(&word) => Some(TokenKind::Keyword),
            _ => None,
        }
    }

    /// Map a punctuation byte to its kind.
    pub fn punctuation(ch: u8) -> Option<TokenKind> {
        Some(match ch {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b':' => TokenKind::Colon,
            b'.' => TokenKind::Dot,
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Regex => "regex",
            Self::Null => "null",
            Self::Identifier => "identifier",
            Self::Keyword => "keyword",
            Self::Operator => "operator",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::Colon => ":",
            Self::Dot => ".",
            Self::Pass => "pass",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Newline => "newline",
            Self::Comment => "comment",
            Self::Eof => "end of input",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_word_literals_and_flow() {
        assert_eq!(TokenKind::from_word("true"), Some(TokenKind::Boolean));
        assert_eq!(TokenKind::from_word("false"), Some(TokenKind::Boolean));
        assert_eq!(TokenKind::from_word("null"), Some(TokenKind::Null));
        assert_eq!(TokenKind::from_word("break"), Some(TokenKind::Break));
        assert_eq!(TokenKind::from_word("continue"), Some(TokenKind::Continue));
        assert_eq!(TokenKind::from_word("pass"), Some(TokenKind::Pass));
    }

    #[test]
    fn test_from_word_keywords() {
        for kw in ["if", "elif", "import", "inline", "native", "instanceof", "new"] {
            assert_eq!(TokenKind::from_word(kw), Some(TokenKind::Keyword), "{kw}");
        }
        assert_eq!(TokenKind::from_word("If"), None);
        assert_eq!(TokenKind::from_word("range"), None);
    }

    #[test]
    fn test_punctuation_mapping() {
        assert_eq!(TokenKind::punctuation(b'('), Some(TokenKind::LParen));
        assert_eq!(TokenKind::punctuation(b':'), Some(TokenKind::Colon));
        assert_eq!(TokenKind::punctuation(b'+'), None);
    }

    #[test]
    fn test_display_string_token_escapes() {
        let tok = Token::synthetic(TokenKind::String, "a\"b\nc");
        assert_eq!(tok.to_string(), "\"a\\\"b\\nc\"");
    }

    #[test]
    fn test_predicates() {
        let op = Token::synthetic(TokenKind::Operator, "+");
        assert!(op.is_operator("+"));
        assert!(!op.is_operator("-"));
        let kw = Token::synthetic(TokenKind::Keyword, "if");
        assert!(kw.is_keyword("if"));
        assert!(Token::synthetic(TokenKind::Regex, "r/a/").is_literal());
        assert!(Token::synthetic(TokenKind::LBrace, "{").is_opener());
        assert!(Token::synthetic(TokenKind::RBracket, "]").is_closer());
    }
}
