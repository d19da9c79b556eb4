//! Core Menter lexer: converts source text to a token stream.
//!
//! Features:
//! - Operator symbols probed from the runtime's [`OperatorTable`]
//!   (3, then 2, then 1 characters; longest match wins)
//! - Decimal, `0x`/`0b`/`0o` prefixed and leading-dot numbers
//! - String escapes `\n \r \t \b \f \uXXXX`, regex literals `r/…/flags`
//! - `#` line comments and `##…##` block comments, kept as tokens
//! - Indentation-aware newlines: a deeper-indented line continues the
//!   previous one, as does a line starting with `.`
//!
//! Scanning is fatal on the first error; there is no recovery.

use menter_types::{ErrorCode, MenterError, OperatorTable, Result, SourceText, Span};

use crate::token::{Token, TokenKind};

/// The Menter lexer.
pub struct Lexer<'src> {
    /// The full source text as bytes.
    source: &'src [u8],
    /// Source unit for error reporting.
    source_text: &'src SourceText,
    operators: &'src OperatorTable,
    /// Current byte offset into `source`.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
    /// Indentation weight of the last line that emitted a newline decision.
    last_indentation: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source_text: &'src SourceText, operators: &'src OperatorTable) -> Self {
        Self {
            source: source_text.text.as_bytes(),
            source_text,
            operators,
            pos: 0,
            line: 1,
            col: 1,
            last_indentation: 0,
        }
    }

    /// Lex the entire unit. The stream always ends with [`TokenKind::Eof`].
    pub fn lex(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let Some(token) = self.scan_next()? else {
                continue;
            };
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(
            start_line,
            start_col,
            self.line,
            self.col.saturating_sub(1).max(1),
        )
    }

    fn text_from(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.source[start..self.pos]).into_owned()
    }

    fn error(&self, code: ErrorCode, message: impl Into<String>, span: Span) -> MenterError {
        MenterError::new(&self.source_text.name, code, message)
            .with_span(span)
            .with_detail(format!("\n{}", self.source_text.excerpt(span)))
    }

    /// Whether `symbol` (a slice starting at the cursor) is a registered operator.
    fn operator_at(&self, len: usize) -> bool {
        self.source
            .get(self.pos..self.pos + len)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .is_some_and(|symbol| self.operators.is_symbol(symbol))
    }

    // ─────────────────────────────────────────────────────────────
    // Token dispatch
    // ─────────────────────────────────────────────────────────────

    /// Scan one token. Returns `None` for a suppressed newline.
    fn scan_next(&mut self) -> Result<Option<Token>> {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r')) {
            self.advance();
        }

        let start = self.pos;
        let start_line = self.line;
        let start_col = self.col;

        let Some(ch) = self.peek() else {
            return Ok(Some(Token::new(
                TokenKind::Eof,
                "",
                Span::point(start_line, start_col),
                start,
            )));
        };

        let token = match ch {
            b'\n' => {
                self.advance();
                return Ok(self.scan_newline(start, start_line, start_col));
            }
            b'#' => self.scan_comment(start, start_line, start_col),
            b'"' => self.scan_string(start, start_line, start_col)?,
            b'r' if self.peek_at(1) == Some(b'/') => self.scan_regex(start, start_line, start_col)?,
            b'0'..=b'9' => self.scan_number(start, start_line, start_col)?,
            b'.' if matches!(self.peek_at(1), Some(b'0'..=b'9')) => {
                self.scan_number(start, start_line, start_col)?
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' | 0x80..=0xff => {
                self.scan_identifier(start, start_line, start_col)
            }
            _ => self.scan_symbol(start, start_line, start_col)?,
        };
        Ok(Some(token))
    }

    // ─────────────────────────────────────────────────────────────
    // Newlines & comments
    // ─────────────────────────────────────────────────────────────

    /// Decide whether the newline just consumed ends a statement.
    fn scan_newline(&mut self, start: usize, start_line: u32, start_col: u32) -> Option<Token> {
        let mut weight = 0;
        let mut look = self.pos;
        loop {
            match self.source.get(look) {
                Some(b' ') => weight += 1,
                Some(b'\t') => weight += 4,
                _ => break,
            }
            look += 1;
        }

        let continues_chain = self.source.get(look) == Some(&b'.')
            && !matches!(self.source.get(look + 1), Some(b'0'..=b'9'));
        if continues_chain {
            return None;
        }

        let deeper = weight > self.last_indentation;
        self.last_indentation = weight;
        if deeper {
            None
        } else {
            Some(Token::new(
                TokenKind::Newline,
                "\n",
                Span::point(start_line, start_col),
                start,
            ))
        }
    }

    /// `# …` to end of line, or `## … ##`.
    fn scan_comment(&mut self, start: usize, start_line: u32, start_col: u32) -> Token {
        self.advance();
        if self.peek() == Some(b'#') {
            self.advance();
            while !self.at_end() {
                if self.peek() == Some(b'#') && self.peek_at(1) == Some(b'#') {
                    self.advance();
                    self.advance();
                    break;
                }
                self.advance();
            }
        } else {
            while !matches!(self.peek(), None | Some(b'\n')) {
                self.advance();
            }
        }
        Token::new(
            TokenKind::Comment,
            self.text_from(start),
            self.span_from(start_line, start_col),
            start,
        )
    }

    // ─────────────────────────────────────────────────────────────
    // Literals
    // ─────────────────────────────────────────────────────────────

    fn scan_string(&mut self, start: usize, start_line: u32, start_col: u32) -> Result<Token> {
        self.advance(); // opening quote
        let mut buf: Vec<u8> = Vec::new();

        loop {
            match self.advance() {
                None => {
                    return Err(self.error(
                        ErrorCode::UNTERMINATED_STRING,
                        "Unterminated string literal",
                        Span::point(start_line, start_col),
                    ))
                }
                Some(b'"') => break,
                Some(b'\\') => self.scan_escape(&mut buf, start_line, start_col)?,
                Some(byte) => buf.push(byte),
            }
        }

        Ok(Token::new(
            TokenKind::String,
            String::from_utf8_lossy(&buf).into_owned(),
            self.span_from(start_line, start_col),
            start,
        ))
    }

    /// Decode the escape after a consumed `\`. Unknown escapes keep the
    /// escaped character literally.
    fn scan_escape(&mut self, buf: &mut Vec<u8>, start_line: u32, start_col: u32) -> Result<()> {
        let decoded = match self.advance() {
            Some(b'n') => '\n',
            Some(b'r') => '\r',
            Some(b't') => '\t',
            Some(b'b') => '\u{8}',
            Some(b'f') => '\u{c}',
            Some(b'u') => {
                let hex = self
                    .source
                    .get(self.pos..self.pos + 4)
                    .and_then(|bytes| std::str::from_utf8(bytes).ok())
                    .and_then(|digits| u32::from_str_radix(digits, 16).ok())
                    .and_then(char::from_u32);
                match hex {
                    Some(ch) => {
                        for _ in 0..4 {
                            self.advance();
                        }
                        ch
                    }
                    None => 'u',
                }
            }
            Some(other) => {
                buf.push(other);
                return Ok(());
            }
            None => {
                return Err(self.error(
                    ErrorCode::UNTERMINATED_STRING,
                    "Unterminated string literal",
                    Span::point(start_line, start_col),
                ))
            }
        };
        let mut utf8 = [0u8; 4];
        buf.extend_from_slice(decoded.encode_utf8(&mut utf8).as_bytes());
        Ok(())
    }

    fn scan_regex(&mut self, start: usize, start_line: u32, start_col: u32) -> Result<Token> {
        self.advance(); // r
        self.advance(); // /
        loop {
            match self.advance() {
                None | Some(b'\n') => {
                    return Err(self.error(
                        ErrorCode::UNTERMINATED_REGEX,
                        "Unterminated regex literal",
                        Span::point(start_line, start_col),
                    ))
                }
                Some(b'\\') => {
                    self.advance();
                }
                Some(b'/') => break,
                Some(_) => {}
            }
        }
        while matches!(self.peek(), Some(b'a'..=b'z')) {
            self.advance();
        }

        Ok(Token::new(
            TokenKind::Regex,
            self.text_from(start),
            self.span_from(start_line, start_col),
            start,
        ))
    }

    fn scan_number(&mut self, start: usize, start_line: u32, start_col: u32) -> Result<Token> {
        let radix = match (self.peek(), self.peek_at(1)) {
            (Some(b'0'), Some(b'x' | b'X')) => 16,
            (Some(b'0'), Some(b'b' | b'B')) => 2,
            (Some(b'0'), Some(b'o' | b'O')) => 8,
            _ => 10,
        };

        let text = if radix == 10 {
            while let Some(b'0'..=b'9') = self.peek() {
                self.advance();
            }
            if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
                self.advance();
                while let Some(b'0'..=b'9') = self.peek() {
                    self.advance();
                }
            }
            let text = self.text_from(start);
            if text.starts_with('.') {
                format!("0{text}")
            } else {
                text
            }
        } else {
            self.advance();
            self.advance();
            let digits_start = self.pos;
            while matches!(self.peek(), Some(b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'_')) {
                self.advance();
            }
            let digits = self.text_from(digits_start).replace('_', "");
            match i128::from_str_radix(&digits, radix) {
                Ok(value) => value.to_string(),
                Err(_) => {
                    return Err(self.error(
                        ErrorCode::INVALID_NUMBER,
                        format!("Invalid number literal '{}'", self.text_from(start)),
                        self.span_from(start_line, start_col),
                    ))
                }
            }
        };

        Ok(Token::new(
            TokenKind::Number,
            text,
            self.span_from(start_line, start_col),
            start,
        ))
    }

    // ─────────────────────────────────────────────────────────────
    // Identifiers, punctuation & operators
    // ─────────────────────────────────────────────────────────────

    fn scan_identifier(&mut self, start: usize, start_line: u32, start_col: u32) -> Token {
        while matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'$' | 0x80..=0xff)
        ) {
            self.advance();
        }
        let text = self.text_from(start);
        let kind = TokenKind::from_word(&text).unwrap_or(TokenKind::Identifier);
        Token::new(kind, text, self.span_from(start_line, start_col), start)
    }

    fn scan_symbol(&mut self, start: usize, start_line: u32, start_col: u32) -> Result<Token> {
        let ch = self.peek().unwrap_or(b' ');

        if let Some(kind) = TokenKind::punctuation(ch) {
            if !self.operator_at(2) && !self.operator_at(3) {
                self.advance();
                return Ok(Token::new(
                    kind,
                    self.text_from(start),
                    self.span_from(start_line, start_col),
                    start,
                ));
            }
        }

        for len in [3, 2, 1] {
            if self.operator_at(len) {
                for _ in 0..len {
                    self.advance();
                }
                return Ok(Token::new(
                    TokenKind::Operator,
                    self.text_from(start),
                    self.span_from(start_line, start_col),
                    start,
                ));
            }
        }

        Err(self.error(
            ErrorCode::UNEXPECTED_CHARACTER,
            format!("Unexpected character '{}'", ch as char),
            Span::point(start_line, start_col),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let src = SourceText::new("test", source);
        let table = OperatorTable::standard();
        Lexer::new(&src, &table)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_empty_source_is_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_colon_alone_is_punctuation() {
        assert_eq!(
            kinds("a: 1"),
            vec![
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_double_colon_is_operator() {
        assert_eq!(
            kinds("a :: b"),
            vec![
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }
}
