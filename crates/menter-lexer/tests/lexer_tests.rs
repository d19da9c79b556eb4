//! Lexer tests: literals, operators from the table, comments, indentation
//! aware newlines, fatal scan errors, and the 100-iteration determinism test.

use menter_lexer::{tokenize, Token, TokenKind};
use menter_types::{ErrorCategory, ErrorCode, MenterError, Operator, OperatorTable, SourceText};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn lex(source: &str) -> Vec<Token> {
    let src = SourceText::new("test", source);
    tokenize(&src, &OperatorTable::standard()).unwrap()
}

/// Token kinds, excluding the final Eof.
fn kinds(source: &str) -> Vec<TokenKind> {
    lex(source)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

/// Token texts, excluding the final Eof.
fn texts(source: &str) -> Vec<String> {
    lex(source)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.text)
        .collect()
}

fn lex_error(source: &str) -> MenterError {
    let src = SourceText::new("test", source);
    tokenize(&src, &OperatorTable::standard()).unwrap_err()
}

// ─────────────────────────────────────────────────────────────────────
// Words
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_keywords_and_identifiers() {
    assert_eq!(
        kinds("if elif else foo"),
        vec![
            TokenKind::Keyword,
            TokenKind::Keyword,
            TokenKind::Keyword,
            TokenKind::Identifier
        ]
    );
}

#[test]
fn test_word_literals() {
    assert_eq!(
        kinds("true false null"),
        vec![TokenKind::Boolean, TokenKind::Boolean, TokenKind::Null]
    );
    assert_eq!(
        kinds("pass break continue"),
        vec![TokenKind::Pass, TokenKind::Break, TokenKind::Continue]
    );
}

#[test]
fn test_identifier_characters() {
    assert_eq!(texts("$init _tmp a1 größe"), vec!["$init", "_tmp", "a1", "größe"]);
    assert!(kinds("$init _tmp a1 größe")
        .iter()
        .all(|k| *k == TokenKind::Identifier));
}

// ─────────────────────────────────────────────────────────────────────
// Numbers
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_decimal_numbers() {
    assert_eq!(texts("42 3.14"), vec!["42", "3.14"]);
    assert_eq!(kinds("42 3.14"), vec![TokenKind::Number, TokenKind::Number]);
}

#[test]
fn test_leading_dot_fraction() {
    assert_eq!(texts(".5"), vec!["0.5"]);
}

#[test]
fn test_prefixed_numbers_are_converted() {
    assert_eq!(texts("0xff 0b101 0o17"), vec!["255", "5", "15"]);
}

#[test]
fn test_number_followed_by_member_access() {
    assert_eq!(
        kinds("1.type"),
        vec![TokenKind::Number, TokenKind::Dot, TokenKind::Identifier]
    );
}

#[test]
fn test_invalid_prefixed_number() {
    let err = lex_error("0xZZ");
    assert_eq!(err.code, ErrorCode::INVALID_NUMBER);
    assert!(err.is(ErrorCategory::Scan));
}

// ─────────────────────────────────────────────────────────────────────
// Strings & regex
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_string_escapes() {
    assert_eq!(texts(r#""a\tb\n""#), vec!["a\tb\n"]);
    assert_eq!(texts(r#""A\q""#), vec!["Aq"]);
    assert_eq!(texts(r#""say \"hi\"""#), vec!["say \"hi\""]);
}

#[test]
fn test_string_spanning_lines() {
    let tokens = lex("\"one\ntwo\" x");
    assert_eq!(tokens[0].text, "one\ntwo");
    assert_eq!(tokens[1].span.start_line, 2);
}

#[test]
fn test_unterminated_string() {
    let err = lex_error("x = \"abc");
    assert_eq!(err.code, ErrorCode::UNTERMINATED_STRING);
    assert_eq!(err.span.map(|s| (s.start_line, s.start_col)), Some((1, 5)));
}

#[test]
fn test_regex_literal_kept_raw() {
    let tokens = lex(r"r/a\/b+/i");
    assert_eq!(tokens[0].kind, TokenKind::Regex);
    assert_eq!(tokens[0].text, r"r/a\/b+/i");
}

#[test]
fn test_unterminated_regex() {
    assert_eq!(lex_error("r/abc").code, ErrorCode::UNTERMINATED_REGEX);
}

// ─────────────────────────────────────────────────────────────────────
// Operators & punctuation
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_longest_operator_wins() {
    assert_eq!(texts("a |> b >| c"), vec!["a", "|>", "b", ">|", "c"]);
    assert_eq!(texts("a<=b!=c"), vec!["a", "<=", "b", "!=", "c"]);
    assert_eq!(texts("x++"), vec!["x", "++"]);
}

#[test]
fn test_arrow_and_assignment_are_operators() {
    assert_eq!(
        kinds("f = x -> x"),
        vec![
            TokenKind::Identifier,
            TokenKind::Operator,
            TokenKind::Identifier,
            TokenKind::Operator,
            TokenKind::Identifier
        ]
    );
}

#[test]
fn test_colon_versus_cons_operator() {
    assert_eq!(
        kinds("a: b :: c"),
        vec![
            TokenKind::Identifier,
            TokenKind::Colon,
            TokenKind::Identifier,
            TokenKind::Operator,
            TokenKind::Identifier
        ]
    );
}

#[test]
fn test_operator_in_parentheses() {
    assert_eq!(
        kinds("(-)"),
        vec![TokenKind::LParen, TokenKind::Operator, TokenKind::RParen]
    );
}

#[test]
fn test_registered_operator_is_recognised() {
    let mut table = OperatorTable::standard();
    table.register(Operator::binary("<>", 80));
    let src = SourceText::new("test", "a <> b");
    let tokens = tokenize(&src, &table).unwrap();
    assert_eq!(tokens[1].kind, TokenKind::Operator);
    assert_eq!(tokens[1].text, "<>");

    assert_eq!(texts("a <> b"), vec!["a", "<", ">", "b"]);
}

#[test]
fn test_unexpected_character() {
    let err = lex_error("x @ y");
    assert_eq!(err.code, ErrorCode::UNEXPECTED_CHARACTER);
    assert_eq!(
        err.to_string(),
        "test:1:3: E100 [scan] Unexpected character '@'\nx @ y\n  ^"
    );
}

// ─────────────────────────────────────────────────────────────────────
// Comments & layout
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_line_comment() {
    assert_eq!(
        kinds("# note\nx"),
        vec![TokenKind::Comment, TokenKind::Newline, TokenKind::Identifier]
    );
}

#[test]
fn test_block_comment_spans_lines() {
    let tokens = lex("## one\ntwo ## x");
    assert_eq!(tokens[0].kind, TokenKind::Comment);
    assert_eq!(tokens[1].kind, TokenKind::Identifier);
    assert_eq!(tokens[1].span.start_line, 2);
}

#[test]
fn test_newline_separates_statements() {
    assert_eq!(
        kinds("a\r\nb"),
        vec![TokenKind::Identifier, TokenKind::Newline, TokenKind::Identifier]
    );
}

#[test]
fn test_indented_line_continues_statement() {
    assert_eq!(
        kinds("foo(1,\n    2)\nbar"),
        vec![
            TokenKind::Identifier,
            TokenKind::LParen,
            TokenKind::Number,
            TokenKind::Comma,
            TokenKind::Number,
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Identifier
        ]
    );
}

#[test]
fn test_leading_dot_line_continues_chain() {
    assert_eq!(
        kinds("list\n.map(f)"),
        vec![
            TokenKind::Identifier,
            TokenKind::Dot,
            TokenKind::Identifier,
            TokenKind::LParen,
            TokenKind::Identifier,
            TokenKind::RParen
        ]
    );
}

#[test]
fn test_token_positions() {
    let tokens = lex("a\n  bc");
    let bc = tokens.iter().find(|t| t.text == "bc").unwrap();
    assert_eq!((bc.span.start_line, bc.span.start_col), (2, 3));
    assert_eq!(bc.offset, 4);
}

#[test]
fn test_eof_always_last() {
    let tokens = lex("a = 1");
    assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_lexer_determinism_100_iterations() {
    let source = "f = (a, b) -> {\n    a + b\n}\nr = [1, 2].map(x -> x * 0x10) |> print\n";
    let first = lex(source);
    for i in 0..100 {
        assert_eq!(first, lex(source), "Determinism failure at iteration {i}");
    }
}
