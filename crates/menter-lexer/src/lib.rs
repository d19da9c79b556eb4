//! Menter lexer: converts source text into a token stream.

pub mod lexer;
pub mod token;

pub use lexer::Lexer;
pub use token::{Token, TokenKind, ALL_KEYWORDS};

use menter_types::{OperatorTable, Result, SourceText};

/// Lex a whole unit with the given operator table.
pub fn tokenize(source: &SourceText, operators: &OperatorTable) -> Result<Vec<Token>> {
    Lexer::new(source, operators).lex()
}
