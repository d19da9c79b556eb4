//! Menter parser: reduces a token stream into a parse tree.
//!
//! Parsing is bottom-up rewriting. The token sequence is repeatedly
//! scanned by an ordered list of rules, each of which replaces a matching
//! run of elements with a single node, until nothing matches.

mod node;
mod operator_rule;
mod parser;
mod reconstruct;
mod rules;

pub use node::{into_code_block, Element, NodeKind, ParserNode};
pub use parser::Parser;
pub use reconstruct::reconstruct;

use menter_types::{OperatorTable, Result, SourceText};

/// Lex and parse a whole unit.
pub fn parse(source: &SourceText, operators: &OperatorTable) -> Result<ParserNode> {
    let tokens = menter_lexer::tokenize(source, operators)?;
    Parser::new(operators).parse(source, tokens)
}
