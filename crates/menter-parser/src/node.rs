//! Parse tree elements and the grammar predicates the rewrite rules share.
//!
//! The parser works on a flat `Vec<Element>`: raw tokens from the lexer
//! mixed with nodes produced by earlier rewrites. Once no rule applies any
//! more, the sequence holds only statement-level nodes.

use menter_lexer::{Token, TokenKind};
use menter_types::{Operator, Span};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────
// NodeKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Statement,
    Return,
    Assignment,
    /// An operator application; the node's `operator` is set.
    Expression,
    CodeBlock,

    // ── Modules ──────────────────────────────────────────────
    ImportStatement,
    ImportAsStatement,
    ImportInlineStatement,
    ExportStatement,

    /// `a.b[c].d(e)`: a base value followed by accessor segments.
    IdentifierAccessed,

    // ── Brackets ─────────────────────────────────────────────
    ParenthesisPair,
    SquareBracketPair,
    CurlyBracketPair,

    // ── Functions ────────────────────────────────────────────
    FunctionDeclaration,
    FunctionCall,
    FunctionInline,

    // ── Collections ──────────────────────────────────────────
    Array,
    ListedElements,
    Map,
    MapElement,

    // ── Control flow ─────────────────────────────────────────
    Conditional,
    ConditionalBranch,
    LoopFor,
    LoopWhile,

    ConstructorCall,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Root => "ROOT",
            Self::Statement => "STATEMENT",
            Self::Return => "RETURN_STATEMENT",
            Self::Assignment => "ASSIGNMENT",
            Self::Expression => "EXPRESSION",
            Self::CodeBlock => "CODE_BLOCK",
            Self::ImportStatement => "IMPORT_STATEMENT",
            Self::ImportAsStatement => "IMPORT_AS_STATEMENT",
            Self::ImportInlineStatement => "IMPORT_INLINE_STATEMENT",
            Self::ExportStatement => "EXPORT_STATEMENT",
            Self::IdentifierAccessed => "IDENTIFIER_ACCESSED",
            Self::ParenthesisPair => "PARENTHESIS_PAIR",
            Self::SquareBracketPair => "SQUARE_BRACKET_PAIR",
            Self::CurlyBracketPair => "CURLY_BRACKET_PAIR",
            Self::FunctionDeclaration => "FUNCTION_DECLARATION",
            Self::FunctionCall => "FUNCTION_CALL",
            Self::FunctionInline => "FUNCTION_INLINE",
            Self::Array => "ARRAY",
            Self::ListedElements => "LISTED_ELEMENTS",
            Self::Map => "MAP",
            Self::MapElement => "MAP_ELEMENT",
            Self::Conditional => "CONDITIONAL",
            Self::ConditionalBranch => "CONDITIONAL_BRANCH",
            Self::LoopFor => "LOOP_FOR",
            Self::LoopWhile => "LOOP_WHILE",
            Self::ConstructorCall => "CONSTRUCTOR_CALL",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────
// ParserNode
// ─────────────────────────────────────────────────────────────────────

/// An interior node of the parse tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserNode {
    pub kind: NodeKind,
    /// Set for [`NodeKind::Expression`] nodes.
    pub operator: Option<Operator>,
    pub children: Vec<Element>,
}

impl ParserNode {
    pub fn new(kind: NodeKind, children: Vec<Element>) -> Self {
        Self {
            kind,
            operator: None,
            children,
        }
    }

    pub fn with_operator(kind: NodeKind, operator: Operator, children: Vec<Element>) -> Self {
        Self {
            kind,
            operator: Some(operator),
            children,
        }
    }

    pub fn is(&self, kind: NodeKind) -> bool {
        self.kind == kind
    }

    pub fn child(&self, index: usize) -> Option<&Element> {
        self.children.get(index)
    }

    /// Source range covered by the tokens below this node, if any of them
    /// came from source text.
    pub fn span(&self) -> Option<Span> {
        self.children
            .iter()
            .filter_map(Element::span)
            .reduce(Span::merge)
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, prefix: &str, child_prefix: &str) -> fmt::Result {
        write!(f, "{prefix}{}", self.kind)?;
        if let Some(op) = &self.operator {
            write!(f, ": {}", op.symbol)?;
        }
        writeln!(f)?;

        for (i, child) in self.children.iter().enumerate() {
            let last = i + 1 == self.children.len();
            let branch = if last { "└─ " } else { "├─ " };
            let next = format!("{child_prefix}{}", if last { "   " } else { "│  " });
            match child {
                Element::Node(node) => {
                    node.write_tree(f, &format!("{child_prefix}{branch}"), &next)?
                }
                Element::Token(token) => {
                    writeln!(f, "{child_prefix}{branch}{} {}", token.kind, token.text)?
                }
            }
        }
        Ok(())
    }
}

/// Renders the node as an indented tree, one node or token per line.
impl fmt::Display for ParserNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, "", "")
    }
}

// ─────────────────────────────────────────────────────────────────────
// Element
// ─────────────────────────────────────────────────────────────────────

/// One entry of the working sequence: a raw token or a reduced node.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Token(Token),
    Node(ParserNode),
}

impl From<Token> for Element {
    fn from(token: Token) -> Self {
        Element::Token(token)
    }
}

impl From<ParserNode> for Element {
    fn from(node: ParserNode) -> Self {
        Element::Node(node)
    }
}

impl Element {
    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Element::Token(token) => Some(token),
            Element::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&ParserNode> {
        match self {
            Element::Node(node) => Some(node),
            Element::Token(_) => None,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Element::Token(token) if token.span.start_line > 0 => Some(token.span),
            Element::Token(_) => None,
            Element::Node(node) => node.span(),
        }
    }

    pub fn is_token(&self, kind: TokenKind) -> bool {
        matches!(self, Element::Token(t) if t.kind == kind)
    }

    pub fn is_node(&self, kind: NodeKind) -> bool {
        matches!(self, Element::Node(n) if n.kind == kind)
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Element::Token(t) if t.is_keyword(keyword))
    }

    pub fn is_operator(&self, symbol: &str) -> bool {
        matches!(self, Element::Token(t) if t.is_operator(symbol))
    }

    pub fn is_opener(&self) -> bool {
        matches!(self, Element::Token(t) if t.is_opener())
    }

    pub fn is_closer(&self) -> bool {
        matches!(self, Element::Token(t) if t.is_closer())
    }

    // ── Grammar predicates ───────────────────────────────────

    pub fn is_literal(&self) -> bool {
        matches!(self, Element::Token(t) if t.is_literal())
    }

    pub fn is_identifier(&self) -> bool {
        self.is_token(TokenKind::Identifier) || self.is_node(NodeKind::IdentifierAccessed)
    }

    pub fn is_assignable(&self) -> bool {
        self.is_identifier() || self.is_node(NodeKind::ListedElements)
    }

    /// Whether the element produces a value when evaluated.
    pub fn is_evaluable(&self) -> bool {
        match self {
            Element::Token(t) => matches!(
                t.kind,
                TokenKind::Identifier
                    | TokenKind::Number
                    | TokenKind::String
                    | TokenKind::Boolean
                    | TokenKind::Regex
                    | TokenKind::Null
                    | TokenKind::Pass
                    | TokenKind::Break
                    | TokenKind::Continue
            ),
            Element::Node(n) => matches!(
                n.kind,
                NodeKind::IdentifierAccessed
                    | NodeKind::Expression
                    | NodeKind::FunctionCall
                    | NodeKind::ParenthesisPair
                    | NodeKind::Array
                    | NodeKind::Map
                    | NodeKind::Conditional
                    | NodeKind::FunctionInline
                    | NodeKind::LoopFor
                    | NodeKind::LoopWhile
                    | NodeKind::ConstructorCall
            ),
        }
    }

    pub fn is_listable(&self) -> bool {
        self.is_evaluable()
            || self.is_node(NodeKind::ListedElements)
            || self.is_node(NodeKind::MapElement)
    }

    /// Tokens that may directly follow a comma separated list.
    pub fn is_list_finisher(&self) -> bool {
        self.is_operator("=")
            || self.is_token(TokenKind::RParen)
            || self.is_token(TokenKind::RBracket)
            || self.is_token(TokenKind::RBrace)
    }

    /// Elements that form a complete statement once a finisher follows.
    pub fn is_finished_statement(&self) -> bool {
        self.is_evaluable()
            || matches!(
                self,
                Element::Node(n) if matches!(
                    n.kind,
                    NodeKind::Assignment
                        | NodeKind::CurlyBracketPair
                        | NodeKind::FunctionDeclaration
                        | NodeKind::Return
                )
            )
    }

    pub fn is_statement_finisher(&self) -> bool {
        self.is_token(TokenKind::Semicolon)
            || self.is_token(TokenKind::Newline)
            || self.is_token(TokenKind::Eof)
            || self.is_token(TokenKind::RBrace)
            || self.is_node(NodeKind::Statement)
    }

    pub fn is_import(&self) -> bool {
        self.is_node(NodeKind::ImportStatement)
            || self.is_node(NodeKind::ImportAsStatement)
            || self.is_node(NodeKind::ImportInlineStatement)
    }
}

/// Fetch `elements[index]` when `index` is in range.
pub(crate) fn at(elements: &[Element], index: usize) -> Option<&Element> {
    elements.get(index)
}

/// Wrap any statement-like element into a [`NodeKind::CodeBlock`].
///
/// Curly pairs and statements are unpacked so that the block's children are
/// the statement bodies themselves.
pub fn into_code_block(element: Element) -> ParserNode {
    match element {
        Element::Node(node) if node.kind == NodeKind::CodeBlock => node,
        Element::Node(node) if node.kind == NodeKind::CurlyBracketPair => {
            let mut children = Vec::with_capacity(node.children.len());
            for child in node.children {
                match child {
                    Element::Node(stmt) if stmt.kind == NodeKind::Statement => {
                        children.extend(stmt.children)
                    }
                    other => children.push(other),
                }
            }
            ParserNode::new(NodeKind::CodeBlock, children)
        }
        Element::Node(node) if node.kind == NodeKind::Statement => {
            ParserNode::new(NodeKind::CodeBlock, node.children)
        }
        other => ParserNode::new(NodeKind::CodeBlock, vec![other]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(kind: TokenKind, text: &str) -> Element {
        Element::Token(Token::synthetic(kind, text))
    }

    #[test]
    fn test_evaluable_tokens_and_nodes() {
        assert!(tok(TokenKind::Identifier, "a").is_evaluable());
        assert!(tok(TokenKind::Number, "1").is_evaluable());
        assert!(tok(TokenKind::Break, "break").is_evaluable());
        assert!(!tok(TokenKind::Keyword, "if").is_evaluable());
        assert!(Element::from(ParserNode::new(NodeKind::Map, vec![])).is_evaluable());
        assert!(!Element::from(ParserNode::new(NodeKind::CodeBlock, vec![])).is_evaluable());
    }

    #[test]
    fn test_finished_statement_includes_assignment() {
        let assignment = Element::from(ParserNode::new(NodeKind::Assignment, vec![]));
        assert!(assignment.is_finished_statement());
        assert!(!assignment.is_evaluable());
    }

    #[test]
    fn test_code_block_unpacks_statements() {
        let stmt = ParserNode::new(NodeKind::Statement, vec![tok(TokenKind::Identifier, "a")]);
        let curly = ParserNode::new(
            NodeKind::CurlyBracketPair,
            vec![stmt.into(), tok(TokenKind::Identifier, "b")],
        );
        let block = into_code_block(curly.into());
        assert_eq!(block.kind, NodeKind::CodeBlock);
        assert_eq!(block.children.len(), 2);
        assert!(block.children.iter().all(|c| c.is_token(TokenKind::Identifier)));
    }

    #[test]
    fn test_code_block_wraps_single_value() {
        let block = into_code_block(tok(TokenKind::Number, "1"));
        assert_eq!(block.children, vec![tok(TokenKind::Number, "1")]);
    }

    #[test]
    fn test_tree_display() {
        let node = ParserNode::with_operator(
            NodeKind::Expression,
            Operator::binary("+", 110),
            vec![tok(TokenKind::Number, "1"), tok(TokenKind::Number, "2")],
        );
        assert_eq!(
            node.to_string(),
            "EXPRESSION: +\n├─ number 1\n└─ number 2\n"
        );
    }
}
