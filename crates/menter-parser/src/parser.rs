//! The rewriting driver: runs the ordered rule list over the token
//! sequence until no rule applies, then validates what is left.

use menter_lexer::{Token, TokenKind};
use menter_types::{ErrorCode, MenterError, Operator, OperatorTable, Result, SourceText};
use tracing::debug;

use crate::node::{Element, NodeKind, ParserNode};
use crate::reconstruct::reconstruct;
use crate::operator_rule;
use crate::rules::{self, RuleFn};

/// Elements shown on each side of an unreduced element in parse errors.
const CONTEXT_RADIUS: usize = 2;

enum Rule {
    Structural(&'static str, RuleFn),
    /// Operators of one precedence, in table order.
    OperatorGroup(Vec<Operator>),
}

impl Rule {
    fn apply(&self, elements: &mut Vec<Element>, table: &OperatorTable) -> bool {
        match self {
            Rule::Structural(_, rule) => rule(elements),
            Rule::OperatorGroup(group) => operator_rule::reduce_group(elements, group, table),
        }
    }

    fn name(&self) -> String {
        match self {
            Rule::Structural(name, _) => (*name).to_string(),
            Rule::OperatorGroup(group) => {
                let symbols: Vec<&str> = group.iter().map(|o| o.symbol.as_str()).collect();
                format!("operators {}", symbols.join(" "))
            }
        }
    }
}

fn structural(name: &'static str, rule: RuleFn) -> Rule {
    Rule::Structural(name, rule)
}

/// The Menter parser.
///
/// The rule list is derived from the operator table once, at construction;
/// a parser can then be reused for any number of units.
pub struct Parser {
    operators: OperatorTable,
    rules: Vec<Rule>,
    log_progress: bool,
}

impl Parser {
    pub fn new(operators: &OperatorTable) -> Self {
        let mut rules = vec![
            structural("flatten accessors", rules::flatten_accessors),
            structural("map", rules::curly_to_map),
            structural("code block", rules::curly_to_code_block),
            structural("declaration fixup", rules::declaration_fixup),
            structural("import", rules::import_statement),
            structural("export", rules::export_statement),
            structural("function call", rules::function_call),
            structural("accessor chain", rules::accessor_chain),
            structural("array", rules::array),
        ];
        rules.extend(
            operators
                .double_sided_groups()
                .into_iter()
                .map(Rule::OperatorGroup),
        );
        rules.extend([
            structural("inline function", rules::inline_function),
            structural("map element", rules::map_element),
            structural("curly brackets", rules::curly_pair),
            structural("square brackets", rules::square_pair),
            structural("parentheses", rules::parenthesis_pair),
            structural("listed elements", rules::listed_elements),
        ]);
        rules.extend(
            operators
                .single_sided_groups()
                .into_iter()
                .map(Rule::OperatorGroup),
        );
        rules.extend([
            structural("assignment", rules::assignment),
            structural("conditional", rules::conditional),
            structural("for loop", rules::for_loop),
            structural("while loop", rules::while_loop),
            structural("constructor call", rules::constructor_call),
            structural("declaration", rules::declaration_assigned),
            structural("declaration block", rules::declaration_block),
            structural("declaration inline", rules::declaration_inline),
            structural("native declaration", rules::declaration_native),
            structural("return", rules::return_statement),
            structural("statement", rules::statement),
        ]);

        Self {
            operators: operators.clone(),
            rules,
            log_progress: false,
        }
    }

    /// Log every rewrite at debug level.
    pub fn with_progress_logging(mut self, enabled: bool) -> Self {
        self.log_progress = enabled;
        self
    }

    /// Reduce `tokens` into a [`NodeKind::Root`] node holding one child per
    /// top-level statement, import or export.
    pub fn parse(&self, source: &SourceText, tokens: Vec<Token>) -> Result<ParserNode> {
        let mut elements: Vec<Element> = tokens.into_iter().map(Element::Token).collect();

        rules::remove_comments(&mut elements);
        rules::collapse_line_breaks(&mut elements);
        rules::merge_else_if(&mut elements);
        rules::drop_continuation_breaks(&mut elements);

        let mut rewrites = 0usize;
        'rewrite: loop {
            for rule in &self.rules {
                if rule.apply(&mut elements, &self.operators) {
                    rewrites += 1;
                    if self.log_progress {
                        debug!(rule = %rule.name(), remaining = elements.len(), "rule applied");
                    }
                    continue 'rewrite;
                }
            }
            break;
        }
        debug!(unit = %source.name, rewrites, "parsed");

        elements.retain(|e| {
            !(e.is_token(TokenKind::Newline)
                || e.is_token(TokenKind::Semicolon)
                || e.is_token(TokenKind::Eof))
        });

        if let Some(index) = elements.iter().position(|e| !is_top_level(e)) {
            return Err(unreduced(source, &elements, index));
        }

        let root = ParserNode::new(NodeKind::Root, elements);
        check_parameters(source, &root)?;
        Ok(root)
    }
}

fn is_top_level(element: &Element) -> bool {
    element.is_node(NodeKind::Statement)
        || element.is_node(NodeKind::ExportStatement)
        || element.is_import()
}

fn unreduced(source: &SourceText, elements: &[Element], index: usize) -> MenterError {
    let first = index.saturating_sub(CONTEXT_RADIUS);
    let last = (index + CONTEXT_RADIUS).min(elements.len() - 1);
    let mut detail = String::new();
    for (i, element) in elements.iter().enumerate().take(last + 1).skip(first) {
        let marker = if i == index { "> " } else { "  " };
        detail.push('\n');
        detail.push_str(marker);
        detail.push_str(&reconstruct(element));
    }

    let failed = &elements[index];
    let mut err = MenterError::new(
        source.name.clone(),
        ErrorCode::UNREDUCED_INPUT,
        format!("Failed to reduce '{}'", reconstruct(failed)),
    )
    .with_detail(detail);
    if let Some(span) = failed.span() {
        err = err.with_span(span);
    }
    err
}

/// Declared and inline function parameters must be a parenthesised list
/// of plain identifiers.
fn check_parameters(source: &SourceText, node: &ParserNode) -> Result<()> {
    let params = match node.kind {
        NodeKind::FunctionDeclaration => {
            let native = node.children.first().is_some_and(|c| c.is_keyword("native"));
            node.child(if native { 2 } else { 1 })
        }
        NodeKind::FunctionInline => node.child(0),
        _ => None,
    };
    if let Some(params) = params {
        let bad = match params {
            Element::Node(pair) if pair.kind == NodeKind::ParenthesisPair => pair
                .children
                .iter()
                .find(|p| !p.is_token(TokenKind::Identifier)),
            other => Some(other),
        };
        if let Some(bad) = bad {
            let mut err = MenterError::new(
                source.name.clone(),
                ErrorCode::MALFORMED_NODE,
                format!(
                    "Function parameters must be identifiers, found '{}' in '{}'",
                    reconstruct(bad),
                    node.reconstruct()
                ),
            );
            if let Some(span) = bad.span() {
                err = err.with_span(span);
            }
            return Err(err);
        }
    }

    for child in &node.children {
        if let Element::Node(child) = child {
            check_parameters(source, child)?;
        }
    }
    Ok(())
}
