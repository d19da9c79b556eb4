//! Operator reduction, one rule per precedence group.
//!
//! A group rule finds the left-most operator token that matches one of the
//! group's operators and replaces it, together with its operands, by an
//! [`NodeKind::Expression`] node. Several guards keep an operator from
//! grabbing an operand that is still part of an unreduced call, index or
//! member access.

use menter_lexer::TokenKind;
use menter_types::{Operator, OperatorTable};

use crate::node::{at, Element, NodeKind, ParserNode};

/// Try to reduce one operator application from `group`.
pub(crate) fn reduce_group(
    elements: &mut Vec<Element>,
    group: &[Operator],
    table: &OperatorTable,
) -> bool {
    for i in 0..elements.len() {
        let Element::Token(token) = &elements[i] else {
            continue;
        };
        if token.kind != TokenKind::Operator {
            continue;
        }

        // Call, index or literal continuation right after the operand.
        if at(elements, i + 2).is_some_and(|e| e.is_opener() || is_index_pair(e)) {
            continue;
        }

        let before = i.checked_sub(1).and_then(|p| at(elements, p));
        let after = at(elements, i + 1);
        let has_before = before.is_some_and(Element::is_evaluable);
        let has_after = after.is_some_and(Element::is_evaluable);

        let Some(operator) = group
            .iter()
            .find(|op| op.symbol == token.text && op.left == has_before && op.right == has_after)
        else {
            continue;
        };

        let dotted = (i >= 2 && elements[i - 2].is_token(TokenKind::Dot))
            || at(elements, i + 2).is_some_and(|e| e.is_token(TokenKind::Dot));
        if dotted || before.is_some_and(|b| b.is_closer() || is_index_pair(b)) {
            continue;
        }
        if operator.is_double_sided() && operand_claimed(elements, i, table) {
            continue;
        }
        if is_unfinished(elements, i, operator) {
            continue;
        }

        let operator = operator.clone();
        let first = if operator.left { i - 1 } else { i };
        let last = if operator.right { i + 1 } else { i };
        let operands = elements
            .drain(first..=last)
            .filter(|e| !matches!(e, Element::Token(t) if t.kind == TokenKind::Operator && t.text == operator.symbol))
            .collect();
        elements.insert(
            first,
            ParserNode::with_operator(NodeKind::Expression, operator, operands).into(),
        );
        return true;
    }
    false
}

fn is_index_pair(element: &Element) -> bool {
    element.is_node(NodeKind::SquareBracketPair)
}

/// A binary operator must not take an operand that a pending prefix or
/// postfix operator still binds to.
fn operand_claimed(elements: &[Element], index: usize, table: &OperatorTable) -> bool {
    let is_shape = |element: Option<&Element>, left: bool, right: bool| {
        matches!(element, Some(Element::Token(t))
            if t.kind == TokenKind::Operator && table.find(&t.text, left, right).is_some())
    };

    let prefix_pending = index >= 2
        && is_shape(at(elements, index - 2), false, true)
        && !(index >= 3 && elements[index - 3].is_evaluable());
    let postfix_pending = is_shape(at(elements, index + 2), true, false)
        && !at(elements, index + 3).is_some_and(Element::is_evaluable);

    prefix_pending || postfix_pending
}

fn is_separator(element: &Element) -> bool {
    element.is_token(TokenKind::Semicolon)
        || element.is_token(TokenKind::Newline)
        || element.is_token(TokenKind::Eof)
        || element.is_node(NodeKind::Assignment)
        || element.is_node(NodeKind::Statement)
}

/// Index of the `)` matching the `(` at `open`.
fn matching_close(elements: &[Element], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, element) in elements.iter().enumerate().skip(open) {
        if element.is_opener() {
            depth += 1;
        } else if element.is_closer() {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Whether the statement around `index` still contains an unreduced
/// bracket, or, for pipelines, another operator that must bind first.
fn is_unfinished(elements: &[Element], index: usize, operator: &Operator) -> bool {
    let mut start = 0;
    let mut depth = 0i32;
    for j in (0..index).rev() {
        let element = &elements[j];
        if depth == 0 && is_separator(element) {
            start = j + 1;
            break;
        }
        if element.is_opener() {
            depth -= 1;
        } else if element.is_closer() {
            depth += 1;
        }
        if depth < 0 {
            start = j + 1;
            break;
        }
    }

    let mut j = start;
    while j < elements.len() {
        let element = &elements[j];
        let loop_header =
            element.is_token(TokenKind::LParen) && j > 0 && elements[j - 1].is_keyword("for");
        if loop_header {
            match matching_close(elements, j) {
                Some(close) => {
                    j = close + 1;
                    continue;
                }
                None => return true,
            }
        }
        if element.is_opener() {
            return true;
        }
        if element.is_closer() || is_separator(element) {
            break;
        }
        if operator.is_pipeline()
            && j != index
            && element.is_token(TokenKind::Operator)
            && !element.is_operator("|>")
            && !element.is_operator(">|")
            && !element.is_operator("=")
        {
            return true;
        }
        j += 1;
    }
    false
}
