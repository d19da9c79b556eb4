//! Structural rewrite rules.
//!
//! Every rule scans the working sequence from the left, rewrites the first
//! match it finds in place and reports whether it did. The driver in
//! [`crate::parser`] restarts from the first rule after each rewrite.

use menter_lexer::{Token, TokenKind};

use crate::node::{at, into_code_block, Element, NodeKind, ParserNode};

/// Signature shared by all structural rules.
pub(crate) type RuleFn = fn(&mut Vec<Element>) -> bool;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Remove `elements[start..=end]` and return them.
fn take(elements: &mut Vec<Element>, start: usize, end: usize) -> Vec<Element> {
    elements.drain(start..=end).collect()
}

fn insert(elements: &mut Vec<Element>, index: usize, node: ParserNode) -> bool {
    elements.insert(index, Element::Node(node));
    true
}

fn is_line_break(element: &Element) -> bool {
    element.is_token(TokenKind::Newline) || element.is_token(TokenKind::Semicolon)
}

/// Finishers that belong to the statement they end. A closing brace, a
/// following statement or the end of input stay in the sequence.
fn consumes_finisher(element: &Element) -> bool {
    is_line_break(element)
}

/// The next element would extend the expression that ends before it.
fn continues_expression(next: Option<&Element>) -> bool {
    next.is_some_and(|n| {
        n.is_token(TokenKind::Operator)
            || n.is_token(TokenKind::Dot)
            || n.is_token(TokenKind::LParen)
            || n.is_token(TokenKind::LBracket)
    })
}

fn is_index_access(element: &Element) -> bool {
    matches!(element, Element::Node(n) if n.kind == NodeKind::SquareBracketPair && n.children.len() == 1)
}

fn is_loop_or_branch_body(element: &Element) -> bool {
    element.is_evaluable()
        || element.is_node(NodeKind::CodeBlock)
        || element.is_node(NodeKind::Statement)
}

// ─────────────────────────────────────────────────────────────────────
// Apply-once rules
// ─────────────────────────────────────────────────────────────────────

pub(crate) fn remove_comments(elements: &mut Vec<Element>) {
    elements.retain(|e| !e.is_token(TokenKind::Comment));
}

/// Collapse runs of newlines and semicolons into their last member.
pub(crate) fn collapse_line_breaks(elements: &mut Vec<Element>) {
    let mut i = 0;
    while i + 1 < elements.len() {
        if is_line_break(&elements[i]) && is_line_break(&elements[i + 1]) {
            elements.remove(i);
        } else {
            i += 1;
        }
    }
}

/// Rewrite `else if` into a single `elif` keyword.
pub(crate) fn merge_else_if(elements: &mut Vec<Element>) {
    let mut i = 0;
    while i + 1 < elements.len() {
        if elements[i].is_keyword("else") && elements[i + 1].is_keyword("if") {
            let span = elements[i].span();
            let mut elif = Token::synthetic(TokenKind::Keyword, "elif");
            if let Some(span) = span {
                elif.span = span;
            }
            elements[i] = Element::Token(elif);
            elements.remove(i + 1);
        }
        i += 1;
    }
}

/// Drop line breaks that cannot end a statement: before `elif`/`else`,
/// after an opening bracket or a comma, and before a closing bracket.
pub(crate) fn drop_continuation_breaks(elements: &mut Vec<Element>) {
    let mut i = 0;
    while i < elements.len() {
        if elements[i].is_token(TokenKind::Newline) {
            let next = at(elements, i + 1);
            let previous = i.checked_sub(1).and_then(|p| at(elements, p));
            let dangling = next.is_some_and(|n| {
                n.is_keyword("elif") || n.is_keyword("else") || n.is_closer()
            }) || previous.is_some_and(|p| p.is_opener() || p.is_token(TokenKind::Comma));
            if dangling {
                elements.remove(i);
                continue;
            }
        }
        i += 1;
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tree normalisation
// ─────────────────────────────────────────────────────────────────────

/// Splice nested accessor chains into their parent chain.
pub(crate) fn flatten_accessors(elements: &mut Vec<Element>) -> bool {
    for element in elements.iter_mut() {
        let Element::Node(node) = element else {
            continue;
        };
        if node.kind != NodeKind::IdentifierAccessed {
            continue;
        }
        let nested = node
            .children
            .iter()
            .position(|c| c.is_node(NodeKind::IdentifierAccessed));
        if let Some(pos) = nested {
            if let Element::Node(inner) = node.children.remove(pos) {
                let tail = node.children.split_off(pos);
                node.children.extend(inner.children);
                node.children.extend(tail);
            }
            return true;
        }
    }
    false
}

/// `{a: 1, b: 2}`: a curly pair holding only map elements.
pub(crate) fn curly_to_map(elements: &mut Vec<Element>) -> bool {
    for element in elements.iter_mut() {
        if let Element::Node(node) = element {
            if node.kind == NodeKind::CurlyBracketPair
                && node.children.iter().all(|c| c.is_node(NodeKind::MapElement))
            {
                node.kind = NodeKind::Map;
                return true;
            }
        }
    }
    false
}

/// A curly pair holding only statements becomes a code block.
pub(crate) fn curly_to_code_block(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len() {
        let is_block = matches!(
            &elements[i],
            Element::Node(n) if n.kind == NodeKind::CurlyBracketPair
                && n.children.iter().all(|c| {
                    c.is_node(NodeKind::Statement) || c.is_finished_statement()
                })
        );
        if is_block {
            let curly = elements.remove(i);
            return insert(elements, i, into_code_block(curly));
        }
    }
    false
}

/// `f = (x) -> {…}` declared as a function: lift the inline function's
/// parameters and body into the declaration.
pub(crate) fn declaration_fixup(elements: &mut Vec<Element>) -> bool {
    for element in elements.iter_mut() {
        let Element::Node(decl) = element else {
            continue;
        };
        if decl.kind != NodeKind::FunctionDeclaration {
            continue;
        }
        let liftable = matches!(
            decl.children.get(1),
            Some(Element::Node(inline)) if inline.kind == NodeKind::FunctionInline
                && inline.children.len() == 2
                && inline.children[0].is_node(NodeKind::ParenthesisPair)
                && (inline.children[1].is_node(NodeKind::CodeBlock)
                    || inline.children[1].is_node(NodeKind::Return))
        );
        if liftable {
            if let Element::Node(inline) = decl.children.remove(1) {
                decl.children.extend(inline.children);
            }
            return true;
        }
    }
    false
}

// ─────────────────────────────────────────────────────────────────────
// Modules
// ─────────────────────────────────────────────────────────────────────

/// `import name`, `import name inline`, `import name as alias`.
pub(crate) fn import_statement(elements: &mut Vec<Element>) -> bool {
    for start in 0..elements.len() {
        if !elements[start].is_keyword("import") {
            continue;
        }
        let Some((kind, finisher)) = match_import(elements, start) else {
            continue;
        };
        let last = if consumes_finisher(&elements[finisher]) {
            finisher
        } else {
            finisher - 1
        };
        let names = take(elements, start, last)
            .into_iter()
            .filter(|e| e.is_token(TokenKind::Identifier))
            .collect();
        return insert(elements, start, ParserNode::new(kind, names));
    }
    false
}

fn match_import(elements: &[Element], start: usize) -> Option<(NodeKind, usize)> {
    if !at(elements, start + 1)?.is_token(TokenKind::Identifier) {
        return None;
    }
    let next = at(elements, start + 2)?;
    if next.is_statement_finisher() {
        return Some((NodeKind::ImportStatement, start + 2));
    }
    if next.is_keyword("inline") && at(elements, start + 3)?.is_statement_finisher() {
        return Some((NodeKind::ImportInlineStatement, start + 3));
    }
    if next.is_keyword("as")
        && at(elements, start + 3)?.is_token(TokenKind::Identifier)
        && at(elements, start + 4)?.is_statement_finisher()
    {
        return Some((NodeKind::ImportAsStatement, start + 4));
    }
    None
}

/// `export [a, b] as name`.
pub(crate) fn export_statement(elements: &mut Vec<Element>) -> bool {
    for start in 0..elements.len().saturating_sub(4) {
        let matched = elements[start].is_keyword("export")
            && elements[start + 1].is_node(NodeKind::Array)
            && elements[start + 2].is_keyword("as")
            && elements[start + 3].is_token(TokenKind::Identifier)
            && elements[start + 4].is_statement_finisher();
        if !matched {
            continue;
        }
        let last = if consumes_finisher(&elements[start + 4]) {
            start + 4
        } else {
            start + 3
        };
        let children = take(elements, start, last)
            .into_iter()
            .filter(|e| e.is_node(NodeKind::Array) || e.is_token(TokenKind::Identifier))
            .collect();
        return insert(
            elements,
            start,
            ParserNode::new(NodeKind::ExportStatement, children),
        );
    }
    false
}

// ─────────────────────────────────────────────────────────────────────
// Calls & accessors
// ─────────────────────────────────────────────────────────────────────

/// `callee(args)` where the callee is any value or a single-element
/// square bracket pair.
pub(crate) fn function_call(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len().saturating_sub(1) {
        let callee = &elements[i];
        let is_condition = callee.is_node(NodeKind::ParenthesisPair)
            && i > 0
            && elements[i - 1].is_token(TokenKind::Keyword);
        let callable = (callee.is_evaluable() || is_index_access(callee)) && !is_condition;
        if callable && elements[i + 1].is_node(NodeKind::ParenthesisPair) {
            let children = take(elements, i, i + 1);
            return insert(elements, i, ParserNode::new(NodeKind::FunctionCall, children));
        }
    }
    false
}

fn is_keyword_condition_start(previous: Option<&Element>) -> bool {
    previous.is_some_and(|p| p.is_keyword("if") || p.is_keyword("elif") || p.is_keyword("while"))
}

/// Reduce `base.member[index].call(args)` into an accessor chain.
///
/// A bare dot or unconverted square bracket pair marks the chain that
/// follows it as incomplete: its base is still waiting on another rule.
/// The mark holds until an element ends that chain.
pub(crate) fn accessor_chain(elements: &mut Vec<Element>) -> bool {
    let mut state = 0;
    let mut start = 0;
    let mut end = None;
    let mut chain_invalid = false;

    for i in 0..elements.len() {
        let current = &elements[i];
        let previous = i.checked_sub(1).and_then(|p| at(elements, p));

        let is_square = current.is_node(NodeKind::SquareBracketPair);
        let is_index = is_index_access(current);
        let is_call_on_index = matches!(
            current,
            Element::Node(n) if n.kind == NodeKind::FunctionCall
                && n.children.first().is_some_and(is_index_access)
        );
        let is_accessor =
            current.is_node(NodeKind::FunctionCall) || current.is_identifier() || is_index;
        let is_initial = current.is_evaluable();
        let is_invalid_follow_up = current.is_node(NodeKind::ParenthesisPair)
            || current.is_node(NodeKind::Array)
            || current.is_token(TokenKind::Dot)
            || current.is_token(TokenKind::LParen)
            || current.is_token(TokenKind::LBracket);
        let is_separator = current.is_token(TokenKind::Dot);

        if state == 0 && (is_separator || is_square) {
            chain_invalid = true;
        } else if is_keyword_condition_start(previous) {
            state = 0;
            chain_invalid = false;
        } else if state == 0 && (is_accessor || is_initial) {
            state = 1;
            start = i;
        } else if state == 1 && is_separator {
            state = 2;
        } else if state == 1 && (is_index || is_call_on_index) {
            state = 3;
        } else if state == 2 && is_accessor {
            state = 3;
        } else if state == 2 && is_invalid_follow_up {
            state = 0;
        } else if state == 3 && is_separator {
            state = 2;
        } else if state == 3 && is_invalid_follow_up {
            state = 0;
        } else if state == 3 {
            if chain_invalid {
                state = 0;
                chain_invalid = false;
            } else {
                end = Some(i);
                break;
            }
        } else {
            state = 0;
            chain_invalid = false;
        }
    }

    let Some(end) = end else {
        return false;
    };

    let mut segments = Vec::new();
    for element in take(elements, start, end - 1) {
        match element {
            Element::Node(node) if node.kind == NodeKind::FunctionCall => {
                push_call_segments(node, &mut segments)
            }
            Element::Node(node) if node.kind == NodeKind::SquareBracketPair => {
                if let Some(index) = node.children.into_iter().next() {
                    segments.push(into_code_block(index).into());
                }
            }
            Element::Token(token) if token.kind == TokenKind::Dot => {}
            other => segments.push(other),
        }
    }
    insert(
        elements,
        start,
        ParserNode::new(NodeKind::IdentifierAccessed, segments),
    )
}

/// Unfold `callee(args)` into chain segments: the callee's own segments
/// followed by a call node holding only the arguments.
fn push_call_segments(call: ParserNode, segments: &mut Vec<Element>) {
    let mut children = call.children.into_iter();
    match children.next() {
        Some(Element::Node(callee)) if callee.kind == NodeKind::FunctionCall => {
            push_call_segments(callee, segments)
        }
        Some(Element::Node(callee)) if callee.kind == NodeKind::SquareBracketPair => {
            if let Some(index) = callee.children.into_iter().next() {
                segments.push(into_code_block(index).into());
            }
        }
        Some(Element::Node(callee)) if callee.kind == NodeKind::IdentifierAccessed => {
            segments.extend(callee.children)
        }
        Some(callee) => segments.push(callee),
        None => {}
    }
    segments.push(ParserNode::new(NodeKind::FunctionCall, children.collect()).into());
}

/// A square bracket pair that does not follow a value is an array literal.
/// A closing bracket still waiting to be paired, or an index that stayed a
/// pair, counts as a value.
pub(crate) fn array(elements: &mut Vec<Element>) -> bool {
    let mut after_value = false;
    for element in elements.iter_mut() {
        if let Element::Node(node) = element {
            if !after_value && node.kind == NodeKind::SquareBracketPair {
                node.kind = NodeKind::Array;
                return true;
            }
        }
        after_value = element.is_evaluable()
            || element.is_token(TokenKind::RParen)
            || element.is_token(TokenKind::RBracket)
            || element.is_node(NodeKind::SquareBracketPair);
    }
    false
}

// ─────────────────────────────────────────────────────────────────────
// Functions
// ─────────────────────────────────────────────────────────────────────

fn is_function_body(element: &Element) -> bool {
    element.is_node(NodeKind::CodeBlock) || element.is_finished_statement()
}

/// The next element would keep extending an inline function body. Pipeline
/// operators end the body so `a |> x -> x + 1 |> f` chains.
fn extends_function_body(next: Option<&Element>) -> bool {
    next.is_some_and(|n| {
        let pipeline = n.is_operator("|>") || n.is_operator(">|");
        (continues_expression(Some(n)) && !pipeline) || n.is_token(TokenKind::LBrace)
    })
}

/// `params -> body`; a bare identifier parameter is wrapped in parentheses.
pub(crate) fn inline_function(elements: &mut Vec<Element>) -> bool {
    let mut state = 0;
    let mut start = 0;
    let mut end = None;

    for i in 0..elements.len() {
        let element = &elements[i];
        if state == 1 && element.is_operator("->") {
            state = 2;
        } else if state == 2
            && is_function_body(element)
            && !extends_function_body(at(elements, i + 1))
        {
            end = Some(i);
            break;
        } else if element.is_evaluable() {
            state = 1;
            start = i;
        } else {
            state = 0;
        }
    }

    let Some(end) = end else {
        return false;
    };
    let Ok([params, _arrow, body]) = <[Element; 3]>::try_from(take(elements, start, end)) else {
        return false;
    };
    let params = match params {
        Element::Token(token) if token.kind == TokenKind::Identifier => {
            ParserNode::new(NodeKind::ParenthesisPair, vec![token.into()]).into()
        }
        other => other,
    };
    insert(
        elements,
        start,
        ParserNode::new(
            NodeKind::FunctionInline,
            vec![params, into_code_block(body).into()],
        ),
    )
}

fn flatten_call(element: Element) -> Vec<Element> {
    match element {
        Element::Node(node) if node.kind == NodeKind::FunctionCall => node.children,
        other => vec![other],
    }
}

fn declaration(children: Vec<Element>) -> ParserNode {
    ParserNode::new(NodeKind::FunctionDeclaration, children)
}

/// `f(x) = body`
pub(crate) fn declaration_assigned(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len().saturating_sub(2) {
        let matched = elements[i].is_node(NodeKind::FunctionCall)
            && elements[i + 1].is_operator("=")
            && (elements[i + 2].is_evaluable()
                || elements[i + 2].is_node(NodeKind::CodeBlock)
                || elements[i + 2].is_node(NodeKind::Return));
        if matched {
            let mut parts = take(elements, i, i + 2).into_iter();
            let mut children = parts.next().map(flatten_call).unwrap_or_default();
            if let Some(body) = parts.nth(1) {
                children.push(into_code_block(body).into());
            }
            return insert(elements, i, declaration(children));
        }
    }
    false
}

/// `f(x) { … }`
pub(crate) fn declaration_block(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len().saturating_sub(1) {
        let matched = elements[i].is_node(NodeKind::FunctionCall)
            && (elements[i + 1].is_node(NodeKind::CodeBlock)
                || elements[i + 1].is_node(NodeKind::Return));
        if matched {
            let mut parts = take(elements, i, i + 1).into_iter();
            let mut children = parts.next().map(flatten_call).unwrap_or_default();
            if let Some(body) = parts.next() {
                children.push(into_code_block(body).into());
            }
            return insert(elements, i, declaration(children));
        }
    }
    false
}

/// `f = x -> …`, lifted by [`declaration_fixup`].
pub(crate) fn declaration_inline(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len().saturating_sub(2) {
        let matched = elements[i].is_identifier()
            && elements[i + 1].is_operator("=")
            && elements[i + 2].is_node(NodeKind::FunctionInline);
        if matched {
            let children = take(elements, i, i + 2)
                .into_iter()
                .filter(|e| !e.is_operator("="))
                .collect();
            return insert(elements, i, declaration(children));
        }
    }
    false
}

/// `native f()`: the body is supplied by the host.
pub(crate) fn declaration_native(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len().saturating_sub(1) {
        if elements[i].is_keyword("native") && elements[i + 1].is_node(NodeKind::FunctionCall) {
            let mut parts = take(elements, i, i + 1).into_iter();
            let mut children: Vec<Element> = parts.next().into_iter().collect();
            children.extend(parts.next().map(flatten_call).unwrap_or_default());
            return insert(elements, i, declaration(children));
        }
    }
    false
}

/// `new Type(args)`
pub(crate) fn constructor_call(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len().saturating_sub(1) {
        if elements[i].is_keyword("new") && elements[i + 1].is_node(NodeKind::FunctionCall) {
            let call = take(elements, i, i + 1).split_off(1);
            return insert(elements, i, ParserNode::new(NodeKind::ConstructorCall, call));
        }
    }
    false
}

// ─────────────────────────────────────────────────────────────────────
// Collections & brackets
// ─────────────────────────────────────────────────────────────────────

/// `key: value` inside a curly pair.
pub(crate) fn map_element(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len().saturating_sub(2) {
        let key = &elements[i];
        let matched = (key.is_identifier() || key.is_literal())
            && elements[i + 1].is_token(TokenKind::Colon)
            && elements[i + 2].is_evaluable()
            && at(elements, i + 3)
                .is_some_and(|n| n.is_token(TokenKind::Comma) || n.is_token(TokenKind::RBrace));
        if matched {
            let children = take(elements, i, i + 2)
                .into_iter()
                .filter(|e| !e.is_token(TokenKind::Colon))
                .collect();
            return insert(elements, i, ParserNode::new(NodeKind::MapElement, children));
        }
    }
    false
}

fn bracket_pair(
    elements: &mut Vec<Element>,
    open: TokenKind,
    close: TokenKind,
    kind: NodeKind,
    holds_statements: bool,
) -> bool {
    let mut start = None;
    let mut end = None;

    for (i, element) in elements.iter().enumerate() {
        if element.is_token(open) {
            start = Some(i);
        } else if element.is_opener() {
            start = None;
        } else if start.is_some() {
            let allowed = element.is_evaluable()
                || element.is_node(NodeKind::ListedElements)
                || (holds_statements
                    && (element.is_node(NodeKind::MapElement)
                        || element.is_node(NodeKind::Statement)
                        || element.is_node(NodeKind::Return)
                        || element.is_token(TokenKind::Newline)));
            if allowed {
                continue;
            } else if element.is_token(close) {
                end = Some(i);
                break;
            } else {
                start = None;
            }
        }
    }

    let (Some(start), Some(end)) = (start, end) else {
        return false;
    };
    let mut children = Vec::new();
    for element in take(elements, start, end) {
        match element {
            Element::Node(listed) if listed.kind == NodeKind::ListedElements => {
                children.extend(listed.children)
            }
            Element::Token(token)
                if token.kind == open || token.kind == close || token.kind == TokenKind::Newline => {}
            other => children.push(other),
        }
    }
    insert(elements, start, ParserNode::new(kind, children))
}

pub(crate) fn curly_pair(elements: &mut Vec<Element>) -> bool {
    bracket_pair(
        elements,
        TokenKind::LBrace,
        TokenKind::RBrace,
        NodeKind::CurlyBracketPair,
        true,
    )
}

pub(crate) fn square_pair(elements: &mut Vec<Element>) -> bool {
    bracket_pair(
        elements,
        TokenKind::LBracket,
        TokenKind::RBracket,
        NodeKind::SquareBracketPair,
        false,
    )
}

/// Parentheses, including a parenthesised operator such as `(-)`.
pub(crate) fn parenthesis_pair(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len().saturating_sub(2) {
        if elements[i].is_token(TokenKind::LParen)
            && elements[i + 1].is_token(TokenKind::Operator)
            && elements[i + 2].is_token(TokenKind::RParen)
        {
            let operator = take(elements, i, i + 2).swap_remove(1);
            return insert(
                elements,
                i,
                ParserNode::new(NodeKind::ParenthesisPair, vec![operator]),
            );
        }
    }
    bracket_pair(
        elements,
        TokenKind::LParen,
        TokenKind::RParen,
        NodeKind::ParenthesisPair,
        false,
    )
}

/// `a, b, c` directly followed by a list finisher.
pub(crate) fn listed_elements(elements: &mut Vec<Element>) -> bool {
    let mut start = None;
    let mut end = None;
    let mut count = 0;
    let mut includes_plain = false;
    let mut requires_comma = false;

    for i in 0..elements.len() {
        let current = &elements[i];
        let next = at(elements, i + 1);
        let after_dot = i > 0 && elements[i - 1].is_token(TokenKind::Dot);

        if after_dot {
            start = None;
            count = 0;
            includes_plain = false;
        } else if !requires_comma && current.is_listable() {
            start.get_or_insert(i);
            match current {
                Element::Node(listed) if listed.kind == NodeKind::ListedElements => {
                    count += listed.children.len()
                }
                _ => {
                    includes_plain = true;
                    count += 1;
                }
            }
            requires_comma = true;
        } else if current.is_token(TokenKind::Comma) {
            let continues = next.is_some_and(|n| {
                n.is_evaluable()
                    || n.is_node(NodeKind::ListedElements)
                    || n.is_node(NodeKind::ParenthesisPair)
                    || n.is_node(NodeKind::MapElement)
            });
            if count > 0 && !continues {
                start = None;
                count = 0;
                includes_plain = false;
            }
            requires_comma = false;
        } else if current.is_opener() {
            start = None;
            count = 0;
            includes_plain = false;
            requires_comma = false;
        } else if start.is_some() && includes_plain && count > 1 && current.is_list_finisher() {
            end = Some(i - 1);
            break;
        } else if start.is_some() {
            start = None;
            count = 0;
            includes_plain = false;
            requires_comma = false;
        }
    }

    let (Some(start), Some(end)) = (start, end) else {
        return false;
    };
    let mut children = Vec::new();
    for element in take(elements, start, end) {
        match element {
            Element::Node(listed) if listed.kind == NodeKind::ListedElements => {
                children.extend(listed.children)
            }
            Element::Token(token) if token.kind == TokenKind::Comma => {}
            other => children.push(other),
        }
    }
    insert(
        elements,
        start,
        ParserNode::new(NodeKind::ListedElements, children),
    )
}

// ─────────────────────────────────────────────────────────────────────
// Statements & control flow
// ─────────────────────────────────────────────────────────────────────

/// `target = value`
pub(crate) fn assignment(elements: &mut Vec<Element>) -> bool {
    for i in 1..elements.len().saturating_sub(1) {
        let matched = elements[i].is_operator("=")
            && elements[i - 1].is_assignable()
            && elements[i + 1].is_evaluable()
            && !at(elements, i + 2).is_some_and(|e| e.is_operator("->"));
        if matched {
            let children = take(elements, i - 1, i + 1)
                .into_iter()
                .filter(|e| !e.is_operator("="))
                .collect();
            return insert(elements, i - 1, ParserNode::new(NodeKind::Assignment, children));
        }
    }
    false
}

fn is_branch_body(element: &Element) -> bool {
    is_loop_or_branch_body(element) || element.is_node(NodeKind::Return)
}

/// `if (c) a elif (d) b else e`. The conditional is only built once the
/// element after its last branch is known not to extend it.
pub(crate) fn conditional(elements: &mut Vec<Element>) -> bool {
    let mut start = None;
    let mut end = 0;
    let mut branches: Vec<(Option<usize>, usize)> = Vec::new();
    let mut complete = false;

    let mut i = 0;
    while i < elements.len() {
        let element = &elements[i];
        let mut is_else = false;
        let mut starter = false;

        if element.is_keyword("if") {
            start = Some(i);
            branches.clear();
            starter = true;
        } else if element.is_keyword("elif") {
            if start.is_none() {
                i += 1;
                continue;
            }
        } else if element.is_keyword("else") {
            if start.is_none() {
                i += 1;
                continue;
            }
            is_else = true;
        } else if start.is_some() && !branches.is_empty() {
            complete = true;
            break;
        }

        if starter || !branches.is_empty() {
            let (condition, body) = if is_else { (None, i + 1) } else { (Some(i + 1), i + 2) };
            let condition_ok = condition.map_or(true, |c| {
                at(elements, c).is_some_and(|e| e.is_node(NodeKind::ParenthesisPair))
            });
            if !condition_ok || !at(elements, body).is_some_and(is_branch_body) {
                start = None;
                branches.clear();
                i += 1;
                continue;
            }
            branches.push((condition, body));
            end = body;
            if is_else {
                complete = true;
                break;
            }
            i = body;
        }
        i += 1;
    }

    let (true, Some(start)) = (complete, start) else {
        return false;
    };
    let mut slots: Vec<Option<Element>> = take(elements, start, end).into_iter().map(Some).collect();
    let mut children = Vec::with_capacity(branches.len());
    for (condition, body) in branches {
        let mut branch = Vec::with_capacity(2);
        if let Some(condition) = condition.and_then(|c| slots[c - start].take()) {
            branch.push(condition);
        }
        if let Some(body) = slots[body - start].take() {
            branch.push(into_code_block(body).into());
        }
        children.push(ParserNode::new(NodeKind::ConditionalBranch, branch).into());
    }
    insert(elements, start, ParserNode::new(NodeKind::Conditional, children))
}

fn match_for(elements: &[Element], start: usize) -> Option<(usize, usize, usize)> {
    let mut i = start + 1;
    if !at(elements, i)?.is_token(TokenKind::LParen) {
        return None;
    }
    i += 1;
    let variable = at(elements, i)?;
    let variable_ok = variable.is_identifier()
        || variable.is_node(NodeKind::ParenthesisPair)
        || variable.is_node(NodeKind::Array)
        || variable.is_node(NodeKind::SquareBracketPair);
    if !variable_ok {
        return None;
    }
    let variable = i;
    i += 1;
    while at(elements, i)?.is_token(TokenKind::Colon) || at(elements, i)?.is_keyword("in") {
        i += 1;
    }
    if !at(elements, i)?.is_evaluable() {
        return None;
    }
    let iterable = i;
    i += 1;
    if !at(elements, i)?.is_token(TokenKind::RParen) {
        return None;
    }
    i += 1;
    if !is_loop_or_branch_body(at(elements, i)?) || continues_expression(at(elements, i + 1)) {
        return None;
    }
    Some((variable, iterable, i))
}

/// `for (x in xs) body`, also `for ((k, v) : m) body`.
pub(crate) fn for_loop(elements: &mut Vec<Element>) -> bool {
    for start in 0..elements.len() {
        if !elements[start].is_keyword("for") {
            continue;
        }
        let Some((variable, iterable, body)) = match_for(elements, start) else {
            continue;
        };
        let mut slots: Vec<Option<Element>> =
            take(elements, start, body).into_iter().map(Some).collect();
        let children = [variable, iterable, body]
            .into_iter()
            .filter_map(|idx| slots[idx - start].take())
            .enumerate()
            .map(|(n, e)| if n == 2 { into_code_block(e).into() } else { e })
            .collect();
        return insert(elements, start, ParserNode::new(NodeKind::LoopFor, children));
    }
    false
}

/// `while (condition) body`
pub(crate) fn while_loop(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len().saturating_sub(2) {
        let matched = elements[i].is_keyword("while")
            && elements[i + 1].is_node(NodeKind::ParenthesisPair)
            && is_loop_or_branch_body(&elements[i + 2])
            && !continues_expression(at(elements, i + 3));
        if matched {
            let mut parts = take(elements, i, i + 2).into_iter().skip(1);
            let children = match (parts.next(), parts.next()) {
                (Some(condition), Some(body)) => vec![condition, into_code_block(body).into()],
                _ => return false,
            };
            return insert(elements, i, ParserNode::new(NodeKind::LoopWhile, children));
        }
    }
    false
}

/// `return value` or a bare `return`. The finisher is left in place.
pub(crate) fn return_statement(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len() {
        if !elements[i].is_keyword("return") {
            continue;
        }
        let next = at(elements, i + 1);
        if next.is_some_and(Element::is_evaluable)
            && at(elements, i + 2).is_some_and(Element::is_statement_finisher)
        {
            let value = take(elements, i, i + 1).split_off(1);
            return insert(elements, i, ParserNode::new(NodeKind::Return, value));
        }
        if next.is_some_and(Element::is_statement_finisher) {
            elements.remove(i);
            return insert(elements, i, ParserNode::new(NodeKind::Return, Vec::new()));
        }
    }
    false
}

/// A finished element followed by a statement finisher.
pub(crate) fn statement(elements: &mut Vec<Element>) -> bool {
    for i in 0..elements.len().saturating_sub(1) {
        if elements[i].is_finished_statement() && elements[i + 1].is_statement_finisher() {
            let last = if consumes_finisher(&elements[i + 1]) { i + 1 } else { i };
            let mut taken = take(elements, i, last);
            taken.truncate(1);
            return insert(elements, i, ParserNode::new(NodeKind::Statement, taken));
        }
    }
    false
}
