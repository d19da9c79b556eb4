//! Source reconstruction: render a parse tree back into compact Menter
//! code. Used for parse error context, stack traces and `reflect` output.

use menter_lexer::TokenKind;

use crate::node::{Element, NodeKind, ParserNode};

/// Render an element as Menter source.
pub fn reconstruct(element: &Element) -> String {
    let mut out = String::new();
    write_element(element, &mut out);
    out.trim().to_string()
}

impl ParserNode {
    /// Render this node as Menter source.
    pub fn reconstruct(&self) -> String {
        let mut out = String::new();
        write_node(self, &mut out);
        out.trim().to_string()
    }
}

fn write_element(element: &Element, out: &mut String) {
    match element {
        Element::Token(token) => match token.kind {
            TokenKind::Newline | TokenKind::Eof => {}
            _ => out.push_str(&token.to_string()),
        },
        Element::Node(node) => write_node(node, out),
    }
}

fn write_joined(children: &[Element], separator: &str, out: &mut String) {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        write_element(child, out);
    }
}

fn write_child(node: &ParserNode, index: usize, out: &mut String) {
    if let Some(child) = node.children.get(index) {
        write_element(child, out);
    }
}

fn write_node(node: &ParserNode, out: &mut String) {
    match node.kind {
        NodeKind::Root => node.children.iter().for_each(|c| write_element(c, out)),

        NodeKind::Expression => match &node.operator {
            Some(op) => {
                let mut operands = node.children.iter();
                if op.left {
                    if let Some(left) = operands.next() {
                        write_element(left, out);
                    }
                    if op.right {
                        out.push(' ');
                    }
                }
                out.push_str(&op.symbol);
                if op.right {
                    if op.left {
                        out.push(' ');
                    }
                    if let Some(right) = operands.next() {
                        write_element(right, out);
                    }
                }
            }
            None => node.children.iter().for_each(|c| write_element(c, out)),
        },

        NodeKind::Statement => {
            node.children.iter().for_each(|c| write_element(c, out));
            out.push_str("; ");
        }

        NodeKind::Assignment => {
            write_child(node, 0, out);
            out.push_str(" = ");
            write_child(node, 1, out);
        }

        NodeKind::IdentifierAccessed => {
            for (i, segment) in node.children.iter().enumerate() {
                match segment {
                    Element::Node(block) if block.kind == NodeKind::CodeBlock => {
                        out.push('[');
                        write_joined(&block.children, ", ", out);
                        out.push(']');
                    }
                    Element::Node(call) if call.kind == NodeKind::FunctionCall => {
                        write_node(call, out)
                    }
                    other => {
                        if i > 0 {
                            out.push('.');
                        }
                        write_element(other, out);
                    }
                }
            }
        }

        NodeKind::ParenthesisPair => {
            out.push('(');
            write_joined(&node.children, ", ", out);
            out.push(')');
        }
        NodeKind::SquareBracketPair | NodeKind::Array => {
            out.push('[');
            write_joined(&node.children, ", ", out);
            out.push(']');
        }
        NodeKind::CurlyBracketPair | NodeKind::Map => {
            out.push('{');
            write_joined(&node.children, ", ", out);
            out.push('}');
        }
        NodeKind::ListedElements => write_joined(&node.children, ", ", out),
        NodeKind::MapElement => {
            write_child(node, 0, out);
            out.push_str(": ");
            write_child(node, 1, out);
        }

        NodeKind::CodeBlock => {
            out.push_str("{ ");
            for child in &node.children {
                write_element(child, out);
                out.push_str("; ");
            }
            out.push('}');
        }

        NodeKind::FunctionDeclaration => {
            if node.children.first().is_some_and(|c| c.is_keyword("native")) {
                out.push_str("native ");
                write_child(node, 1, out);
                write_child(node, 2, out);
            } else {
                write_child(node, 0, out);
                out.push_str(" = ");
                write_child(node, 1, out);
                out.push_str(" -> ");
                write_child(node, 2, out);
            }
        }
        NodeKind::FunctionCall => node.children.iter().for_each(|c| write_element(c, out)),
        NodeKind::FunctionInline => {
            write_child(node, 0, out);
            out.push_str(" -> ");
            write_child(node, 1, out);
        }

        NodeKind::Conditional => {
            for (i, branch) in node.children.iter().enumerate() {
                let has_condition = branch.as_node().is_some_and(|b| b.children.len() == 2);
                match (i, has_condition) {
                    (0, _) => out.push_str("if "),
                    (_, true) => out.push_str(" else if "),
                    (_, false) => out.push_str(" else "),
                }
                write_element(branch, out);
            }
        }
        NodeKind::ConditionalBranch => write_joined(&node.children, " ", out),

        NodeKind::LoopFor => {
            out.push_str("for (");
            write_child(node, 0, out);
            out.push_str(" in ");
            write_child(node, 1, out);
            out.push_str(") ");
            write_child(node, 2, out);
        }
        NodeKind::LoopWhile => {
            out.push_str("while ");
            write_child(node, 0, out);
            out.push(' ');
            write_child(node, 1, out);
        }

        NodeKind::Return => {
            out.push_str("return");
            if !node.children.is_empty() {
                out.push(' ');
                write_child(node, 0, out);
            }
        }
        NodeKind::ConstructorCall => {
            out.push_str("new ");
            write_child(node, 0, out);
        }

        NodeKind::ImportStatement => {
            out.push_str("import ");
            write_child(node, 0, out);
        }
        NodeKind::ImportInlineStatement => {
            out.push_str("import ");
            write_child(node, 0, out);
            out.push_str(" inline");
        }
        NodeKind::ImportAsStatement => {
            out.push_str("import ");
            write_child(node, 0, out);
            out.push_str(" as ");
            write_child(node, 1, out);
        }
        NodeKind::ExportStatement => {
            out.push_str("export ");
            write_child(node, 0, out);
            out.push_str(" as ");
            write_child(node, 1, out);
        }
    }
}
