//! The pretty-printer (C7): render an [`Ast`] back to canonical text.
//!
//! Atoms render as `(text)`, limits as an integer if they round-trip
//! exactly through `as i64 as f64`, otherwise as a decimal. An n-ary
//! operator node (more than two children) annotates its arity, e.g.
//! `& (3)`, since the symbol alone doesn't say how many operands it binds.

use crate::engine::ast::{Ast, NodeIndex, NodeKind};
use crate::engine::operators::Operator;

/// Render `ast` to its canonical text form.
pub(crate) fn to_text<A>(ast: &Ast<A>) -> String {
    let mut out = String::new();
    write_node(ast, ast.root, &mut out);
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

fn write_node<A>(ast: &Ast<A>, idx: NodeIndex, out: &mut String) {
    match &ast.nodes[idx].kind {
        NodeKind::Atom(slot) => {
            out.push('(');
            out.push_str(slot.text);
            out.push(')');
            out.push(' ');
        }
        NodeKind::Limit(v) => {
            write_limit(*v, out);
            out.push(' ');
        }
        NodeKind::Op(op) if op.is_comparison() => {
            // Canonical form reads as written: operand, symbol, limit,
            // regardless of the limit's position as first child internally.
            let children = &ast.nodes[idx].children;
            let limit = children.iter().copied().find(|&c| ast.is_limit(c));
            let operand = children.iter().copied().find(|&c| !ast.is_limit(c));
            if let Some(operand) = operand {
                write_node(ast, operand, out);
            }
            out.push_str(op.as_str());
            out.push(' ');
            if let Some(limit) = limit {
                write_node(ast, limit, out);
            }
        }
        NodeKind::Op(op) if *op == Operator::Not => {
            out.push_str(op.as_str());
            out.push(' ');
            for &child in &ast.nodes[idx].children {
                write_node(ast, child, out);
            }
        }
        NodeKind::Op(op) => {
            // The `(N)` arity suffix on the first occurrence of the symbol
            // is purely decorative: `parser::match_operator` re-lexes it as
            // part of that operator token via `lexer::arity_annotation_len`
            // rather than as a parenthesised group, so it never becomes a
            // spurious operand on reparse.
            let children = &ast.nodes[idx].children;
            for (i, &child) in children.iter().enumerate() {
                if i > 0 {
                    out.push_str(op.as_str());
                    if children.len() > 2 && i == 1 {
                        out.push_str(&format!(" ({})", children.len()));
                    }
                    out.push(' ');
                }
                write_node(ast, child, out);
            }
        }
    }
}

fn write_limit(v: f64, out: &mut String) {
    if v == (v as i64) as f64 {
        out.push_str(&(v as i64).to_string());
    } else {
        out.push_str(&v.to_string());
    }
}
