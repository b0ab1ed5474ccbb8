//! The shunting-yard driver.
//!
//! Builds an [`Ast`] from source text in a single left-to-right pass, using
//! the classic two-stack shunting-yard algorithm: an operand stack of
//! already-built subtrees and an operator stack awaiting a lower-or-equal
//! precedence operator (or a closing brace) to trigger their reduction.
//!
//! Two departures from a textbook shunting-yard parser, both driven by the
//! operator set this engine supports:
//!
//! - A comparison operator (`>=`, `>`, `<=`, `<`) is never left on the
//!   operator stack. Its right-hand `Limit` operand is mandatory and must
//!   immediately follow in the source, so as soon as one is recognised its
//!   left-hand operand is flushed off the operand stack (via the normal
//!   precedence-popping rule) and the comparison node is built on the spot.
//! - Reducing `Plus`/`Mult`/`And`/`Or` doesn't always allocate a fresh node:
//!   if either operand is already an `Op` node of the same kind, the other
//!   operand joins its child list instead, so a long chain like
//!   `a + b + c + d` ends up as one 4-ary `Plus` node rather than a
//!   right-leaning binary tree.

use rand::Rng;

use crate::engine::ast::{Ast, NodeIndex};
use crate::engine::atom::{AtomSlot, Subr};
use crate::engine::error::{ParseError, Result};
use crate::engine::lexer;
use crate::engine::operators::Operator;

struct PendingOp {
    op: Operator,
    offset: usize,
    /// Depth of the operand stack at the moment this operator was pushed.
    /// A unary operator's single operand must arrive *after* it, so if the
    /// operand stack hasn't grown past this floor by the time it's reduced,
    /// nothing was ever supplied — there's no well-formed operand to pop,
    /// only whatever an outer, still-pending operator left behind.
    floor: usize,
}

enum StackEntry {
    Op(PendingOp),
    OBrace { offset: usize },
}

struct Parser<'src, 'r, A> {
    input: &'src str,
    pos: usize,
    ast: Ast<'src, A>,
    operands: Vec<NodeIndex>,
    operators: Vec<StackEntry>,
    rng: &'r mut dyn rand::RngCore,
    /// Whether the next token should be an operand (an atom, `(`, or a
    /// unary prefix operator) rather than a binary operator or `)`. This is
    /// what lets `and`/`or` be told apart from atom text that merely starts
    /// with those letters: the keyword form is only recognised between two
    /// operands, never at a position where an atom is expected (`not` is
    /// exempt, being a unary prefix).
    expect_operand: bool,
}

/// Parse `input` into a completed [`Ast`], delegating atom recognition to
/// `subr`. `rng` seeds the per-atom `nonce` used by the runtime-sampling
/// jitter in `eval`.
pub(crate) fn parse<'src, S>(
    subr: &mut S,
    input: &'src str,
    rng: &mut impl rand::RngCore,
) -> Result<Ast<'src, S::Atom>>
where
    S: Subr<'src>,
{
    let mut p = Parser {
        input,
        pos: 0,
        ast: Ast {
            nodes: Vec::new(),
            root: 0,
        },
        operands: Vec::new(),
        operators: Vec::new(),
        rng,
        expect_operand: true,
    };
    p.run(subr)?;
    p.finish()
}

impl<'src, 'r, A> Parser<'src, 'r, A> {
    fn rest(&self) -> &'src str {
        &self.input[self.pos..]
    }

    fn skip_spaces(&mut self) {
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() && lexer::is_space(bytes[self.pos]) {
            self.pos += 1;
        }
    }

    fn run<S>(&mut self, subr: &mut S) -> Result<()>
    where
        S: Subr<'src, Atom = A>,
    {
        loop {
            self.skip_spaces();
            if self.pos >= self.input.len() {
                break;
            }
            let byte = self.input.as_bytes()[self.pos];

            if byte == b'(' {
                self.operators.push(StackEntry::OBrace { offset: self.pos });
                self.pos += 1;
                self.expect_operand = true;
                continue;
            }
            if byte == b')' {
                self.close_paren()?;
                continue;
            }

            if let Some(op) = self.match_operator() {
                self.apply_operator(op)?;
                continue;
            }

            self.parse_atom(subr)?;
        }
        Ok(())
    }

    /// Try to recognise an operator at the current position, without
    /// consuming input. Returns the operator, its source offset, and the
    /// number of bytes it occupies — including a trailing `(N)` arity
    /// annotation when one immediately follows (see
    /// `lexer::arity_annotation_len`), so the pretty-printer's own output
    /// re-lexes as a single operator token rather than spilling an extra
    /// operand onto the stack.
    fn match_operator(&self) -> Option<(Operator, usize, usize)> {
        let rest = self.rest();
        let byte = *rest.as_bytes().first()?;

        if lexer::is_operator_candidate_byte(byte) && !lexer::disqualified_by_colon(rest) {
            if let Some((op, len)) = lexer::match_symbol_operator(rest) {
                let len = len + lexer::arity_annotation_len(&rest[len..], op);
                return Some((op, self.pos, len));
            }
        }
        if byte.is_ascii_alphabetic() {
            if let Some((op, len)) = lexer::match_keyword_operator(rest) {
                // `and`/`or` only stand for operators between two operands;
                // at a position where an atom is expected they're just text
                // the host's `parse` gets to accept or reject like any
                // other atom. `not`, being a unary prefix, is always valid.
                if op.is_unary() || !self.expect_operand {
                    let len = len + lexer::arity_annotation_len(&rest[len..], op);
                    return Some((op, self.pos, len));
                }
            }
        }
        None
    }

    fn parse_atom<S>(&mut self, subr: &mut S) -> Result<()>
    where
        S: Subr<'src, Atom = A>,
    {
        let offset = self.pos;
        // SAFETY of lifetime: `self.input` is `&'src str`, so the slice
        // handed to the host and retained in `AtomSlot::text` legitimately
        // borrows for `'src`, not just for the duration of this call.
        let input: &'src str = self.input;
        let (data, consumed) = subr
            .parse(&input[offset..])
            .map_err(|source| ParseError::AtomParseFailed { offset, source })?;
        if consumed == 0 {
            return Err(ParseError::AtomParseFailed {
                offset,
                source: "atom parser consumed zero bytes".into(),
            });
        }
        let text = &input[offset..offset + consumed];
        let nonce = self.rng.gen();
        let idx = self.ast.push_atom(AtomSlot {
            data,
            text,
            hits: 0,
            avg_ticks: 0.0,
            nonce,
        });
        self.operands.push(idx);
        self.pos += consumed;
        self.expect_operand = false;
        Ok(())
    }

    fn apply_operator(&mut self, matched: (Operator, usize, usize)) -> Result<()> {
        let (op, offset, len) = matched;

        if op.is_unary() {
            let floor = self.operands.len();
            self.operators
                .push(StackEntry::Op(PendingOp { op, offset, floor }));
            self.pos += len;
            return Ok(());
        }

        self.flush_for_precedence(op.precedence())?;
        self.pos += len;

        if op.is_comparison() {
            self.skip_spaces();
            let limit_offset = self.pos;
            let (value, consumed) = lexer::match_limit(self.rest())
                .ok_or(ParseError::EmptyLimit { offset: limit_offset })?;
            self.pos += consumed;
            let limit = self.ast.push_limit(value);
            let lhs = self
                .operands
                .pop()
                .ok_or(ParseError::BinaryMissingOperand { offset })?;
            // `Limit` is always the first child of a comparison node — see
            // the invariant in ast.rs — so the resort's "limit sorts first"
            // rule and the pretty-printer's rendering stay trivial.
            let node = self.ast.push_op(op, vec![limit, lhs]);
            self.operands.push(node);
            self.expect_operand = false;
            return Ok(());
        }

        let floor = self.operands.len();
        self.operators
            .push(StackEntry::Op(PendingOp { op, offset, floor }));
        self.expect_operand = true;
        Ok(())
    }

    /// Pop and reduce operators whose precedence is at least `incoming`,
    /// stopping at an unmatched `(` or an empty stack. Comparisons never sit
    /// on the stack long enough to be popped here (see `apply_operator`).
    fn flush_for_precedence(&mut self, incoming: i32) -> Result<()> {
        loop {
            match self.operators.last() {
                Some(StackEntry::Op(pending)) if pending.op.precedence() >= incoming => {
                    self.reduce_top()?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn close_paren(&mut self) -> Result<()> {
        let close_offset = self.pos;
        loop {
            match self.operators.last() {
                Some(StackEntry::OBrace { .. }) => {
                    self.operators.pop();
                    self.pos += 1;
                    self.expect_operand = false;
                    return Ok(());
                }
                Some(StackEntry::Op(_)) => {
                    self.reduce_top()?;
                }
                None => return Err(ParseError::BraceMismatch { offset: close_offset }),
            }
        }
    }

    /// Pop the top operator and reduce it against the operand stack,
    /// flattening chains of the same associative operator instead of always
    /// allocating a fresh binary node.
    fn reduce_top(&mut self) -> Result<()> {
        let pending = match self.operators.pop() {
            Some(StackEntry::Op(p)) => p,
            Some(StackEntry::OBrace { .. }) | None => unreachable!("caller checked the top entry"),
        };
        let PendingOp { op, offset, floor } = pending;

        if op.is_unary() {
            // The operand stack must have grown past where it stood when
            // this `Not` was pushed — otherwise the only thing sitting on
            // top belongs to an outer, still-pending operator, not to this
            // one, and popping it anyway would silently steal it.
            if self.operands.len() <= floor {
                return Err(ParseError::UnaryMissingOperand { offset });
            }
            let a = self.operands.pop().unwrap();
            let node = self.ast.push_op(op, vec![a]);
            self.operands.push(node);
            return Ok(());
        }

        if self.operands.len() < 2 {
            return Err(ParseError::BinaryMissingOperand { offset });
        }
        let a2 = self.operands.pop().unwrap();
        let a1 = self.operands.pop().unwrap();

        // `op` is always one of the flattenable kinds here: unary `Not` and
        // the comparisons are both diverted before reaching this branch.
        if self.ast.is_op(a1, op) {
            self.ast.append_child(a1, a2);
            self.operands.push(a1);
        } else if self.ast.is_op(a2, op) {
            self.ast.prepend_child(a2, a1);
            self.operands.push(a2);
        } else {
            let node = self.ast.push_op(op, vec![a1, a2]);
            self.operands.push(node);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Ast<'src, A>> {
        let end = self.input.len();
        while let Some(entry) = self.operators.last() {
            match entry {
                StackEntry::OBrace { offset } => {
                    return Err(ParseError::BraceMismatch { offset: *offset })
                }
                StackEntry::Op(_) => self.reduce_top()?,
            }
        }
        if self.operands.len() != 1 {
            return Err(ParseError::OperatorMismatch {
                offset: end,
                found: self.operands.len(),
            });
        }
        self.ast.root = self.operands[0];
        Ok(self.ast)
    }
}
