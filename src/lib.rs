//! A short-circuiting boolean/arithmetic expression engine over
//! host-supplied predicate atoms.
//!
//! Callers implement [`Subr`] to tell the engine how to parse and evaluate
//! their own predicate vocabulary, then hand a textual expression to
//! [`Expr::parse`]. The resulting handle can be evaluated repeatedly
//! against different runtime contexts; it short-circuits on `&`/`|`/
//! comparison operators, tracks per-atom hit rate and mean runtime, and
//! periodically reorders sibling subexpressions so cheap, high-hitting
//! atoms run first.
//!
//! Evaluation never fails: only [`Expr::parse`] returns a [`ParseError`].

mod engine;

pub use engine::{Expr, Flags, ParseError, Subr};
