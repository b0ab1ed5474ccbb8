//! The boolean/arithmetic expression engine.
//!
//! [`Expr`] is the handle callers hold: it owns the parsed tree, the host's
//! [`Subr`] implementation, and the per-handle state (`evals`, the seeded
//! PRNG, the next periodic-resort threshold) that the adaptive-priority
//! subsystem needs between calls. The five operations in the crate's
//! external surface — parse, eval, eval_track, to_text, for_each_atom — are
//! all inherent methods on this handle.

mod ast;
mod atom;
mod error;
mod eval;
mod lexer;
mod operators;
mod parser;
mod printer;
mod priority;

pub use atom::Subr;
pub use error::ParseError;
pub use eval::Flags;

use ast::{Ast, NodeKind};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

/// Lower bound of the periodic resort's randomised interval, in `eval`
/// calls.
const MIN_RESORT_EVALS: u64 = 50;

/// Width of the periodic resort's randomised interval: the next threshold
/// is drawn uniformly from `[MIN_RESORT_EVALS, MIN_RESORT_EVALS +
/// MAX_RESORT_EVALS)`.
const MAX_RESORT_EVALS: u64 = 100;

/// A parsed expression, bound to a host [`Subr`] implementation.
///
/// Not `Sync`; evaluation needs `&mut self`. `Send` whenever `S` and
/// `S::Atom`/`S::Runtime` are, since nothing here uses thread-local or
/// process-global state.
pub struct Expr<'src, S: Subr<'src>> {
    ast: Ast<'src, S::Atom>,
    subr: S,
    evals: u64,
    next_resort: u64,
    rng: StdRng,
}

impl<'src, S: Subr<'src>> Expr<'src, S> {
    /// Parse `input` against `subr`, seeding the handle's PRNG from OS
    /// entropy. This is the constructor production callers should use.
    pub fn parse(subr: S, input: &'src str) -> Result<Self, ParseError> {
        Self::parse_seeded(subr, input, StdRng::from_entropy())
    }

    /// Parse `input` against `subr`, seeding the handle's PRNG from a fixed
    /// `seed`. The resort schedule (both the initial parse-time resort and
    /// every subsequent periodic one) becomes fully deterministic, which is
    /// what test suites that assert on sibling order want.
    pub fn with_seed(subr: S, input: &'src str, seed: u64) -> Result<Self, ParseError> {
        Self::parse_seeded(subr, input, StdRng::seed_from_u64(seed))
    }

    fn parse_seeded(mut subr: S, input: &'src str, mut rng: StdRng) -> Result<Self, ParseError> {
        let mut ast = parser::parse(&mut subr, input, &mut rng)?;
        priority::rebuild_after_parse(&mut ast, |a| subr.priority(a));
        let next_resort = draw_next_resort(&mut rng);
        Ok(Expr {
            ast,
            subr,
            evals: 0,
            next_resort,
            rng,
        })
    }

    /// Evaluate the expression against `runtime`, returning the numeric
    /// result.
    pub fn eval(&mut self, runtime: &mut S::Runtime, flags: Flags) -> f64 {
        self.ast.reset_call_state();
        let result = eval::eval(&mut self.ast, &self.subr, runtime, self.evals, flags, None);
        self.on_eval_complete();
        result
    }

    /// Evaluate the expression against `runtime`, additionally returning the
    /// source text of every atom that fired, in evaluation order.
    pub fn eval_track(&mut self, runtime: &mut S::Runtime, flags: Flags) -> (f64, Vec<&'src str>) {
        self.ast.reset_call_state();
        let mut trace = Vec::new();
        let result = eval::eval(
            &mut self.ast,
            &self.subr,
            runtime,
            self.evals,
            flags,
            Some(&mut trace),
        );
        self.on_eval_complete();
        (result, trace)
    }

    /// Render the expression back to its canonical text form.
    pub fn to_text(&self) -> String {
        printer::to_text(&self.ast)
    }

    /// Visit every atom's source substring, post-order.
    pub fn for_each_atom(&self, mut visitor: impl FnMut(&'src str)) {
        for idx in self.ast.post_order() {
            if let NodeKind::Atom(slot) = &self.ast.nodes[idx].kind {
                visitor(slot.text);
            }
        }
    }

    /// Number of `eval`/`eval_track` calls made against this handle so far.
    pub fn evals(&self) -> u64 {
        self.evals
    }

    fn on_eval_complete(&mut self) {
        self.evals += 1;
        if self.evals % self.next_resort == 0 {
            priority::rebuild_cycle(&mut self.ast, |a| self.subr.priority(a));
            self.next_resort = draw_next_resort(&mut self.rng);
            tracing::debug!(
                evals = self.evals,
                next_resort = self.next_resort,
                "periodic resort"
            );
        }
    }
}

fn draw_next_resort(rng: &mut StdRng) -> u64 {
    MIN_RESORT_EVALS + rng.gen_range(0..MAX_RESORT_EVALS)
}

impl<'src, S: Subr<'src>> Drop for Expr<'src, S> {
    fn drop(&mut self) {
        let order = self.ast.post_order();
        for idx in order {
            let kind = std::mem::replace(&mut self.ast.nodes[idx].kind, NodeKind::Limit(0.0));
            if let NodeKind::Atom(slot) = kind {
                self.subr.destroy(slot.data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::error::Error as StdError;

    struct Lookup {
        destroyed: std::rc::Rc<std::cell::RefCell<Vec<char>>>,
    }

    impl<'a> Subr<'a> for Lookup {
        type Atom = char;
        type Runtime = HashMap<char, f64>;

        fn parse(
            &mut self,
            input: &'a str,
        ) -> Result<(char, usize), Box<dyn StdError + Send + Sync + 'static>> {
            let c = input.chars().next().expect("non-empty");
            Ok((c, c.len_utf8()))
        }

        fn process(&self, atom: &mut char, runtime: &mut HashMap<char, f64>) -> f64 {
            *runtime.get(atom).unwrap_or(&0.0)
        }

        fn destroy(&mut self, atom: char) {
            self.destroyed.borrow_mut().push(atom);
        }
    }

    #[test]
    fn parse_eval_to_text_round_trip() {
        let subr = Lookup {
            destroyed: Default::default(),
        };
        let mut expr = Expr::with_seed(subr, "A & B", 1).expect("parses");
        let mut runtime = HashMap::from([('A', 1.0), ('B', 1.0)]);
        assert_eq!(expr.eval(&mut runtime, Flags::default()), 1.0);
        assert_eq!(expr.to_text(), "(A) & (B)");
    }

    #[test]
    fn eval_track_reports_firing_atoms() {
        let subr = Lookup {
            destroyed: Default::default(),
        };
        let mut expr = Expr::with_seed(subr, "A | B", 1).expect("parses");
        let mut runtime = HashMap::from([('A', 0.0), ('B', 1.0)]);
        let (result, trace) = expr.eval_track(&mut runtime, Flags::default());
        assert_eq!(result, 1.0);
        assert_eq!(trace, vec!["B"]);
    }

    #[test]
    fn for_each_atom_visits_post_order() {
        let subr = Lookup {
            destroyed: Default::default(),
        };
        let expr = Expr::with_seed(subr, "A & B", 1).expect("parses");
        let mut seen = Vec::new();
        expr.for_each_atom(|text| seen.push(text.to_string()));
        assert_eq!(seen, vec!["A", "B"]);
    }

    #[test]
    fn drop_destroys_every_atom() {
        let destroyed = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let subr = Lookup {
            destroyed: destroyed.clone(),
        };
        {
            let _expr = Expr::with_seed(subr, "A & B & C", 1).expect("parses");
        }
        let mut seen = destroyed.borrow().clone();
        seen.sort();
        assert_eq!(seen, vec!['A', 'B', 'C']);
    }

    #[test]
    fn periodic_resort_fires_after_threshold_evals_and_rearms() {
        let subr = Lookup {
            destroyed: Default::default(),
        };
        let mut expr = Expr::with_seed(subr, "A | B", 42).expect("parses");
        let mut runtime = HashMap::from([('A', 0.0), ('B', 0.0)]);
        let first_threshold = expr.next_resort;
        for _ in 0..first_threshold {
            expr.eval(&mut runtime, Flags::default());
        }
        assert_eq!(expr.evals(), first_threshold);
        // A fresh threshold was drawn for the next cycle.
        assert!(expr.next_resort >= MIN_RESORT_EVALS);
        assert!(expr.next_resort < MIN_RESORT_EVALS + MAX_RESORT_EVALS);
    }

    #[test]
    fn resort_stability_promotes_high_hit_atom() {
        // `priority(A) = 5 > priority(B) = 1`, so `A` is cheaper in host
        // terms and sorts first after the very first (parse-time) resort,
        // before any dynamic-weight signal exists.
        struct Prioritized;
        impl<'a> Subr<'a> for Prioritized {
            type Atom = char;
            type Runtime = HashMap<char, f64>;

            fn parse(
                &mut self,
                input: &'a str,
            ) -> Result<(char, usize), Box<dyn StdError + Send + Sync + 'static>> {
                let c = input.chars().next().expect("non-empty");
                Ok((c, c.len_utf8()))
            }

            fn process(&self, atom: &mut char, runtime: &mut HashMap<char, f64>) -> f64 {
                *runtime.get(atom).unwrap_or(&0.0)
            }

            fn priority(&self, atom: &char) -> Option<u32> {
                match atom {
                    'A' => Some(5),
                    'B' => Some(1),
                    _ => None,
                }
            }
        }

        let mut expr = Expr::with_seed(Prioritized, "A | B", 9).expect("parses");
        let first_child = expr.ast.nodes[expr.ast.root].children[0];
        assert!(matches!(&expr.ast.nodes[first_child].kind, NodeKind::Atom(slot) if slot.text == "A"));
    }
}
