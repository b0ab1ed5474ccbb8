//! The evaluator (C6).
//!
//! `eval_node` walks one subtree top-down, combining child values
//! left-to-right per the tables in `SPEC_FULL.md` §4.4 and returning early
//! once the parent's `done` predicate is satisfied. A `Plus` node never
//! carries its own `Limit` child — by construction only a comparison does —
//! so a `Plus` beneath a comparison reaches for its *parent's* limit to
//! decide whether it can stop early; see `parent_limit_check`.

use std::time::Instant;

use crate::engine::ast::{Ast, NodeIndex, NodeKind};
use crate::engine::atom::Subr;
use crate::engine::operators::Operator;

/// Threshold below which an atom's value is treated as "didn't fire", for
/// `Not` and for the `hits` counter.
const EPSILON: f64 = 1e-9;

/// Per-call evaluation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    /// Disable all `done` short-circuit checks; every node evaluates every
    /// child. Used to verify short-circuit correctness against a full walk.
    pub no_opt: bool,
}

/// Evaluate the whole tree rooted at `ast.root`, returning the numeric
/// result. If `trace` is `Some`, every atom that fires (produces a value
/// with `|v| > EPSILON`) has its source text appended to it, in evaluation
/// order.
pub(crate) fn eval<'src, S>(
    ast: &mut Ast<'src, S::Atom>,
    subr: &S,
    runtime: &mut S::Runtime,
    evals: u64,
    flags: Flags,
    mut trace: Option<&mut Vec<&'src str>>,
) -> f64
where
    S: Subr<'src>,
{
    let root = ast.root;
    eval_node(ast, subr, runtime, root, evals, flags, &mut trace)
}

fn eval_node<'src, S>(
    ast: &mut Ast<'src, S::Atom>,
    subr: &S,
    runtime: &mut S::Runtime,
    idx: NodeIndex,
    evals: u64,
    flags: Flags,
    trace: &mut Option<&mut Vec<&'src str>>,
) -> f64
where
    S: Subr<'src>,
{
    match node_tag(ast, idx) {
        NodeTag::Limit(v) => {
            ast.nodes[idx].value = v;
            v
        }
        NodeTag::Atom => eval_atom(ast, subr, runtime, idx, evals, trace),
        NodeTag::Op(op) if op == Operator::Not => {
            let child = ast.nodes[idx].children[0];
            let v = eval_node(ast, subr, runtime, child, evals, flags, trace);
            let result = if v.abs() > EPSILON { 0.0 } else { 1.0 };
            ast.nodes[idx].value = result;
            result
        }
        NodeTag::Op(op) => eval_op(ast, subr, runtime, idx, op, evals, flags, trace),
    }
}

/// A `Copy` summary of a node's kind, so dispatching on it doesn't hold a
/// borrow of the arena across the match arms (several of which need to
/// mutably re-index the same arena).
enum NodeTag {
    Limit(f64),
    Atom,
    Op(Operator),
}

fn node_tag<A>(ast: &Ast<A>, idx: NodeIndex) -> NodeTag {
    match &ast.nodes[idx].kind {
        NodeKind::Limit(v) => NodeTag::Limit(*v),
        NodeKind::Atom(_) => NodeTag::Atom,
        NodeKind::Op(op) => NodeTag::Op(*op),
    }
}

fn eval_atom<'src, S>(
    ast: &mut Ast<'src, S::Atom>,
    subr: &S,
    runtime: &mut S::Runtime,
    idx: NodeIndex,
    evals: u64,
    trace: &mut Option<&mut Vec<&'src str>>,
) -> f64
where
    S: Subr<'src>,
{
    if ast.nodes[idx].processed {
        return ast.nodes[idx].value;
    }

    let call_number = evals + 1;
    let nonce = match &ast.nodes[idx].kind {
        NodeKind::Atom(slot) => slot.nonce,
        _ => unreachable!(),
    };
    let sample_ticks = (call_number ^ (nonce >> 4)) & 0x1F == 0;
    let t0 = sample_ticks.then(Instant::now);

    let value = match &mut ast.nodes[idx].kind {
        NodeKind::Atom(slot) => subr.process(&mut slot.data, runtime),
        _ => unreachable!(),
    };

    if let Some(t0) = t0 {
        let delta = t0.elapsed().as_secs_f64();
        if let NodeKind::Atom(slot) = &mut ast.nodes[idx].kind {
            slot.avg_ticks += (delta - slot.avg_ticks) / call_number as f64;
        }
        tracing::trace!(node = idx as u64, delta, "sampled atom runtime");
    }

    if value.abs() > EPSILON {
        if let NodeKind::Atom(slot) = &mut ast.nodes[idx].kind {
            slot.hits += 1;
        }
        if let Some(t) = trace.as_deref_mut() {
            if let NodeKind::Atom(slot) = &ast.nodes[idx].kind {
                t.push(slot.text);
            }
        }
    }

    ast.nodes[idx].value = value;
    ast.nodes[idx].processed = true;
    value
}

#[allow(clippy::too_many_arguments)]
fn eval_op<'src, S>(
    ast: &mut Ast<'src, S::Atom>,
    subr: &S,
    runtime: &mut S::Runtime,
    idx: NodeIndex,
    op: Operator,
    evals: u64,
    flags: Flags,
    trace: &mut Option<&mut Vec<&'src str>>,
) -> f64
where
    S: Subr<'src>,
{
    let children = ast.nodes[idx].children.clone();
    let mut acc: Option<f64> = None;
    let mut own_lim = 0.0;

    for child in children {
        if ast.is_limit(child) {
            if let NodeKind::Limit(v) = &ast.nodes[child].kind {
                own_lim = *v;
            }
            continue;
        }

        let v = eval_node(ast, subr, runtime, child, evals, flags, trace);
        let next = match acc {
            None => first_value(op, v, own_lim),
            Some(a) => step_value(op, a, v, own_lim),
        };
        acc = Some(next);

        if !flags.no_opt {
            let stop = match op {
                Operator::Plus => parent_says_done(ast, idx, next),
                _ => node_done(op, next, own_lim),
            };
            if stop {
                break;
            }
        }
    }

    let result = acc.unwrap_or(0.0);
    ast.nodes[idx].value = result;
    result
}

fn first_value(op: Operator, v: f64, lim: f64) -> f64 {
    match op {
        Operator::Plus | Operator::And | Operator::Mult | Operator::Or => v,
        Operator::Ge => bool_f64(v >= lim),
        Operator::Gt => bool_f64(v > lim),
        Operator::Le => bool_f64(v <= lim),
        Operator::Lt => bool_f64(v < lim),
        Operator::Not | Operator::OBrace | Operator::CBrace | Operator::Invalid => v,
    }
}

fn step_value(op: Operator, acc: f64, v: f64, lim: f64) -> f64 {
    match op {
        Operator::Plus | Operator::Or => acc + v,
        Operator::And | Operator::Mult => acc * v,
        Operator::Ge => bool_f64(acc >= lim),
        Operator::Gt => bool_f64(acc > lim),
        Operator::Le => bool_f64(acc <= lim),
        Operator::Lt => bool_f64(acc < lim),
        Operator::Not | Operator::OBrace | Operator::CBrace | Operator::Invalid => acc,
    }
}

fn node_done(op: Operator, acc: f64, lim: f64) -> bool {
    match op {
        Operator::And | Operator::Mult => acc == 0.0,
        Operator::Or => acc != 0.0,
        Operator::Ge => acc >= lim,
        Operator::Gt => acc > lim,
        Operator::Le => acc <= lim,
        Operator::Lt => acc < lim,
        _ => false,
    }
}

/// Whether `idx`'s parent is a comparison that already holds against its
/// limit, given `idx`'s own accumulator so far. This is the mechanism by
/// which a `Plus` subtree beneath `A + B + C + D >= 5` can stop after `C`.
fn parent_says_done<A>(ast: &Ast<A>, idx: NodeIndex, acc: f64) -> bool {
    let Some(parent) = ast.nodes[idx].parent else {
        return false;
    };
    let Some(parent_op) = ast.op_of(parent) else {
        return false;
    };
    let lim = ast.nodes[parent].children.iter().find_map(|&c| match &ast.nodes[c].kind {
        NodeKind::Limit(v) => Some(*v),
        _ => None,
    });
    let Some(lim) = lim else {
        return false;
    };
    node_done(parent_op, acc, lim)
}

fn bool_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ast::NodeKind;
    use crate::engine::parser;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::error::Error as StdError;

    /// A host whose atoms are single ASCII-letter names, each resolved
    /// against a `HashMap<char, f64>` supplied as the runtime.
    struct Lookup;

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
    }

    fn build(src: &str) -> Ast<'_, char> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        parser::parse(&mut Lookup, src, &mut rng).expect("parses")
    }

    fn run(ast: &mut Ast<char>, vars: &[(char, f64)]) -> f64 {
        let runtime: HashMap<char, f64> = vars.iter().copied().collect();
        let mut runtime = runtime;
        eval(ast, &Lookup, &mut runtime, 0, Flags::default(), None)
    }

    #[test]
    fn and_or_scenario() {
        let mut ast = build("A & B | C");
        assert_eq!(run(&mut ast, &[('A', 1.0), ('B', 0.0), ('C', 1.0)]), 1.0);
        ast.reset_call_state();
        assert_eq!(run(&mut ast, &[('A', 1.0), ('B', 1.0), ('C', 0.0)]), 1.0);
        ast.reset_call_state();
        assert_eq!(run(&mut ast, &[('A', 0.0), ('B', 1.0), ('C', 0.0)]), 0.0);
    }

    #[test]
    fn double_negation() {
        let mut ast = build("!A");
        assert_eq!(run(&mut ast, &[('A', 0.0)]), 1.0);
        ast.reset_call_state();
        assert_eq!(run(&mut ast, &[('A', 3.14)]), 0.0);
    }

    #[test]
    fn plus_under_comparison_short_circuits_and_traces_only_evaluated_atoms() {
        let mut ast = build("A + B + C + D >= 5");
        let runtime: HashMap<char, f64> =
            [('A', 1.0), ('B', 2.0), ('C', 3.0), ('D', 100.0)].into_iter().collect();
        let mut runtime = runtime;
        let mut trace = Vec::new();
        let result = eval(
            &mut ast,
            &Lookup,
            &mut runtime,
            0,
            Flags::default(),
            Some(&mut trace),
        );
        assert_eq!(result, 1.0);
        assert_eq!(trace, vec!["A", "B", "C"]);
    }

    #[test]
    fn or_of_ors_short_circuits_second_conjunct() {
        let mut ast = build("(A | B) & (C | D)");
        let runtime: HashMap<char, f64> =
            [('A', 0.0), ('B', 0.0), ('C', 1.0), ('D', 1.0)].into_iter().collect();
        let mut runtime = runtime;
        let mut trace = Vec::new();
        let result = eval(
            &mut ast,
            &Lookup,
            &mut runtime,
            0,
            Flags::default(),
            Some(&mut trace),
        );
        assert_eq!(result, 0.0);
        assert!(!trace.contains(&"C"));
        assert!(!trace.contains(&"D"));
    }

    #[test]
    fn no_opt_matches_optimized_result() {
        for (src, vars) in [
            ("A + B + C + D >= 5", vec![('A', 1.0), ('B', 2.0), ('C', 3.0), ('D', 100.0)]),
            ("(A | B) & (C | D)", vec![('A', 0.0), ('B', 0.0), ('C', 1.0), ('D', 1.0)]),
            ("A & B | C", vec![('A', 1.0), ('B', 0.0), ('C', 1.0)]),
        ] {
            let mut opt = build(src);
            let mut no_opt = build(src);
            let runtime: HashMap<char, f64> = vars.into_iter().collect();
            let optimized = run(&mut opt, &runtime.iter().map(|(&k, &v)| (k, v)).collect::<Vec<_>>());
            let mut rt2 = runtime;
            let unoptimized = eval(
                &mut no_opt,
                &Lookup,
                &mut rt2,
                0,
                Flags { no_opt: true },
                None,
            );
            assert_eq!(optimized, unoptimized, "NoOpt must not change the result for {src}");
        }
    }

    #[test]
    fn single_atom_no_operator() {
        let mut ast = build("A");
        assert_eq!(run(&mut ast, &[('A', 42.0)]), 42.0);
    }

    #[test]
    fn shared_limit_child_is_first() {
        let ast = build("A >= 5");
        let root = ast.root;
        let first = ast.nodes[root].children[0];
        assert!(matches!(&ast.nodes[first].kind, NodeKind::Limit(v) if *v == 5.0));
    }
}
