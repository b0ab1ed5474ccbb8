//! The adaptive-priority subsystem (C5).
//!
//! Two pure post-order passes: [`assign`] computes each node's static
//! `priority` (and, as a documented side effect, resets the per-atom
//! learning window), and [`resort`] reorders each operator node's children
//! by a compound key built from that priority plus the just-elapsed
//! window's `hits`/`avg_ticks`.
//!
//! The two passes are deliberately *not* always run in the same order —
//! see the module-level note on `rebuild_after_parse` vs. `rebuild_cycle`
//! below, and DESIGN.md for why.

use ordered_float::OrderedFloat;

use crate::engine::ast::{Ast, NodeIndex, NodeKind};

/// Upper bound of the atom priority scale. A host that reports no static
/// cost for an atom is treated as though it reported the most expensive
/// possible cost (priority `0`), so its `priority` field here becomes
/// `MAX_PRIORITY`.
pub(crate) const MAX_PRIORITY: i32 = 255;

/// Recompute every node's `priority` field, post-order, and reset each
/// atom's `hits`/`avg_ticks` learning window to zero.
///
/// `priority_of` is the host's optional static-cost callback, already
/// applied to each atom's payload.
pub(crate) fn assign<A>(ast: &mut Ast<A>, priority_of: impl Fn(&A) -> Option<u32>) {
    for idx in ast.post_order() {
        let children_sum: i32 = ast.nodes[idx]
            .children
            .iter()
            .map(|&c| ast.nodes[c].priority)
            .sum();
        let priority = match &mut ast.nodes[idx].kind {
            NodeKind::Limit(_) => 0,
            NodeKind::Atom(slot) => {
                let p = priority_of(&slot.data)
                    .map(|cost| MAX_PRIORITY - cost as i32)
                    .unwrap_or(MAX_PRIORITY);
                slot.hits = 0;
                slot.avg_ticks = 0.0;
                p
            }
            NodeKind::Op(_) => children_sum,
        };
        ast.nodes[idx].priority = priority;
    }
}

/// Dynamic weight used to break ties between atoms of equal static
/// priority: hits per unit of sampled runtime, ascending (cheap/high-hit
/// atoms sort first). A never-timed atom is treated as costing `1` "tick
/// unit" so atoms with hits still separate from ones without.
fn dynamic_weight<A>(ast: &Ast<A>, idx: NodeIndex) -> f64 {
    match &ast.nodes[idx].kind {
        NodeKind::Atom(slot) => {
            let denom = if slot.avg_ticks > 0.0 {
                slot.avg_ticks * 1e7
            } else {
                1.0
            };
            slot.hits as f64 / denom
        }
        _ => 0.0,
    }
}

fn is_atom<A>(ast: &Ast<A>, idx: NodeIndex) -> bool {
    matches!(ast.nodes[idx].kind, NodeKind::Atom(_))
}

fn compare_children<A>(ast: &Ast<A>, a: NodeIndex, b: NodeIndex) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let a_limit = ast.is_limit(a);
    let b_limit = ast.is_limit(b);
    if a_limit != b_limit {
        return if a_limit { Ordering::Less } else { Ordering::Greater };
    }

    let pa = ast.nodes[a].priority;
    let pb = ast.nodes[b].priority;
    if pa == pb && is_atom(ast, a) && is_atom(ast, b) {
        let wa = OrderedFloat(dynamic_weight(ast, a));
        let wb = OrderedFloat(dynamic_weight(ast, b));
        return wa.cmp(&wb);
    }
    pa.cmp(&pb)
}

/// Reorder every operator node's children, post-order, by the compound key
/// from §4.5: limits first, then dynamic weight among equal-priority
/// atoms, then priority ascending. This is a pure read of `priority`,
/// `hits`, and `avg_ticks` — it never mutates them (see `assign` for where
/// the learning-window reset actually happens).
pub(crate) fn resort<A>(ast: &mut Ast<A>) {
    for idx in ast.post_order() {
        if ast.nodes[idx].children.is_empty() {
            continue;
        }
        let mut children = std::mem::take(&mut ast.nodes[idx].children);
        children.sort_by(|&a, &b| compare_children(ast, a, b));
        ast.nodes[idx].children = children;
    }
}

/// Run at build time, right after the shunting-yard parse completes: the
/// `priority` field doesn't exist yet, so it must be computed before the
/// first `resort` can use it as a sort key. Freshly parsed atoms all have
/// `hits = avg_ticks = 0`, so running `assign`'s reset first costs nothing.
pub(crate) fn rebuild_after_parse<A>(ast: &mut Ast<A>, priority_of: impl Fn(&A) -> Option<u32>) {
    assign(ast, &priority_of);
    resort(ast);
}

/// Run at every periodic adaptive-learning cycle (§4.6). Order matters
/// here and is the reverse of `rebuild_after_parse`: `resort` runs first so
/// it can consume the `hits`/`avg_ticks` accumulated since the previous
/// cycle, and `assign` runs second, both recomputing `priority` (a no-op
/// if the host's static costs are stable) and zeroing the learning window
/// for the next one. See DESIGN.md for why the original engine's opposite
/// ordering silently defeated its own adaptive reordering.
pub(crate) fn rebuild_cycle<A>(ast: &mut Ast<A>, priority_of: impl Fn(&A) -> Option<u32>) {
    resort(ast);
    assign(ast, &priority_of);
}
