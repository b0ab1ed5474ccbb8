//! The host-supplied atom adapter.
//!
//! The engine never interprets atom text itself; it only asks the host to
//! turn a byte range into an opaque payload (`parse`), later asks the host
//! to turn that payload into a number (`process`), and optionally consults
//! a static cost hint (`priority`) and a release hook (`destroy`).
//!
//! Unlike the original C engine, which threads a `struct rspamd_atom_subr`
//! function-pointer table through every call, this is a single trait
//! generic at the [`crate::Expr`] handle level, so the hot evaluation path
//! is fully monomorphic: no indirect call overhead per atom.

use std::error::Error as StdError;

/// The host-implemented predicate adapter.
///
/// `'src` is the lifetime of the text being parsed; atom text borrows from
/// it rather than being copied. A host whose own atom payload needs to
/// outlive the input is free to copy internally during `parse`.
pub trait Subr<'src> {
    /// The opaque payload this host attaches to each atom.
    type Atom;

    /// The per-call context threaded through `process` (e.g. the message
    /// currently being scored). Supplied by the caller at `eval` time, not
    /// at parse time.
    type Runtime;

    /// Parse one atom starting at the front of `input`.
    ///
    /// Returns the atom payload and the number of bytes consumed from the
    /// front of `input`. Must consume at least one byte on success.
    fn parse(
        &mut self,
        input: &'src str,
    ) -> Result<(Self::Atom, usize), Box<dyn StdError + Send + Sync + 'static>>;

    /// Evaluate one atom against the given runtime context.
    ///
    /// Must be a pure function of `(atom, runtime)` — the engine may call
    /// this at most once per atom per [`crate::Expr::eval`] call and
    /// memoises the result for the remainder of that call.
    fn process(&self, atom: &mut Self::Atom, runtime: &mut Self::Runtime) -> f64;

    /// A static cost estimate for this atom: higher means cheaper to
    /// evaluate. Atoms with no reported priority are treated as maximally
    /// expensive, so they sort last among ties.
    fn priority(&self, _atom: &Self::Atom) -> Option<u32> {
        None
    }

    /// Release any resources the atom payload owns. The default is a no-op
    /// (ordinary `Drop` on `Self::Atom` already runs regardless).
    fn destroy(&mut self, _atom: Self::Atom) {}
}

/// Runtime bookkeeping the engine maintains per atom, independent of
/// whatever the host's own payload carries.
#[derive(Debug)]
pub(crate) struct AtomSlot<'src, A> {
    pub data: A,
    pub text: &'src str,
    pub hits: u64,
    pub avg_ticks: f64,
    pub nonce: u64,
}
