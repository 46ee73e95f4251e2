//! Stack growth for the recursive parser and evaluator.
//!
//! Nesting depth in Sable source is unbounded, and user call depth is only
//! bounded by `Evaluator::with_max_call_depth`. Both walk the tree with native
//! recursion, so the hot recursive entry points run through
//! [`ensure_sufficient_stack`], which moves onto a fresh segment when the
//! current one is nearly used up.

/// Grow when less than this much stack remains.
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
