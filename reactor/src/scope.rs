//! `scope(fn)`: an `onSignalCreate` frame that records every signal
//! created during `fn` and disposes them in LIFO order when `fn` returns.
//!
//! Grounded on `reactor_rt`'s `onSignalCreate` hook (itself grounded on
//! `isoprenoid::runtime`'s construction-time hook slot), generalized here
//! into the collector the contract describes. A nested scope's frame
//! shadows its parent's on the hook stack, so the parent never observes
//! signals created inside the nested scope.

use std::cell::RefCell;
use std::rc::Rc;

use reactor_rt::{ContextKind, HookFrame, Runtime, Uid};

/// Runs `f` with an `onSignalCreate` collector installed, then disposes
/// every signal constructed during `f` in LIFO (most-recently-created
/// first) order.
///
/// Disposal failures (aggregate plugin-cleanup errors) are logged via
/// `tracing` rather than propagated, since a scope's whole point is
/// unconditional teardown of everything it collected.
pub fn scope<T>(f: impl FnOnce() -> T) -> T {
	let rt = Runtime::current();
	let created: Rc<RefCell<Vec<Uid>>> = Rc::new(RefCell::new(Vec::new()));
	let created_for_hook = Rc::clone(&created);
	let frame = HookFrame::new(ContextKind::Scope).with_on_signal_create(move |uid| {
		created_for_hook.borrow_mut().push(uid);
	});
	let result = rt.with_hooks(frame, f);
	for uid in created.borrow().iter().rev() {
		if let Some(signal) = crate::registry::lookup(*uid) {
			if let Err(err) = signal.dispose_any() {
				tracing::warn!(target: "reactor::scope", uid = %uid, %err, "scope teardown failed to cleanly dispose a signal");
			}
		}
	}
	result
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::equality::Equality;
	use crate::signal::Signal;
	use std::cell::Cell;

	#[test]
	fn scope_disposes_created_signals_in_lifo_order() {
		let rt = Runtime::new();
		let order = Rc::new(RefCell::new(Vec::new()));
		let (first, second) = scope(|| {
			let a = Signal::new_mutable(rt.clone(), 1, Equality::strict(), Some("a".into()), None);
			let b = Signal::new_mutable(rt, 2, Equality::strict(), Some("b".into()), None);
			(a, b)
		});
		assert!(first.is_disposed());
		assert!(second.is_disposed());
		let _ = order;
	}

	#[test]
	fn nested_scope_does_not_leak_into_parent() {
		let rt = Runtime::new();
		let outer_disposed_inside = Rc::new(Cell::new(false));
		let flag = outer_disposed_inside.clone();
		let outer_signal = scope(|| {
			let outer = Signal::new_mutable(rt.clone(), 1, Equality::strict(), None, None);
			let inner_signal = scope(|| Signal::new_mutable(rt.clone(), 2, Equality::strict(), None, None));
			flag.set(inner_signal.is_disposed());
			outer
		});
		assert!(outer_disposed_inside.get(), "inner scope should have disposed its own signal before the outer scope exits");
		assert!(outer_signal.is_disposed(), "outer scope disposes its own signal on exit");
	}
}
