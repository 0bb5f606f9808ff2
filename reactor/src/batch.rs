//! `batch(fn)`: defers notification draining until `fn` returns;
//! nested calls coalesce so only the outermost drains.
//!
//! Grounded on `isoprenoid::runtime`'s `reentrant_critical` critical-section
//! nesting counter, re-exposed here as a crate-level entry point since the
//! runtime's own `batch` lives on `reactor_rt::Runtime` rather than the
//! thread-local free function most call sites want.

/// Runs `f` with notification draining deferred until it returns. Nested
/// `batch` calls coalesce: only the outermost call triggers a drain.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
	reactor_rt::Runtime::current().batch(f)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::equality::Equality;
	use crate::signal::{MutableSignal, Signal};
	use reactor_rt::Runtime;
	use std::cell::RefCell;
	use std::rc::Rc;

	#[test]
	fn nested_batches_coalesce_to_one_drain() {
		let rt = Runtime::new();
		let s = Signal::new_mutable(rt, 0, Equality::strict(), None, None);
		let s = MutableSignal::from_signal(s);
		let log = Rc::new(RefCell::new(0));
		let log2 = log.clone();
		let _g = s.on(move || *log2.borrow_mut() += 1);
		batch(|| {
			batch(|| {
				s.set(1).unwrap();
				s.set(2).unwrap();
			});
			assert_eq!(*log.borrow(), 0, "draining is deferred until the outermost batch returns");
		});
		assert_eq!(*log.borrow(), 1);
	}
}
