//! Ordered multicast of parameterless notifications.
//!
//! Grounded on `ankurah-ankurah/signals`' `Broadcast`/`Listener`/
//! `ListenerGuard` (snapshot-then-iterate delivery, id-keyed removal,
//! auto-unsubscribe on drop). Narrowed from `Arc<RwLock<..>>` to
//! `Rc<RefCell<..>>` since this runtime is single-threaded.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

type Listener = Rc<dyn Fn()>;

struct Inner {
	listeners: RefCell<BTreeMap<usize, Listener>>,
	next_id: RefCell<usize>,
}

/// An ordered, de-duplicated listener list.
///
/// `emit` invokes a snapshot of the listeners present at the time it is
/// called; a listener added during emission is not invoked until the next
/// `emit`. Removing a listener during emission is safe and takes effect
/// immediately for any not-yet-reached listener.
#[derive(Clone)]
pub struct Emitter(Rc<Inner>);

impl Default for Emitter {
	fn default() -> Self {
		Self::new()
	}
}

impl Emitter {
	/// Creates an empty emitter.
	#[must_use]
	pub fn new() -> Self {
		Self(Rc::new(Inner {
			listeners: RefCell::new(BTreeMap::new()),
			next_id: RefCell::new(0),
		}))
	}

	/// Subscribes `listener`, returning a guard that unsubscribes on drop.
	pub fn on(&self, listener: impl Fn() + 'static) -> ListenerGuard {
		let id = {
			let mut next_id = self.0.next_id.borrow_mut();
			let id = *next_id;
			*next_id += 1;
			id
		};
		self.0.listeners.borrow_mut().insert(id, Rc::new(listener));
		ListenerGuard { inner: Rc::downgrade(&self.0), id }
	}

	/// Invokes every listener present at the start of this call, in
	/// subscription order, exactly once each.
	///
	/// Only the set of ids is snapshotted up front, not the listener
	/// closures themselves: each id is re-checked against the live map
	/// right before its listener runs, so one still-pending listener
	/// removing another (not yet reached) during this same emission skips
	/// it, without shifting any later listener into an earlier slot. A
	/// listener subscribed during this emission gets a fresh id past the
	/// snapshotted range and so is never reached this pass.
	pub fn emit(&self) {
		let ids: Vec<usize> = self.0.listeners.borrow().keys().copied().collect();
		for id in ids {
			let listener = self.0.listeners.borrow().get(&id).cloned();
			if let Some(listener) = listener {
				listener();
			}
		}
	}

	/// Emits, then removes every listener (used on final disposal
	/// notifications).
	pub fn emit_and_clear(&self) {
		self.emit();
		self.0.listeners.borrow_mut().clear();
	}

	/// Number of currently-subscribed listeners.
	#[must_use]
	pub fn len(&self) -> usize {
		self.0.listeners.borrow().len()
	}

	/// Whether no listeners are currently subscribed.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Removes every listener without notifying them.
	pub fn clear(&self) {
		self.0.listeners.borrow_mut().clear();
	}
}

/// A subscription handle. Unsubscribes automatically when dropped.
#[must_use = "dropping this immediately unsubscribes the listener"]
pub struct ListenerGuard {
	inner: Weak<Inner>,
	id: usize,
}

impl ListenerGuard {
	/// Unsubscribes early, equivalent to dropping the guard.
	pub fn unsubscribe(self) {
		drop(self);
	}
}

impl Drop for ListenerGuard {
	fn drop(&mut self) {
		if let Some(inner) = self.inner.upgrade() {
			inner.listeners.borrow_mut().remove(&self.id);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::Cell;

	#[test]
	fn multiple_subscribers_in_order() {
		let emitter = Emitter::new();
		let log = Rc::new(RefCell::new(Vec::new()));

		let log_a = log.clone();
		let _a = emitter.on(move || log_a.borrow_mut().push("a"));
		let log_b = log.clone();
		let _b = emitter.on(move || log_b.borrow_mut().push("b"));

		emitter.emit();
		assert_eq!(*log.borrow(), vec!["a", "b"]);
	}

	#[test]
	fn unsubscribe_on_drop() {
		let emitter = Emitter::new();
		let count = Rc::new(Cell::new(0));
		let count_clone = count.clone();
		let guard = emitter.on(move || count_clone.set(count_clone.get() + 1));

		emitter.emit();
		assert_eq!(count.get(), 1);

		drop(guard);
		emitter.emit();
		assert_eq!(count.get(), 1);
	}

	#[test]
	fn listener_added_during_emission_is_not_called_this_pass() {
		let emitter = Emitter::new();
		let log = Rc::new(RefCell::new(Vec::new()));
		let emitter_clone = emitter.clone();
		let log_inner = log.clone();
		let _guard = emitter.on(move || {
			log_inner.borrow_mut().push("first");
			let log_nested = log_inner.clone();
			// Subscribing here must not affect this emission pass.
			std::mem::forget(emitter_clone.on(move || log_nested.borrow_mut().push("late")));
		});

		emitter.emit();
		assert_eq!(*log.borrow(), vec!["first"]);

		log.borrow_mut().clear();
		emitter.emit();
		assert_eq!(*log.borrow(), vec!["first", "late"]);
	}

	#[test]
	fn removing_a_not_yet_reached_listener_during_emission_skips_it() {
		let emitter = Emitter::new();
		let log = Rc::new(RefCell::new(Vec::new()));

		let guard_c: Rc<RefCell<Option<ListenerGuard>>> = Rc::new(RefCell::new(None));
		let guard_c_for_a = guard_c.clone();
		let log_a = log.clone();
		let _a = emitter.on(move || {
			log_a.borrow_mut().push("a");
			// Removes "c" before the emission loop reaches it.
			guard_c_for_a.borrow_mut().take();
		});
		let log_b = log.clone();
		let _b = emitter.on(move || log_b.borrow_mut().push("b"));
		let log_c = log.clone();
		*guard_c.borrow_mut() = Some(emitter.on(move || log_c.borrow_mut().push("c")));

		emitter.emit();
		assert_eq!(*log.borrow(), vec!["a", "b"], "c was removed before the loop reached it, so it must not fire");

		log.borrow_mut().clear();
		emitter.emit();
		assert_eq!(*log.borrow(), vec!["a", "b"], "later slots were not shifted by c's removal");
	}

	#[test]
	fn reentrant_subscribe_during_send_does_not_panic() {
		let emitter = Emitter::new();
		let emitter_clone = emitter.clone();
		let count = Rc::new(Cell::new(0));
		let count_clone = count.clone();
		let _guard = emitter.on(move || {
			count_clone.set(count_clone.get() + 1);
			let temp = emitter_clone.on(|| {});
			drop(temp);
		});

		emitter.emit();
		emitter.emit();
		assert_eq!(count.get(), 2);
	}
}
