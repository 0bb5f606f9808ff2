//! The UI-binding tracking boundary contract: out of scope to
//! implement a concrete UI component wrapper, but the core must describe
//! (and make usable) the contract such a wrapper relies on — push a
//! tracking frame whose `onSignalAccess` collects signals and whose
//! `onTaskAccess` subscribes to loading promises, then on completion of
//! the render-equivalent pass subscribe to the collected signals with a
//! single "re-render" listener, replacing the previous subscription set on
//! every re-evaluation.
//!
//! Grounded on `reactor_rt::HookFrame`'s `Boundary` context kind (added
//! specifically for this) and on `ankurah-ankurah/signals::observer`'s
//! ambient-slot tracking style for the "collect reads during one pass"
//! shape.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use reactor_rt::{ContextKind, HookFrame, ListenerGuard, Runtime, Uid};

/// A single render-equivalent pass's tracking boundary. Construct one,
/// run the UI-equivalent body inside [`Boundary::track`], then call
/// [`Boundary::commit`] with a "re-render" callback; re-running
/// [`Boundary::track`] for the next pass and committing again replaces
/// the previous subscription set entirely.
pub struct Boundary {
	rt: Runtime,
	accessed: Rc<RefCell<HashSet<Uid>>>,
	task_accessed: Rc<RefCell<HashSet<Uid>>>,
	subscriptions: RefCell<Vec<ListenerGuard>>,
}

impl Default for Boundary {
	fn default() -> Self {
		Self::new()
	}
}

impl Boundary {
	/// Creates an empty boundary with no prior subscriptions.
	#[must_use]
	pub fn new() -> Self {
		Self { rt: Runtime::current(), accessed: Rc::new(RefCell::new(HashSet::new())), task_accessed: Rc::new(RefCell::new(HashSet::new())), subscriptions: RefCell::new(Vec::new()) }
	}

	/// Runs `f` (the render-equivalent pass) with tracking installed;
	/// every tracking read and task observation during `f` is recorded for
	/// the next [`Boundary::commit`] call. Discards anything recorded by a
	/// previous pass that wasn't committed.
	pub fn track<T>(&self, f: impl FnOnce() -> T) -> T {
		self.accessed.borrow_mut().clear();
		self.task_accessed.borrow_mut().clear();
		let accessed = Rc::clone(&self.accessed);
		let task_accessed = Rc::clone(&self.task_accessed);
		let frame = HookFrame::new(ContextKind::Boundary)
			.with_on_signal_access(move |uid| {
				accessed.borrow_mut().insert(uid);
			})
			.with_on_task_access(move |uid| {
				task_accessed.borrow_mut().insert(uid);
			});
		self.rt.with_hooks(frame, f)
	}

	/// Subscribes `on_rerender` to every signal recorded by the most recent
	/// [`Boundary::track`] call, replacing whatever subscription set a
	/// prior commit installed. Task-accessed signals are subscribed the
	/// same way (`onTaskAccess` "lets the binding subscribe to the
	/// underlying promise").
	pub fn commit(&self, on_rerender: impl Fn() + 'static) {
		let on_rerender: Rc<dyn Fn()> = Rc::new(on_rerender);
		let mut guards = Vec::new();
		let uids: HashSet<Uid> = self.accessed.borrow().union(&self.task_accessed.borrow()).copied().collect();
		for uid in uids {
			if let Some(signal) = crate::registry::lookup(uid) {
				let on_rerender = Rc::clone(&on_rerender);
				guards.push(signal.subscribe(on_rerender));
			}
		}
		*self.subscriptions.borrow_mut() = guards;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::equality::Equality;
	use crate::signal::Signal;
	use std::cell::Cell;

	#[test]
	fn reevaluation_replaces_subscription_set() {
		let rt = Runtime::new();
		let flag = Signal::new_mutable(rt.clone(), true, Equality::strict(), None, None);
		let a = Signal::new_mutable(rt.clone(), 1, Equality::strict(), None, None);
		let b = Signal::new_mutable(rt, 2, Equality::strict(), None, None);

		let boundary = Boundary::new();
		let rerenders = Rc::new(Cell::new(0));
		let rerenders2 = rerenders.clone();

		let flag_c = flag.clone();
		let a_c = a.clone();
		let b_c = b.clone();
		boundary.track(|| if flag_c.get().unwrap() { a_c.get().unwrap() } else { b_c.get().unwrap() });
		boundary.commit(move || rerenders2.set(rerenders2.get() + 1));

		let b_mut = crate::signal::MutableSignal::from_signal(b.clone());
		b_mut.set(20).unwrap();
		assert_eq!(rerenders.get(), 0, "b was not read during the tracked pass, so it must not trigger a rerender");

		let a_mut = crate::signal::MutableSignal::from_signal(a);
		a_mut.set(10).unwrap();
		assert_eq!(rerenders.get(), 1);
	}
}
