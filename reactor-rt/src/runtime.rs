//! The thread-local runtime: uid allocation, the ambient hook stack, and the
//! notification scheduler (batching + cycle detection).
//!
//! Grounded on `isoprenoid::runtime::{ASignalRuntime, ASignalRuntime_}`,
//! which bundles exactly these three facilities (symbol counter, context
//! stack, update/stale queues) behind one runtime object with interior
//! mutability. This port collapses the prior `SignalRuntimeRef` trait
//! and its `GlobalSignalRuntime` default implementation into a single
//! concrete, non-generic, `Rc`-based runtime — see `DESIGN.md` Open
//! Question 1.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::error::{Result, SignalError};
use crate::hooks::{ContextKind, HookFrame};

/// The default propagation-depth cap for a single scheduler drain.
pub const DEFAULT_CYCLE_LIMIT: usize = 10_000;

/// A unique, monotonically increasing signal/task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(u64);

impl fmt::Display for Uid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Outcome of one scheduler drain, used for diagnostics and returned to
/// callers that care whether a cycle cap was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
	/// The queue drained normally; no cycle cap was hit.
	Settled {
		/// Number of notifications delivered during this drain.
		delivered: usize,
	},
	/// Draining was deferred because a batch (or an enclosing drain) is
	/// still active.
	Deferred,
	/// The propagation-depth cap was exceeded; the queue was cleared to
	/// break the cycle.
	CycleDetected {
		/// The cap that was exceeded.
		limit: usize,
	},
}

type Notify = Box<dyn FnOnce()>;

struct Inner {
	next_uid: Cell<u64>,
	hooks: RefCell<Vec<HookFrame>>,
	queue: RefCell<VecDeque<(Uid, Notify)>>,
	queued: RefCell<HashSet<Uid>>,
	batch_depth: Cell<u32>,
	draining: Cell<bool>,
	cycle_limit: Cell<usize>,
}

/// The single-threaded cooperative signal runtime.
///
/// Cheaply `Clone`-able (it's a reference-counted handle); `Runtime::current`
/// retrieves the thread-local singleton application code should use.
#[derive(Clone)]
pub struct Runtime(Rc<Inner>);

impl Default for Runtime {
	fn default() -> Self {
		Self::new()
	}
}

impl Runtime {
	/// Creates a fresh, independent runtime with an empty hook stack and
	/// scheduler queue. Most code should use [`Runtime::current`] instead;
	/// this constructor exists so tests can evaluate in isolation.
	#[must_use]
	pub fn new() -> Self {
		Self(Rc::new(Inner {
			next_uid: Cell::new(1),
			hooks: RefCell::new(Vec::new()),
			queue: RefCell::new(VecDeque::new()),
			queued: RefCell::new(HashSet::new()),
			batch_depth: Cell::new(0),
			draining: Cell::new(false),
			cycle_limit: Cell::new(DEFAULT_CYCLE_LIMIT),
		}))
	}

	/// The thread-local runtime singleton.
	#[must_use]
	pub fn current() -> Self {
		CURRENT.with(Clone::clone)
	}

	/// Overrides the propagation-depth cap used for cycle detection on this
	/// runtime handle.
	pub fn with_cycle_limit(self, limit: usize) -> Self {
		self.0.cycle_limit.set(limit);
		self
	}

	/// Allocates a fresh, never-reused [`Uid`].
	#[must_use]
	pub fn allocate_uid(&self) -> Uid {
		let id = self.0.next_uid.get();
		self.0.next_uid.set(id + 1);
		Uid(id)
	}

	/// Pushes `frame`, runs `f`, and pops the frame on every exit path
	/// (including unwinding), mirroring `isoprenoid`'s context-stack
	/// push/pop around a computation.
	pub fn with_hooks<T>(&self, frame: HookFrame, f: impl FnOnce() -> T) -> T {
		self.0.hooks.borrow_mut().push(frame);
		struct PopGuard(Rc<Inner>);
		impl Drop for PopGuard {
			fn drop(&mut self) {
				self.0.hooks.borrow_mut().pop();
			}
		}
		let _guard = PopGuard(Rc::clone(&self.0));
		f()
	}

	/// The context kind of the topmost hook frame, if any, used to reject
	/// illegal nesting (e.g. a tracking boundary opened while a batch is
	/// active).
	#[must_use]
	pub fn current_context_kind(&self) -> Option<ContextKind> {
		self.0.hooks.borrow().last().map(HookFrame::kind)
	}

	/// Fires the nearest enclosing frame's `on_signal_access` hook, if any.
	/// Only *tracking* reads call this; `peek` must not.
	pub fn notify_signal_access(&self, uid: Uid) {
		self.fire(uid, |frame| frame.on_signal_access.as_mut());
	}

	/// Fires the nearest enclosing frame's `on_signal_create` hook, if any.
	/// Used by `scope` to collect signals for LIFO auto-dispose; a nested
	/// scope's frame shadows its parent's so the parent never observes the
	/// nested scope's signals.
	pub fn notify_signal_create(&self, uid: Uid) {
		self.fire(uid, |frame| frame.on_signal_create.as_mut());
	}

	/// Fires the nearest enclosing frame's `on_task_access` hook, if any.
	pub fn notify_task_access(&self, uid: Uid) {
		self.fire(uid, |frame| frame.on_task_access.as_mut());
	}

	fn fire(&self, uid: Uid, selector: impl Fn(&mut HookFrame) -> Option<&mut Box<dyn FnMut(Uid)>>) {
		let mut hooks = self.0.hooks.borrow_mut();
		for frame in hooks.iter_mut().rev() {
			if let Some(hook) = selector(frame) {
				hook(uid);
				return;
			}
		}
	}

	/// Appends `uid` to the pending notification queue with the closure
	/// that will actually deliver the notification (reading the signal's
	/// live state, so redundant enqueues before a drain collapse into one
	/// delivery). If no batch is active and no drain is already running,
	/// drains immediately.
	pub fn enqueue(&self, uid: Uid, notify: impl FnOnce() + 'static) -> Propagation {
		if self.0.queued.borrow_mut().insert(uid) {
			self.0.queue.borrow_mut().push_back((uid, Box::new(notify)));
		}
		if self.0.batch_depth.get() == 0 {
			self.drain()
		} else {
			Propagation::Deferred
		}
	}

	/// Defers draining until `f` returns; nested calls coalesce so only the
	/// outermost call drains.
	pub fn batch<T>(&self, f: impl FnOnce() -> T) -> T {
		self.0.batch_depth.set(self.0.batch_depth.get() + 1);
		struct DepthGuard(Rc<Inner>);
		impl Drop for DepthGuard {
			fn drop(&mut self) {
				self.0.batch_depth.set(self.0.batch_depth.get() - 1);
			}
		}
		let _guard = DepthGuard(Rc::clone(&self.0));
		let result = f();
		drop(_guard);
		if self.0.batch_depth.get() == 0 {
			self.drain();
		}
		result
	}

	/// Drains the pending notification queue, invoking each entry's notify
	/// closure exactly once. Reentrant: if a drain is already running on
	/// this runtime (e.g. a listener wrote to another signal), this call
	/// returns immediately and lets the active drain's loop pick up the
	/// newly queued entry instead of recursing.
	pub fn drain(&self) -> Propagation {
		if self.0.batch_depth.get() > 0 {
			return Propagation::Deferred;
		}
		if self.0.draining.get() {
			return Propagation::Deferred;
		}
		self.0.draining.set(true);
		trace!(target: "reactor_rt::scheduler", "drain start");
		let limit = self.0.cycle_limit.get();
		let mut delivered = 0usize;
		let outcome = loop {
			let next = self.0.queue.borrow_mut().pop_front();
			let Some((uid, notify)) = next else {
				break Propagation::Settled { delivered };
			};
			self.0.queued.borrow_mut().remove(&uid);
			delivered += 1;
			if delivered > limit {
				warn!(target: "reactor_rt::scheduler", limit, "cyclic propagation detected, clearing queue");
				self.0.queue.borrow_mut().clear();
				self.0.queued.borrow_mut().clear();
				break Propagation::CycleDetected { limit };
			}
			notify();
		};
		self.0.draining.set(false);
		debug!(target: "reactor_rt::scheduler", ?outcome, "drain end");
		outcome
	}

	/// Runs `drain`, converting a cycle trip into a [`SignalError::Cycle`].
	pub fn drain_checked(&self) -> Result<()> {
		match self.drain() {
			Propagation::CycleDetected { limit } => Err(SignalError::Cycle(limit)),
			Propagation::Settled { .. } | Propagation::Deferred => Ok(()),
		}
	}
}

thread_local! {
	static CURRENT: Runtime = Runtime::new();
}

/// Allocates a fresh uid from the thread-local runtime.
#[must_use]
pub fn next_uid() -> Uid {
	Runtime::current().allocate_uid()
}

/// Runs `f` inside a batch on the thread-local runtime; see
/// [`Runtime::batch`].
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
	Runtime::current().batch(f)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::RefCell as StdRefCell;

	#[test]
	fn uids_are_monotonic_and_unique() {
		let rt = Runtime::new();
		let a = rt.allocate_uid();
		let b = rt.allocate_uid();
		assert_ne!(a, b);
		assert!(b > a);
	}

	#[test]
	fn batch_coalesces_nested_calls() {
		let rt = Runtime::new();
		let log = Rc::new(StdRefCell::new(Vec::new()));
		let uid = rt.allocate_uid();

		rt.batch(|| {
			rt.batch(|| {
				let log = log.clone();
				rt.enqueue(uid, move || log.borrow_mut().push(1));
			});
			// still inside the outer batch: no drain has happened yet.
			assert!(log.borrow().is_empty());
		});
		assert_eq!(*log.borrow(), vec![1]);
	}

	#[test]
	fn redundant_enqueue_collapses_to_one_delivery() {
		let rt = Runtime::new();
		let log = Rc::new(StdRefCell::new(0));
		let uid = rt.allocate_uid();
		rt.batch(|| {
			for _ in 0..5 {
				let log = log.clone();
				rt.enqueue(uid, move || *log.borrow_mut() += 1);
			}
		});
		assert_eq!(*log.borrow(), 1);
	}

	#[test]
	fn cascaded_enqueue_during_drain_is_delivered_in_same_drain() {
		let rt = Runtime::new();
		let log = Rc::new(StdRefCell::new(Vec::new()));
		let rt2 = rt.clone();
		let log2 = log.clone();
		let a = rt.allocate_uid();
		let b = rt.allocate_uid();
		rt.enqueue(a, move || {
			log2.borrow_mut().push("a");
			let log3 = log2.clone();
			rt2.enqueue(b, move || log3.borrow_mut().push("b"));
		});
		assert_eq!(*log.borrow(), vec!["a", "b"]);
	}

	#[test]
	fn cycle_cap_reports_and_clears_queue() {
		let rt = Runtime::new().with_cycle_limit(3);
		let uid = rt.allocate_uid();
		let rt2 = rt.clone();
		fn requeue(rt: Runtime, uid: Uid) {
			rt.enqueue(uid, move || requeue(rt.clone(), uid));
		}
		requeue(rt2, uid);
		// The initiating enqueue call observed the cycle being detected.
		// A further enqueue afterwards should start a clean queue.
		let log = Rc::new(StdRefCell::new(0));
		let log2 = log.clone();
		let result = rt.enqueue(uid, move || *log2.borrow_mut() += 1);
		assert!(matches!(result, Propagation::Settled { .. }));
		assert_eq!(*log.borrow(), 1);
	}

	#[test]
	fn context_kind_reflects_topmost_frame() {
		let rt = Runtime::new();
		assert_eq!(rt.current_context_kind(), None);
		rt.with_hooks(HookFrame::new(ContextKind::Batch), || {
			assert_eq!(rt.current_context_kind(), Some(ContextKind::Batch));
			rt.with_hooks(HookFrame::new(ContextKind::Computation), || {
				assert_eq!(rt.current_context_kind(), Some(ContextKind::Computation));
			});
			assert_eq!(rt.current_context_kind(), Some(ContextKind::Batch));
		});
		assert_eq!(rt.current_context_kind(), None);
	}

	#[test]
	fn nested_scope_shadows_parent_on_signal_create() {
		let rt = Runtime::new();
		let outer_log = Rc::new(StdRefCell::new(Vec::new()));
		let inner_log = Rc::new(StdRefCell::new(Vec::new()));
		let outer_clone = outer_log.clone();
		rt.with_hooks(HookFrame::new(ContextKind::Scope).with_on_signal_create(move |uid| outer_clone.borrow_mut().push(uid)), || {
			let inner_clone = inner_log.clone();
			rt.with_hooks(HookFrame::new(ContextKind::Scope).with_on_signal_create(move |uid| inner_clone.borrow_mut().push(uid)), || {
				let uid = rt.allocate_uid();
				rt.notify_signal_create(uid);
			});
			let uid = rt.allocate_uid();
			rt.notify_signal_create(uid);
		});
		assert_eq!(outer_log.borrow().len(), 1);
		assert_eq!(inner_log.borrow().len(), 1);
	}
}
