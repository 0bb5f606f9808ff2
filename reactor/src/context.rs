//! The computation context handed to a computed signal's function: the
//! dependency-tracking frame, the explicit-deps proxy, the abort signal for
//! async computations, and the `cleanup`/`refresh`/`stale` shortcuts.
//!
//! Grounded on `isoprenoid::runtime`'s dependency-recording pattern (push a
//! hook frame, let reads through it populate a tracked-dependency set) and on
//! `flourish-extra::future`'s style of bridging a signal read to an
//! async-aware handle. The explicit-deps proxy is ported as an explicit
//! accessor method (`Context::dep::<V>("name")`) rather than a JS-style
//! property proxy.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use reactor_rt::{ContextKind, HookFrame, Runtime, Uid};

use crate::error::{Result, SignalError, UserError};
use crate::signal::AnySignal;

/// A cooperative cancellation flag for an in-flight async computation.
///
/// Superseding a computation (a new run starting before the old one
/// settles) sets this without panicking or unwinding; aware code inspects
/// it at its own `await` points.
#[derive(Clone, Default)]
pub struct AbortSignal(Rc<Cell<bool>>);

impl AbortSignal {
	pub(crate) fn new() -> Self {
		Self(Rc::new(Cell::new(false)))
	}

	/// Whether this computation has been superseded.
	#[must_use]
	pub fn aborted(&self) -> bool {
		self.0.get()
	}

	/// The sentinel error observable by code that explicitly checks for
	/// cancellation rather than treating it as silent.
	#[must_use]
	pub fn reason(&self) -> Option<SignalError> {
		self.aborted().then_some(SignalError::Aborted)
	}

	pub(crate) fn fire(&self) {
		self.0.set(true);
	}
}

enum DepCacheEntry {
	Value(Rc<dyn Any>),
	Error(UserError),
}

/// A named bundle of explicit dependencies supplied at construction of a
/// computed signal.
#[derive(Default)]
pub struct ExplicitDeps {
	signals: HashMap<String, Rc<dyn AnySignal>>,
}

impl ExplicitDeps {
	/// Starts an empty bundle; add entries with [`ExplicitDeps::with`].
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Names `signal` as an explicit dependency reachable via
	/// `ctx.dep::<V>(name)`.
	#[must_use]
	pub fn with<T: Clone + 'static>(mut self, name: impl Into<String>, signal: &crate::signal::Signal<T>) -> Self {
		self.signals.insert(name.into(), signal.as_any_signal());
		self
	}
}

/// One invocation of a computed signal's compute function.
///
/// Superseded on the next run: reads through [`Context::dep`] after the
/// computation has been aborted are no-ops that return the cached value, per
/// the invariant that a computation context is valid only for the duration
/// of one computation.
pub struct Context {
	rt: Runtime,
	pub(crate) self_uid: Uid,
	abort: AbortSignal,
	in_progress: Cell<bool>,
	tracked: Rc<RefCell<std::collections::HashSet<Uid>>>,
	cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
	explicit: Option<Rc<ExplicitDeps>>,
	dep_cache: RefCell<HashMap<String, DepCacheEntry>>,
	pending_stale: Rc<dyn Fn()>,
	pending_refresh: Rc<dyn Fn()>,
}

impl Context {
	pub(crate) fn new(
		rt: Runtime,
		self_uid: Uid,
		abort: AbortSignal,
		explicit: Option<Rc<ExplicitDeps>>,
		pending_stale: Rc<dyn Fn()>,
		pending_refresh: Rc<dyn Fn()>,
	) -> Self {
		Self {
			rt,
			self_uid,
			abort,
			in_progress: Cell::new(true),
			tracked: Rc::new(RefCell::new(std::collections::HashSet::new())),
			cleanups: RefCell::new(Vec::new()),
			explicit,
			dep_cache: RefCell::new(HashMap::new()),
			pending_stale,
			pending_refresh,
		}
	}

	/// Installs the tracking hook for the duration of `f`, recording every
	/// signal read via a *tracking* read into this context's dependency set.
	pub(crate) fn track<R>(&self, f: impl FnOnce() -> R) -> R {
		let tracked = Rc::clone(&self.tracked);
		let frame = HookFrame::new(ContextKind::Computation).with_on_signal_access(move |uid| {
			tracked.borrow_mut().insert(uid);
		});
		let result = self.rt.with_hooks(frame, f);
		self.in_progress.set(false);
		result
	}

	/// This computation's abort signal.
	#[must_use]
	pub fn abort_signal(&self) -> AbortSignal {
		self.abort.clone()
	}

	/// Registers a cleanup invoked (in reverse order with other cleanups of
	/// this run) before the next recomputation or on disposal.
	///
	/// For an async computed signal, only cleanups registered before the
	/// compute function's first `await` point are captured — the signal
	/// takes this run's cleanup list right after the function call that
	/// produces the future, not after the future itself resolves.
	pub fn cleanup(&self, f: impl FnOnce() + 'static) {
		self.cleanups.borrow_mut().push(Box::new(f));
	}

	pub(crate) fn take_cleanups(&self) -> Vec<Box<dyn FnOnce()>> {
		std::mem::take(&mut *self.cleanups.borrow_mut())
	}

	pub(crate) fn tracked_uids(&self) -> std::collections::HashSet<Uid> {
		self.tracked.borrow().clone()
	}

	/// Reads a named explicit dependency, tracking it and caching the
	/// per-run snapshot so repeated reads (even across `await` boundaries in
	/// an async computation) observe the same value.
	///
	/// # Errors
	/// Returns the dependency's cached computation error if it has one, and
	/// [`SignalError::NotASignal`] if `name` was not registered.
	pub fn dep<V: Clone + 'static>(&self, name: &str) -> Result<V> {
		if let Some(entry) = self.dep_cache.borrow().get(name) {
			return match entry {
				DepCacheEntry::Value(value) => Ok(value.downcast_ref::<V>().expect("dep cache type mismatch").clone()),
				DepCacheEntry::Error(err) => Err(SignalError::Computation(err.clone())),
			};
		}
		let explicit = self.explicit.as_ref().ok_or(SignalError::NotASignal)?;
		let signal = explicit.signals.get(name).ok_or(SignalError::NotASignal)?;
		self.rt.notify_signal_access(signal.uid());
		match signal.peek_any() {
			Ok(value) => {
				let downcast = value.downcast_ref::<V>().expect("dep type mismatch").clone();
				self.dep_cache.borrow_mut().insert(name.to_string(), DepCacheEntry::Value(value));
				Ok(downcast)
			}
			Err(err) => {
				self.dep_cache.borrow_mut().insert(name.to_string(), DepCacheEntry::Error(err.clone()));
				Err(SignalError::Computation(err))
			}
		}
	}

	/// Schedules an eager recomputation, batched with other pending
	/// notifications.
	///
	/// # Errors
	/// Returns [`SignalError::SyncContextMutation`] when called synchronously
	/// during the same call to the compute function that created this
	/// context.
	pub fn refresh(&self) -> Result<()> {
		if self.in_progress.get() {
			return Err(SignalError::SyncContextMutation);
		}
		(self.pending_refresh)();
		Ok(())
	}

	/// Marks the owning signal dirty without scheduling recomputation; the
	/// next tracking read recomputes synchronously.
	///
	/// # Errors
	/// Same synchronous-misuse rule as [`Context::refresh`].
	pub fn stale(&self) -> Result<()> {
		if self.in_progress.get() {
			return Err(SignalError::SyncContextMutation);
		}
		(self.pending_stale)();
		Ok(())
	}
}
