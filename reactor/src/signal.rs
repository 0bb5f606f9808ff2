//! The universal signal object: identity, current value, error cell,
//! listener set, dependency set, computation function, lifecycle flags.
//!
//! Grounded on `flourish::signal`/`flourish::signal_cell` for the
//! read-only-core-plus-mutable-wrapper split (`Signal` vs `SignalCell`), and
//! on `flourish::raw::raw_computed`/`raw_cached` for the lazy
//! recompute-on-stale-read shape. Narrowed per `DESIGN.md` Open Question 2:
//! an ordinary `Rc<RefCell<..>>` core instead of a hand-rolled atomic
//! strong/weak `Signal_`, since this runtime is fixed single-threaded.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as PollContext, Poll};

use reactor_rt::{Emitter, ListenerGuard, Runtime, Uid};
use tracing::{debug, trace};

use crate::context::{AbortSignal, Context, ExplicitDeps};
use crate::equality::Equality;
use crate::error::{Result, SignalError, UserError};

/// The small closed tagged variant of a signal's kind, returned by
/// [`Signal::kind`] and backing the public `is` predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
	/// A signal written to directly.
	Mutable,
	/// A signal computed synchronously from other signals.
	Computed,
	/// A signal computed from an async function with cancellation.
	ComputedAsync,
}

enum SlotState<T> {
	Value(T),
	Error(UserError),
}

type SyncComputeFn<T> = Box<dyn Fn(&Context) -> std::result::Result<T, UserError>>;
type AsyncComputeFn<T> = Box<dyn Fn(&Context) -> Pin<Box<dyn Future<Output = std::result::Result<T, UserError>>>>>;

enum ComputeFn<T> {
	Sync(SyncComputeFn<T>),
	Async(AsyncComputeFn<T>),
}

struct PendingAsync<T> {
	future: Pin<Box<dyn Future<Output = std::result::Result<T, UserError>>>>,
	abort: AbortSignal,
}

pub(crate) struct Inner<T: Clone + 'static> {
	uid: Uid,
	rt: Runtime,
	name: RefCell<Option<String>>,
	kind: SignalKind,
	state: RefCell<Option<SlotState<T>>>,
	initial: RefCell<Option<T>>,
	ever_written: Cell<bool>,
	equals: Equality<T>,
	emitter: Emitter,
	on_change: Option<Box<dyn Fn(&T)>>,
	fallback: Option<Box<dyn Fn(&UserError) -> T>>,
	compute: Option<ComputeFn<T>>,
	explicit_deps: Option<Rc<ExplicitDeps>>,
	dep_guards: RefCell<Vec<(Uid, ListenerGuard)>>,
	stale: Cell<bool>,
	paused: Cell<bool>,
	disposed: Cell<bool>,
	plugin_cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
	leave_tags: RefCell<Vec<Box<dyn FnOnce()>>>,
	pending: RefCell<Option<PendingAsync<T>>>,
	loading: Cell<bool>,
	run_cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// Type-erased view of a signal, used by the computation engine
/// ([`Context::dep`]) and `registry` to subscribe to a signal without
/// knowing its element type.
pub trait AnySignal {
	/// This signal's identity.
	fn uid(&self) -> Uid;
	/// Subscribes a type-erased listener to future notifications, returning
	/// a guard that unsubscribes on drop.
	fn subscribe(&self, listener: Rc<dyn Fn()>) -> ListenerGuard;
	/// Whether this signal has been disposed.
	fn is_disposed(&self) -> bool;
	/// Forces recomputation if stale and returns the current value or error,
	/// boxed. Does not fire `on_signal_access` (callers that need the hook
	/// fire it themselves, so callers can dedupe against their own
	/// in-progress tracking frame).
	fn peek_any(&self) -> std::result::Result<Rc<dyn Any>, UserError>;
	/// This signal's kind, used by [`crate::tags::Tag`]'s kind filter.
	fn kind_any(&self) -> SignalKind;
	/// Type-erased [`Signal::dispose`], used by autodispose tags.
	fn dispose_any(&self) -> Result<()>;
	/// Type-erased [`Signal::refresh`], used by refresh-on plugins operating
	/// generically over a tag's members.
	fn refresh_any(&self);
	/// Type-erased [`Signal::stale`].
	fn stale_any(&self);
	/// Type-erased [`Signal::pause`].
	fn pause_any(&self);
	/// Type-erased [`Signal::resume`].
	fn resume_any(&self);
	/// Type-erased registration of a tag-leave callback, fired once at
	/// disposal (bidirectional tag-membership invariant).
	fn push_leave_tag_any(&self, leave: Box<dyn FnOnce()>);
	/// Type-erased registration of a plugin cleanup, fired in reverse order
	/// at disposal.
	fn push_plugin_cleanup_any(&self, cleanup: Box<dyn FnOnce()>);
}

/// A reactive cell. Covers both the read-only core shared by mutable and
/// computed signals; [`MutableSignal`] adds the write surface.
pub struct Signal<T: Clone + 'static>(pub(crate) Rc<Inner<T>>);

impl<T: Clone + 'static> Clone for Signal<T> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<T: Clone + std::fmt::Debug + 'static> std::fmt::Debug for Signal<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Signal")
			.field("uid", &self.0.uid)
			.field("kind", &self.0.kind)
			.field("name", &self.0.name.borrow())
			.finish()
	}
}

fn noop_waker() -> std::task::Waker {
	use std::task::{RawWaker, RawWakerVTable, Waker};
	fn no_op(_: *const ()) {}
	fn clone(_: *const ()) -> RawWaker {
		raw_waker()
	}
	fn raw_waker() -> RawWaker {
		static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
		RawWaker::new(std::ptr::null(), &VTABLE)
	}
	unsafe { Waker::from_raw(raw_waker()) }
}

impl<T: Clone + 'static> Signal<T> {
	/// Creates a mutable signal with initial value `v`. Prefer
	/// [`crate::mutable`] / [`MutableSignal::new`] at the call site; this is
	/// the shared constructor both go through.
	pub(crate) fn new_mutable(rt: Runtime, value: T, equals: Equality<T>, name: Option<String>, on_change: Option<Box<dyn Fn(&T)>>) -> Self {
		let uid = rt.allocate_uid();
		rt.notify_signal_create(uid);
		let inner = Rc::new(Inner {
			uid,
			rt,
			name: RefCell::new(name),
			kind: SignalKind::Mutable,
			state: RefCell::new(Some(SlotState::Value(value.clone()))),
			initial: RefCell::new(Some(value)),
			ever_written: Cell::new(false),
			equals,
			emitter: Emitter::new(),
			on_change,
			fallback: None,
			compute: None,
			explicit_deps: None,
			dep_guards: RefCell::new(Vec::new()),
			stale: Cell::new(false),
			paused: Cell::new(false),
			disposed: Cell::new(false),
			plugin_cleanups: RefCell::new(Vec::new()),
			leave_tags: RefCell::new(Vec::new()),
			pending: RefCell::new(None),
			loading: Cell::new(false),
			run_cleanups: RefCell::new(Vec::new()),
		});
		trace!(target: "reactor::signal", uid = %inner.uid, "mutable signal constructed");
		let signal = Self(inner);
		crate::registry::register(uid, &signal.as_any_signal());
		signal
	}

	pub(crate) fn new_computed(
		rt: Runtime,
		f: SyncComputeFn<T>,
		explicit_deps: Option<Rc<ExplicitDeps>>,
		equals: Equality<T>,
		name: Option<String>,
		fallback: Option<Box<dyn Fn(&UserError) -> T>>,
		on_change: Option<Box<dyn Fn(&T)>>,
	) -> Self {
		let uid = rt.allocate_uid();
		rt.notify_signal_create(uid);
		let inner = Rc::new(Inner {
			uid,
			rt,
			name: RefCell::new(name),
			kind: SignalKind::Computed,
			state: RefCell::new(None),
			initial: RefCell::new(None),
			ever_written: Cell::new(false),
			equals,
			emitter: Emitter::new(),
			on_change,
			fallback,
			compute: Some(ComputeFn::Sync(f)),
			explicit_deps,
			dep_guards: RefCell::new(Vec::new()),
			stale: Cell::new(true),
			paused: Cell::new(false),
			disposed: Cell::new(false),
			plugin_cleanups: RefCell::new(Vec::new()),
			leave_tags: RefCell::new(Vec::new()),
			pending: RefCell::new(None),
			loading: Cell::new(false),
			run_cleanups: RefCell::new(Vec::new()),
		});
		trace!(target: "reactor::signal", uid = %inner.uid, "computed signal constructed");
		let signal = Self(inner);
		crate::registry::register(uid, &signal.as_any_signal());
		signal
	}

	pub(crate) fn new_computed_async(
		rt: Runtime,
		f: AsyncComputeFn<T>,
		explicit_deps: Option<Rc<ExplicitDeps>>,
		equals: Equality<T>,
		name: Option<String>,
		fallback: Option<Box<dyn Fn(&UserError) -> T>>,
		on_change: Option<Box<dyn Fn(&T)>>,
	) -> Self {
		let uid = rt.allocate_uid();
		rt.notify_signal_create(uid);
		let inner = Rc::new(Inner {
			uid,
			rt,
			name: RefCell::new(name),
			kind: SignalKind::ComputedAsync,
			state: RefCell::new(None),
			initial: RefCell::new(None),
			ever_written: Cell::new(false),
			equals,
			emitter: Emitter::new(),
			on_change,
			fallback,
			compute: Some(ComputeFn::Async(f)),
			explicit_deps,
			dep_guards: RefCell::new(Vec::new()),
			stale: Cell::new(true),
			paused: Cell::new(false),
			disposed: Cell::new(false),
			plugin_cleanups: RefCell::new(Vec::new()),
			leave_tags: RefCell::new(Vec::new()),
			pending: RefCell::new(None),
			loading: Cell::new(false),
			run_cleanups: RefCell::new(Vec::new()),
		});
		trace!(target: "reactor::signal", uid = %inner.uid, "async computed signal constructed");
		let signal = Self(inner);
		crate::registry::register(uid, &signal.as_any_signal());
		signal
	}

	/// This signal's unique identity.
	#[must_use]
	pub fn uid(&self) -> Uid {
		self.0.uid
	}

	/// The display name given at construction, if any.
	#[must_use]
	pub fn name(&self) -> Option<String> {
		self.0.name.borrow().clone()
	}

	/// The signal kind, backing the public `is(value, kind)` predicate.
	#[must_use]
	pub fn kind(&self) -> SignalKind {
		self.0.kind
	}

	/// A type-erased handle to this signal, used by the dependency-tracking
	/// registry and the explicit-deps proxy.
	#[must_use]
	pub fn as_any_signal(&self) -> Rc<dyn AnySignal> {
		Rc::new(self.clone()) as Rc<dyn AnySignal>
	}

	/// Tracking read: fires `onSignalAccess`, forces computation if stale,
	/// and returns the current value or rethrows the cached error.
	///
	/// # Errors
	/// Propagates the signal's cached computation error (wrapped as
	/// [`SignalError::Computation`]).
	pub fn get(&self) -> Result<T> {
		self.0.rt.notify_signal_access(self.0.uid);
		self.read()
	}

	/// Same as [`Signal::get`] but does not fire `onSignalAccess` — used for
	/// observation without forming a dependency.
	///
	/// # Errors
	/// Same as [`Signal::get`].
	pub fn peek(&self) -> Result<T> {
		self.read()
	}

	fn read(&self) -> Result<T> {
		if matches!(self.0.kind, SignalKind::Computed | SignalKind::ComputedAsync) && self.0.stale.get() && !self.0.paused.get() {
			self.recompute();
		}
		if self.0.kind == SignalKind::ComputedAsync {
			self.poll_pending();
		}
		match &*self.0.state.borrow() {
			Some(SlotState::Value(v)) => Ok(v.clone()),
			Some(SlotState::Error(e)) => Err(SignalError::Computation(e.clone())),
			None => {
				// A stale computed that has never successfully run and whose
				// recomputation did not produce a state (e.g. still loading
				// async); report via the Computation variant with a
				// synthesized message.
				Err(SignalError::Computation(UserError::new(NotYetSettled)))
			}
		}
	}

	/// Subscribes to future notifications; de-duplicating per listener
	/// identity is the caller's responsibility.
	pub fn on(&self, listener: impl Fn() + 'static) -> ListenerGuard {
		self.0.emitter.on(listener)
	}

	/// Marks the signal dirty and recomputes eagerly, batched with other
	/// pending notifications. No-op (but still batched/coalesced) on a
	/// mutable signal.
	pub fn refresh(&self) {
		if !matches!(self.0.kind, SignalKind::Computed | SignalKind::ComputedAsync) {
			return;
		}
		self.0.stale.set(true);
		let this = self.clone();
		self.0.rt.enqueue(self.0.uid, move || {
			if this.0.disposed.get() || this.0.paused.get() {
				return;
			}
			this.recompute();
			if this.0.kind == SignalKind::ComputedAsync {
				this.poll_pending();
			}
		});
	}

	/// Marks the signal dirty without scheduling recomputation; the next
	/// tracking read recomputes synchronously.
	pub fn stale(&self) {
		if matches!(self.0.kind, SignalKind::Computed | SignalKind::ComputedAsync) {
			self.0.stale.set(true);
		}
	}

	/// Freezes recomputation; reads return the cached value until
	/// [`Signal::resume`].
	pub fn pause(&self) {
		self.0.paused.set(true);
	}

	/// Resumes recomputation after [`Signal::pause`].
	pub fn resume(&self) {
		self.0.paused.set(false);
	}

	/// Whether this signal is currently paused.
	#[must_use]
	pub fn is_paused(&self) -> bool {
		self.0.paused.get()
	}

	/// Whether this signal has been disposed.
	#[must_use]
	pub fn is_disposed(&self) -> bool {
		self.0.disposed.get()
	}

	/// Terminal disposal: future writes fail, future reads succeed with the
	/// last observed value, plugin cleanups run in reverse order, the signal
	/// leaves every tag it joined, and any in-flight async computation is
	/// aborted. Idempotent.
	///
	/// # Errors
	/// Returns [`SignalError::AggregatePlugin`] if one or more plugin
	/// cleanups panicked; every cleanup still runs regardless.
	pub fn dispose(&self) -> Result<()> {
		if self.0.disposed.replace(true) {
			return Ok(());
		}
		debug!(target: "reactor::signal", uid = %self.0.uid, "signal disposed");
		if let Some(pending) = self.0.pending.borrow_mut().take() {
			pending.abort.fire();
		}
		self.0.dep_guards.borrow_mut().clear();
		self.run_cleanups();
		let mut failures = 0usize;
		for cleanup in self.0.plugin_cleanups.borrow_mut().drain(..).rev() {
			if std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup)).is_err() {
				failures += 1;
			}
		}
		for leave in self.0.leave_tags.borrow_mut().drain(..) {
			leave();
		}
		self.0.emitter.clear();
		crate::registry::unregister(self.0.uid);
		if failures > 0 {
			Err(SignalError::AggregatePlugin(failures))
		} else {
			Ok(())
		}
	}

	/// Registers a cleanup run once, in reverse order with its siblings, at
	/// disposal (used by plugin attachment).
	pub(crate) fn push_plugin_cleanup(&self, cleanup: Box<dyn FnOnce()>) {
		self.0.plugin_cleanups.borrow_mut().push(cleanup);
	}

	/// Registers a callback run once at disposal to leave a tag (used by
	/// `tags::Tag::add`).
	pub(crate) fn push_leave_tag(&self, leave: Box<dyn FnOnce()>) {
		self.0.leave_tags.borrow_mut().push(leave);
	}

	fn notify_change(&self) {
		if let Some(on_change) = &self.0.on_change {
			if let Some(SlotState::Value(v)) = &*self.0.state.borrow() {
				on_change(v);
			}
		}
		let this = self.clone();
		self.0.rt.enqueue(self.0.uid, move || {
			if !this.0.disposed.get() {
				this.0.emitter.emit();
			}
		});
	}

	fn recompute(&self) {
		let Some(compute) = &self.0.compute else { return };
		self.run_cleanups();
		self.0.stale.set(false);
		if let Some(pending) = self.0.pending.borrow_mut().take() {
			pending.abort.fire();
		}
		let abort = AbortSignal::new();
		let this_for_stale = self.clone();
		let this_for_refresh = self.clone();
		let pending_stale: Rc<dyn Fn()> = Rc::new(move || this_for_stale.stale());
		let pending_refresh: Rc<dyn Fn()> = Rc::new(move || this_for_refresh.refresh());
		let ctx = Context::new(self.0.rt.clone(), self.0.uid, abort.clone(), self.0.explicit_deps.clone(), pending_stale, pending_refresh);

		match compute {
			ComputeFn::Sync(f) => {
				let outcome = ctx.track(|| f(&ctx));
				self.rewire_dependencies(&ctx);
				*self.0.run_cleanups.borrow_mut() = ctx.take_cleanups();
				self.settle(outcome);
			}
			ComputeFn::Async(f) => {
				self.0.loading.set(true);
				let future = ctx.track(|| f(&ctx));
				self.rewire_dependencies(&ctx);
				*self.0.run_cleanups.borrow_mut() = ctx.take_cleanups();
				self.0.pending.replace(Some(PendingAsync { future, abort }));
				self.poll_pending();
			}
		}
	}

	/// Runs and clears whatever cleanups the last completed run of this
	/// computed signal registered via `ctx.cleanup(...)`, in reverse
	/// registration order — called just before the next recomputation and at
	/// disposal.
	fn run_cleanups(&self) {
		for cleanup in self.0.run_cleanups.borrow_mut().drain(..).rev() {
			cleanup();
		}
	}

	fn poll_pending(&self) {
		let Some(mut pending) = self.0.pending.borrow_mut().take() else { return };
		if pending.abort.aborted() {
			return;
		}
		let waker = noop_waker();
		let mut cx = PollContext::from_waker(&waker);
		match pending.future.as_mut().poll(&mut cx) {
			Poll::Pending => {
				*self.0.pending.borrow_mut() = Some(pending);
			}
			Poll::Ready(outcome) => {
				self.0.loading.set(false);
				if pending.abort.aborted() {
					return;
				}
				self.settle(outcome);
			}
		}
	}

	fn rewire_dependencies(&self, ctx: &Context) {
		let tracked = ctx.tracked_uids();
		let mut guards = self.0.dep_guards.borrow_mut();
		guards.retain(|(uid, _)| tracked.contains(uid));
		let already: HashSet<Uid> = guards.iter().map(|(uid, _)| *uid).collect();
		for uid in tracked {
			if already.contains(&uid) {
				continue;
			}
			if let Some(dep) = crate::registry::lookup(uid) {
				let this = self.clone();
				let guard = dep.subscribe(Rc::new(move || this.refresh()));
				guards.push((uid, guard));
			}
		}
	}

	fn settle(&self, outcome: std::result::Result<T, UserError>) {
		match outcome {
			Ok(value) => {
				let changed = match &*self.0.state.borrow() {
					Some(SlotState::Value(prev)) => !self.0.equals.eq(prev, &value),
					_ => true,
				};
				*self.0.state.borrow_mut() = Some(SlotState::Value(value));
				if changed {
					self.notify_change();
				}
			}
			Err(err) => {
				if let Some(fallback) = &self.0.fallback {
					let value = fallback(&err);
					let changed = match &*self.0.state.borrow() {
						Some(SlotState::Value(prev)) => !self.0.equals.eq(prev, &value),
						_ => true,
					};
					*self.0.state.borrow_mut() = Some(SlotState::Value(value));
					if changed {
						self.notify_change();
					}
					return;
				}
				let changed = !matches!(&*self.0.state.borrow(), Some(SlotState::Error(_)));
				*self.0.state.borrow_mut() = Some(SlotState::Error(err));
				if changed {
					self.notify_change();
				}
			}
		}
	}

	/// Whether this signal's current value is an in-flight async computation
	/// that has not yet settled (used by the task wrapper).
	#[must_use]
	pub(crate) fn is_loading(&self) -> bool {
		self.0.loading.get()
	}

	pub(crate) fn current_state(&self) -> Option<std::result::Result<T, UserError>> {
		match &*self.0.state.borrow() {
			Some(SlotState::Value(v)) => Some(Ok(v.clone())),
			Some(SlotState::Error(e)) => Some(Err(e.clone())),
			None => None,
		}
	}
}

impl<T: Clone + 'static> AnySignal for Signal<T> {
	fn uid(&self) -> Uid {
		self.0.uid
	}

	fn subscribe(&self, listener: Rc<dyn Fn()>) -> ListenerGuard {
		self.0.emitter.on(move || listener())
	}

	fn is_disposed(&self) -> bool {
		self.0.disposed.get()
	}

	fn peek_any(&self) -> std::result::Result<Rc<dyn Any>, UserError> {
		match self.peek() {
			Ok(v) => Ok(Rc::new(v) as Rc<dyn Any>),
			Err(SignalError::Computation(e)) => Err(e),
			Err(other) => Err(UserError::new(other)),
		}
	}

	fn kind_any(&self) -> SignalKind {
		self.kind()
	}

	fn dispose_any(&self) -> Result<()> {
		self.dispose()
	}

	fn refresh_any(&self) {
		self.refresh();
	}

	fn stale_any(&self) {
		self.stale();
	}

	fn pause_any(&self) {
		self.pause();
	}

	fn resume_any(&self) {
		self.resume();
	}

	fn push_leave_tag_any(&self, leave: Box<dyn FnOnce()>) {
		self.push_leave_tag(leave);
	}

	fn push_plugin_cleanup_any(&self, cleanup: Box<dyn FnOnce()>) {
		self.push_plugin_cleanup(cleanup);
	}
}

/// A mutable signal: the read-only [`Signal`] core plus `set`/`reset`/
/// `hydrate`.
pub struct MutableSignal<T: Clone + 'static>(Signal<T>);

impl<T: Clone + 'static> Clone for MutableSignal<T> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<T: Clone + 'static> Deref for MutableSignal<T> {
	type Target = Signal<T>;
	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<T: Clone + 'static> MutableSignal<T> {
	pub(crate) fn from_signal(signal: Signal<T>) -> Self {
		Self(signal)
	}

	/// The read-only core view of this signal (e.g. to hand to `context`
	/// builders or tags that only need read access).
	#[must_use]
	pub fn as_signal(&self) -> Signal<T> {
		self.0.clone()
	}

	/// Writes a new value (or the result of `f(prev)`), applying the
	/// equality strategy: an equal write is a no-op.
	///
	/// # Errors
	/// Returns [`SignalError::Disposed`] if this signal has already been
	/// disposed.
	pub fn set(&self, next: T) -> Result<()> {
		self.write(|_| next)
	}

	/// Writes the result of applying `f` to the previous value.
	///
	/// # Errors
	/// Same as [`MutableSignal::set`].
	pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
		self.write(f)
	}

	fn write(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
		let inner = &self.0 .0;
		if inner.disposed.get() {
			return Err(SignalError::Disposed);
		}
		inner.ever_written.set(true);
		let next = {
			let state = inner.state.borrow();
			let prev = match state.as_ref() {
				Some(SlotState::Value(v)) => v,
				_ => unreachable!("mutable signal always holds a value"),
			};
			f(prev)
		};
		let changed = match &*inner.state.borrow() {
			Some(SlotState::Value(prev)) => !inner.equals.eq(prev, &next),
			_ => true,
		};
		*inner.state.borrow_mut() = Some(SlotState::Value(next));
		if changed {
			self.0.notify_change();
		}
		Ok(())
	}

	/// Restores the initial value supplied at construction.
	///
	/// # Errors
	/// Same as [`MutableSignal::set`].
	pub fn reset(&self) -> Result<()> {
		let initial = self.0 .0.initial.borrow().clone().expect("mutable signal always has an initial value");
		self.set(initial)
	}

	/// Sets the value without notifying listeners, but only if this signal
	/// has never been written to (persistence plugin replay contract).
	///
	/// # Errors
	/// Same as [`MutableSignal::set`].
	pub fn hydrate(&self, value: T) -> Result<()> {
		let inner = &self.0 .0;
		if inner.disposed.get() {
			return Err(SignalError::Disposed);
		}
		if inner.ever_written.get() {
			return Ok(());
		}
		*inner.state.borrow_mut() = Some(SlotState::Value(value));
		Ok(())
	}
}

#[derive(Debug)]
struct NotYetSettled;

impl std::fmt::Display for NotYetSettled {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "computed signal has not produced a value yet (still loading)")
	}
}

impl std::error::Error for NotYetSettled {}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::RefCell as StdRefCell;
	use std::rc::Rc as StdRc;

	fn fresh_rt() -> Runtime {
		Runtime::new()
	}

	#[test]
	fn mutable_get_returns_last_write() {
		let rt = fresh_rt();
		let s = Signal::new_mutable(rt, 0, Equality::strict(), None, None);
		let s = MutableSignal::from_signal(s);
		s.set(1).unwrap();
		s.set(2).unwrap();
		assert_eq!(s.get().unwrap(), 2);
	}

	#[test]
	fn equal_write_suppresses_notification() {
		let rt = fresh_rt();
		let s = Signal::new_mutable(rt, 0, Equality::strict(), None, None);
		let s = MutableSignal::from_signal(s);
		let log = StdRc::new(StdRefCell::new(Vec::new()));
		let log2 = log.clone();
		let _g = s.on(move || log2.borrow_mut().push(()));
		s.set(0).unwrap();
		assert!(log.borrow().is_empty());
	}

	#[test]
	fn dispose_then_set_fails_but_get_still_succeeds() {
		let rt = fresh_rt();
		let s = Signal::new_mutable(rt, 1, Equality::strict(), None, None);
		let s = MutableSignal::from_signal(s);
		s.dispose().unwrap();
		assert!(matches!(s.set(2), Err(SignalError::Disposed)));
		assert_eq!(s.get().unwrap(), 1);
	}

	#[test]
	fn computed_caches_until_dependency_changes() {
		let rt = fresh_rt();
		let base = Signal::new_mutable(rt.clone(), 2, Equality::strict(), None, None);
		let base = MutableSignal::from_signal(base);
		let calls = StdRc::new(StdRefCell::new(0));
		let calls2 = calls.clone();
		let base_for_compute = base.as_signal();
		let l1 = Signal::new_computed(
			rt,
			Box::new(move |_ctx| {
				*calls2.borrow_mut() += 1;
				Ok(base_for_compute.get().unwrap() * 2)
			}),
			None,
			Equality::strict(),
			None,
			None,
			None,
		);
		assert_eq!(l1.get().unwrap(), 4);
		assert_eq!(l1.get().unwrap(), 4);
		assert_eq!(*calls.borrow(), 1);
		base.set(3).unwrap();
		assert_eq!(l1.get().unwrap(), 6);
		assert_eq!(*calls.borrow(), 2);
	}

	#[test]
	fn cascading_selector_matches_expected_scenario() {
		let rt = fresh_rt();
		let base = Signal::new_mutable(rt.clone(), 2, Equality::strict(), None, None);
		let base = MutableSignal::from_signal(base);
		let b1 = base.as_signal();
		let l1 = Signal::new_computed(rt.clone(), Box::new(move |_| Ok(b1.get().unwrap() * 2)), None, Equality::strict(), None, None, None);
		let l1c = l1.clone();
		let l2 = Signal::new_computed(rt.clone(), Box::new(move |_| Ok(l1c.get().unwrap() + 10)), None, Equality::strict(), None, None, None);
		let l2c = l2.clone();
		let l3 = Signal::new_computed(rt, Box::new(move |_| Ok(l2c.get().unwrap() / 2)), None, Equality::strict(), None, None, None);
		assert_eq!(l3.get().unwrap(), 7);
		base.set(3).unwrap();
		assert_eq!(l3.get().unwrap(), 8);
	}

	#[test]
	fn cached_error_is_rethrown_until_recompute_succeeds() {
		let rt = fresh_rt();
		let should_fail = StdRc::new(std::cell::Cell::new(true));
		let should_fail2 = should_fail.clone();
		let s = Signal::new_computed(
			rt,
			Box::new(move |_ctx| {
				if should_fail2.get() {
					Err(UserError::new(NotYetSettled))
				} else {
					Ok(42)
				}
			}),
			None,
			Equality::strict(),
			None,
			None,
			None,
		);
		assert!(s.get().is_err());
		assert!(s.get().is_err());
		should_fail.set(false);
		s.stale();
		assert_eq!(s.get().unwrap(), 42);
	}

	#[test]
	fn fallback_converts_error_to_value() {
		let rt = fresh_rt();
		let s = Signal::new_computed(
			rt,
			Box::new(move |_ctx| Err(UserError::new(NotYetSettled))),
			None,
			Equality::strict(),
			None,
			Some(Box::new(|_err: &UserError| -1)),
			None,
		);
		assert_eq!(s.get().unwrap(), -1);
	}

	#[test]
	fn context_cleanup_runs_before_next_recompute_and_on_dispose() {
		let rt = fresh_rt();
		let base = Signal::new_mutable(rt.clone(), 1, Equality::strict(), None, None);
		let base = MutableSignal::from_signal(base);
		let base_for_compute = base.as_signal();
		let log = StdRc::new(StdRefCell::new(Vec::new()));
		let log_for_compute = log.clone();
		let s = Signal::new_computed(
			rt,
			Box::new(move |ctx| {
				let value = base_for_compute.get().unwrap();
				let log = log_for_compute.clone();
				ctx.cleanup(move || log.borrow_mut().push(value));
				Ok(value)
			}),
			None,
			Equality::strict(),
			None,
			None,
			None,
		);
		assert_eq!(s.get().unwrap(), 1);
		assert!(log.borrow().is_empty(), "a run's cleanup must not fire until the next recomputation");
		base.set(2).unwrap();
		assert_eq!(s.get().unwrap(), 2);
		assert_eq!(*log.borrow(), vec![1], "the first run's cleanup fires once the second run starts");
		s.dispose().unwrap();
		assert_eq!(*log.borrow(), vec![1, 2], "disposal runs the last run's cleanup too");
	}
}
