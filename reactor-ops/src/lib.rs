//! Pipe-chainable operators over `reactor` signals: `mapValues`, `filter`,
//! `distinct`, `debounce`, `throttle`, `pace`, `task`, `refreshOn`/
//! `staleOn`/`resetOn`.
//!
//! Grounded on `flourish-extensions::prelude::SignalExt`'s
//! `#[extension(pub trait SignalExt)]` shape — the prior
//! chainable-operator pattern — and on `flourish-extra`'s free functions it
//! dispatches to (`delta`/`sparse_tally`), mirrored here as the same
//! free-function-plus-extension-trait split.
#![warn(clippy::pedantic)]
#![warn(missing_docs)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ext_trait::extension;

use reactor::error::{to_user_error, Result as ReactorResult};
use reactor::options::{Attachment, Options};
use reactor::signal::{AnySignal, MutableSignal, Signal};
use reactor::task::Task;
use reactor::{computed, Equality};

/// A pluggable delay mechanism for `debounce`/`throttle`/`pace`. The core
/// runtime carries no timer of its own (timeouts are not a core concern;
/// they are provided by utility helpers that consume the task contract) —
/// a host application supplies a `Scheduler` bound to its own clock (a
/// UI's frame loop, an async runtime's timer wheel, or, in tests, a
/// manually-advanced virtual clock).
pub trait Scheduler {
	/// Invokes `f` at a time of this scheduler's choosing. Returns a handle
	/// that cancels the pending call if invoked before it fires.
	fn schedule(&self, f: Box<dyn FnOnce()>) -> Box<dyn FnOnce()>;
}

/// A deterministic, manually-driven [`Scheduler`] for tests: nothing fires
/// until [`ManualScheduler::flush`] is called.
#[derive(Default)]
pub struct ManualScheduler {
	pending: RefCell<Vec<(Rc<Cell<bool>>, Box<dyn FnOnce()>)>>,
}

impl ManualScheduler {
	/// Creates an empty scheduler with nothing pending.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Runs every callback currently pending (in schedule order) that
	/// hasn't since been cancelled, then clears the queue.
	pub fn flush(&self) {
		for (alive, f) in self.pending.take() {
			if alive.get() {
				f();
			}
		}
	}
}

impl Scheduler for ManualScheduler {
	fn schedule(&self, f: Box<dyn FnOnce()>) -> Box<dyn FnOnce()> {
		let alive = Rc::new(Cell::new(true));
		self.pending.borrow_mut().push((Rc::clone(&alive), f));
		Box::new(move || alive.set(false))
	}
}

#[derive(Debug)]
struct FilterNotYetSatisfied;

impl std::fmt::Display for FilterNotYetSatisfied {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "filter predicate has never been satisfied, so the operator has no value to report yet")
	}
}

impl std::error::Error for FilterNotYetSatisfied {}

/// Distinguishes `distinct`'s two membership policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctMode {
	/// Suppresses a value only when it equals the immediately preceding one.
	Consecutive,
	/// Suppresses a value whenever it equals *any* previously observed one.
	All,
}

#[extension(pub trait SignalExt)]
impl<T: Clone + PartialEq + 'static> Signal<T> {
	/// `mapValues(fn, equals?)`: a computed signal re-deriving `U` from
	/// this signal's value on every read.
	fn map_values<U: Clone + PartialEq + 'static>(&self, f: impl Fn(&T) -> U + 'static, equals: Option<Equality<U>>) -> Signal<U> {
		let source = self.clone();
		let mut options = Options::new();
		if let Some(equals) = equals {
			options = options.equals(equals);
		}
		computed(move |_ctx| Ok(f(&source.get().map_err(to_user_error)?)), options).expect("map_values attaches no plugins or tags, so construction cannot fail")
	}

	/// `filter(predicate)`: a computed signal that holds the last value
	/// satisfying `predicate`, skipping any that don't — matching the
	/// original's stream semantics adapted to a single-valued cell: a
	/// non-matching source value leaves the output unchanged instead of
	/// being dropped from a sequence. Errors before the first matching
	/// value with [`FilterNotYetSatisfied`].
	fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> Signal<T> {
		let source = self.clone();
		let last: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
		computed(
			move |_ctx| {
				let value = source.get().map_err(to_user_error)?;
				if predicate(&value) {
					*last.borrow_mut() = Some(value.clone());
					Ok(value)
				} else {
					last.borrow().clone().ok_or_else(|| reactor::error::UserError::new(FilterNotYetSatisfied))
				}
			},
			Options::new(),
		)
		.expect("filter attaches no plugins or tags, so construction cannot fail")
	}

	/// `distinct({mode, equals?})`: suppresses repeated values per `mode`,
	/// per the module docs' narrowing for [`DistinctMode::All`].
	fn distinct(&self, mode: DistinctMode, equals: Option<Equality<T>>) -> Signal<T> {
		let source = self.clone();
		match mode {
			DistinctMode::Consecutive => {
				let mut options = Options::new();
				if let Some(equals) = equals {
					options = options.equals(equals);
				}
				computed(move |_ctx| source.get().map_err(to_user_error), options).expect("distinct attaches no plugins or tags, so construction cannot fail")
			}
			DistinctMode::All => {
				let eq = equals.unwrap_or_default();
				let seen: Rc<RefCell<Vec<T>>> = Rc::new(RefCell::new(Vec::new()));
				let last: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
				computed(
					move |_ctx| {
						let value = source.get().map_err(to_user_error)?;
						let already_seen = seen.borrow().iter().any(|seen_value| eq.eq(seen_value, &value));
						if already_seen {
							Ok(last.borrow().clone().unwrap_or_else(|| value.clone()))
						} else {
							seen.borrow_mut().push(value.clone());
							*last.borrow_mut() = Some(value.clone());
							Ok(value)
						}
					},
					Options::new(),
				)
				.expect("distinct attaches no plugins or tags, so construction cannot fail")
			}
		}
	}

	/// `pace(scheduler)`: every source notification asks `scheduler` when
	/// to deliver the (then-current) value to the output signal, without
	/// cancelling or coalescing prior requests — the least opinionated of
	/// the three timing operators; `scheduler` owns whatever throughput
	/// policy it wants.
	fn pace(&self, scheduler: Rc<dyn Scheduler>) -> Signal<T> {
		let source = self.clone();
		let output = computed(move |_ctx| source.peek().map_err(to_user_error), Options::new()).expect("pace's passthrough computed attaches no plugins or tags, so construction cannot fail");
		let source_for_listener = self.clone();
		let output_for_timer = output.clone();
		let guard = source_for_listener.on(move || {
			let output_for_timer = output_for_timer.clone();
			scheduler.schedule(Box::new(move || output_for_timer.refresh()));
		});
		output.as_any_signal().push_plugin_cleanup_any(Box::new(move || drop(guard)));
		output
	}

	/// `debounce(scheduler)` (narrowed per the module docs from a plain
	/// millisecond count to a caller-supplied [`Scheduler`]): cancels any
	/// pending delivery and reschedules on every notification, so the
	/// output only updates once the source has been quiet for one full
	/// scheduled interval.
	fn debounce(&self, scheduler: Rc<dyn Scheduler>) -> Signal<T> {
		let source = self.clone();
		let output = computed(move |_ctx| source.peek().map_err(to_user_error), Options::new()).expect("debounce's passthrough computed attaches no plugins or tags, so construction cannot fail");
		let pending: Rc<RefCell<Option<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(None));
		let source_for_listener = self.clone();
		let output_for_timer = output.clone();
		let guard = source_for_listener.on(move || {
			if let Some(cancel) = pending.borrow_mut().take() {
				cancel();
			}
			let output_for_timer = output_for_timer.clone();
			let cancel = scheduler.schedule(Box::new(move || output_for_timer.refresh()));
			*pending.borrow_mut() = Some(cancel);
		});
		output.as_any_signal().push_plugin_cleanup_any(Box::new(move || drop(guard)));
		output
	}

	/// `throttle(scheduler)` (narrowed as [`SignalExt::debounce`] is): the
	/// first notification in a window schedules one delivery; further
	/// notifications before it fires are coalesced (the eventual delivery
	/// still reflects whatever the source's latest value is by then).
	fn throttle(&self, scheduler: Rc<dyn Scheduler>) -> Signal<T> {
		let source = self.clone();
		let output = computed(move |_ctx| source.peek().map_err(to_user_error), Options::new()).expect("throttle's passthrough computed attaches no plugins or tags, so construction cannot fail");
		let pending = Rc::new(Cell::new(false));
		let source_for_listener = self.clone();
		let output_for_timer = output.clone();
		let guard = source_for_listener.on(move || {
			if pending.get() {
				return;
			}
			pending.set(true);
			let pending_for_timer = Rc::clone(&pending);
			let output_for_timer = output_for_timer.clone();
			scheduler.schedule(Box::new(move || {
				pending_for_timer.set(false);
				output_for_timer.refresh();
			}));
		});
		output.as_any_signal().push_plugin_cleanup_any(Box::new(move || drop(guard)));
		output
	}

	/// `task()`: the derived task view over this signal.
	fn task(&self) -> Signal<Task<T>> {
		reactor::task::from(self)
	}

	/// `task(default)`: the stale-while-revalidate task view, whose `value`
	/// is never `None` once a first value has resolved.
	fn task_with_default(&self, default: T) -> Signal<Task<T>> {
		reactor::task::with_default(self, default)
	}

	/// `refreshOn(notifier, filter?)` as a chainable operator: a
	/// passthrough computed signal that eagerly refreshes whenever
	/// `notifier` fires (and `filter`, if given, passes).
	fn refresh_on(&self, notifier: Rc<dyn AnySignal>, filter: Option<Rc<dyn Fn() -> bool>>) -> Signal<T> {
		let source = self.clone();
		computed(
			move |_ctx| source.get().map_err(to_user_error),
			Options::new().use_(vec![Attachment::plugin(reactor::plugins::refresh_on(notifier, filter))]),
		)
		.expect("refresh_on's plugin is infallible, so attaching it cannot fail")
	}

	/// `staleOn(notifier, filter?)`: as [`SignalExt::refresh_on`] but
	/// marks the output stale instead of eagerly recomputing.
	fn stale_on(&self, notifier: Rc<dyn AnySignal>, filter: Option<Rc<dyn Fn() -> bool>>) -> Signal<T> {
		let source = self.clone();
		computed(
			move |_ctx| source.get().map_err(to_user_error),
			Options::new().use_(vec![Attachment::plugin(reactor::plugins::stale_on(notifier, filter))]),
		)
		.expect("stale_on's plugin is infallible, so attaching it cannot fail")
	}
}

#[extension(pub trait MutableSignalExt)]
impl<T: Clone + PartialEq + 'static> MutableSignal<T> {
	/// `resetOn(notifier, filter?)`: mutable-only; retrofits the
	/// reset-on plugin directly onto this signal via
	/// [`AnySignal::push_plugin_cleanup_any`] rather than building a new
	/// wrapper signal, since resetting is itself a mutation of `self`.
	///
	/// # Errors
	/// Propagates the plugin's own failure, if any (the built-in
	/// `reset_on` plugin never fails, but the signature stays fallible since
	/// [`reactor::plugins::Plugin::attach`] is generally fallible).
	fn reset_on(&self, notifier: Rc<dyn AnySignal>, filter: Option<Rc<dyn Fn() -> bool>>) -> ReactorResult<()> {
		let plugin = reactor::plugins::reset_on::<T>(notifier, filter);
		match plugin.attach(self) {
			Ok(Some(cleanup)) => {
				self.as_any_signal().push_plugin_cleanup_any(cleanup);
				Ok(())
			}
			Ok(None) => Ok(()),
			Err(err) => Err(err),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reactor::{mutable, Options as ReactorOptions};

	#[test]
	fn map_values_tracks_source_changes() {
		let base = mutable(2, ReactorOptions::new()).unwrap();
		let doubled = base.as_signal().map_values(|v| v * 2, None);
		assert_eq!(doubled.get().unwrap(), 4);
		base.set(5).unwrap();
		assert_eq!(doubled.get().unwrap(), 10);
	}

	#[test]
	fn filter_keeps_last_matching_value() {
		let base = mutable(2, ReactorOptions::new()).unwrap();
		let evens = base.as_signal().filter(|v| v % 2 == 0);
		assert_eq!(evens.get().unwrap(), 2);
		base.set(3).unwrap();
		assert_eq!(evens.get().unwrap(), 2, "an odd value must not overwrite the last even one");
		base.set(4).unwrap();
		assert_eq!(evens.get().unwrap(), 4);
	}

	#[test]
	fn distinct_all_suppresses_previously_seen_values() {
		let base = mutable(1, ReactorOptions::new()).unwrap();
		let distinct = base.as_signal().distinct(DistinctMode::All, None);
		assert_eq!(distinct.get().unwrap(), 1);
		base.set(2).unwrap();
		assert_eq!(distinct.get().unwrap(), 2);
		base.set(1).unwrap();
		assert_eq!(distinct.get().unwrap(), 2, "a value seen earlier in this signal's history must not re-surface");
	}

	#[test]
	fn debounce_only_delivers_after_the_scheduler_fires() {
		let scheduler = Rc::new(ManualScheduler::new());
		let base = mutable(1, ReactorOptions::new()).unwrap();
		let debounced = base.as_signal().debounce(scheduler.clone());
		assert_eq!(debounced.peek().unwrap(), 1);
		base.set(2).unwrap();
		base.set(3).unwrap();
		assert_eq!(debounced.peek().unwrap(), 1, "no scheduler flush has happened yet");
		scheduler.flush();
		assert_eq!(debounced.peek().unwrap(), 3);
	}

	#[test]
	fn throttle_coalesces_notifications_within_one_pending_window() {
		let scheduler = Rc::new(ManualScheduler::new());
		let base = mutable(1, ReactorOptions::new()).unwrap();
		let throttled = base.as_signal().throttle(scheduler.clone());
		base.set(2).unwrap();
		base.set(3).unwrap();
		scheduler.flush();
		assert_eq!(throttled.peek().unwrap(), 3);
	}
}
