//! The async/task wrapper: a settled view `{status, value, error,
//! loading}` over a signal whose current value may be pending.
//!
//! Grounded on `flourish-extra::future`'s style of bridging a signal read to
//! an async-aware handle, adapted to this crate's async-computed-signal
//! model (`crate::signal::Signal::new_computed_async`) rather than a bare
//! `Future` adapter. The JS original additionally exposes a `promise` field
//! referencing the backing promise object; Rust has no equivalent
//! first-class value to hand back once the future is type-erased inside the
//! signal, so this crate omits it and keeps `{status, value, error,
//! loading}` — recorded as a narrowing in `DESIGN.md`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::equality::Equality;
use crate::error::UserError;
use crate::signal::Signal;

/// The settled state of an async computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	/// The backing computation has not yet settled.
	Loading,
	/// The backing computation resolved.
	Success,
	/// The backing computation rejected.
	Error,
}

/// A settled view of a signal whose current value may be a pending async
/// computation.
#[derive(Debug, Clone)]
pub struct Task<T: Clone> {
	/// The current settlement status.
	pub status: Status,
	/// The resolved value, present once `status == Success` (or, for the
	/// stale-while-revalidate flavor built by [`with_default`], at every
	/// status once a first value has ever resolved).
	pub value: Option<T>,
	/// The rejection reason, present once `status == Error`.
	pub error: Option<UserError>,
	/// Convenience flag equivalent to `status == Loading`.
	pub loading: bool,
}

impl<T: Clone> Task<T> {
	fn loading(value: Option<T>) -> Self {
		Self { status: Status::Loading, value, error: None, loading: true }
	}

	fn success(value: T) -> Self {
		Self { status: Status::Success, value: Some(value), error: None, loading: false }
	}

	fn error(err: UserError, value: Option<T>) -> Self {
		Self { status: Status::Error, value, error: Some(err), loading: false }
	}
}

/// Derived view (flavor 1): a task whose fields reflect the latest
/// settled state of `source`. `value` is `None` while loading or erroring.
///
/// Every tracking read of the returned signal also establishes `source` as a
/// dependency, matching the `onTaskAccess` contract's intent (a render
/// pass observing the task observes the backing signal too).
#[must_use]
pub fn from<T: Clone + 'static>(source: &Signal<T>) -> Signal<Task<T>> {
	let src = source.clone();
	let rt = reactor_rt::Runtime::current();
	Signal::new_computed(
		rt,
		Box::new(move |_ctx| {
			rt_notify_task_access(&src);
			let result = src.get();
			let task = if src.is_loading() {
				Task::loading(None)
			} else {
				match result {
					Ok(value) => Task::success(value),
					Err(err) => Task::error(crate::error::to_user_error(err), None),
				}
			};
			Ok(task)
		}),
		None,
		never_equal(),
		None,
		None,
		None,
	)
}

/// Persistent (stale-while-revalidate) view (flavor 2): `value` is
/// never `None` once a first value has resolved — it holds `default` until
/// the first success, then the last successful value across subsequent
/// reloads, even while a newer computation is loading or a newer one errors.
#[must_use]
pub fn with_default<T: Clone + 'static>(source: &Signal<T>, default: T) -> Signal<Task<T>> {
	let src = source.clone();
	let last = Rc::new(RefCell::new(default));
	let rt = reactor_rt::Runtime::current();
	Signal::new_computed(
		rt,
		Box::new(move |_ctx| {
			rt_notify_task_access(&src);
			let result = src.get();
			let current_last = last.borrow().clone();
			let task = if src.is_loading() {
				Task::loading(Some(current_last))
			} else {
				match result {
					Ok(value) => {
						*last.borrow_mut() = value.clone();
						Task::success(value)
					}
					Err(err) => Task::error(crate::error::to_user_error(err), Some(current_last)),
				}
			};
			Ok(task)
		}),
		None,
		never_equal(),
		None,
		None,
		None,
	)
}

fn never_equal<T: Clone + 'static>() -> Equality<Task<T>> {
	Equality::custom(|_a: &Task<T>, _b: &Task<T>| false)
}

fn rt_notify_task_access<T: Clone + 'static>(source: &Signal<T>) {
	reactor_rt::Runtime::current().notify_task_access(source.uid());
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::equality::Equality as Eq_;

	#[test]
	fn derived_view_reflects_success() {
		let rt = reactor_rt::Runtime::new();
		let source = Signal::new_computed(rt, Box::new(|_ctx| Ok(42)), None, Eq_::strict(), None, None, None);
		let task = from(&source);
		let view = task.get().unwrap();
		assert_eq!(view.status, Status::Success);
		assert_eq!(view.value, Some(42));
	}

	#[test]
	fn persistent_view_never_loses_last_good_value_on_error() {
		let rt = reactor_rt::Runtime::new();
		let should_fail = Rc::new(std::cell::Cell::new(false));
		let should_fail2 = should_fail.clone();
		let source = Signal::new_computed(
			rt,
			Box::new(move |_ctx| if should_fail2.get() { Err(UserError::new(TestErr)) } else { Ok(7) }),
			None,
			Eq_::strict(),
			None,
			None,
			None,
		);
		let task = with_default(&source, 0);
		assert_eq!(task.get().unwrap().value, Some(7));
		should_fail.set(true);
		source.stale();
		let view = task.get().unwrap();
		assert_eq!(view.status, Status::Error);
		assert_eq!(view.value, Some(7));
	}

	#[derive(Debug)]
	struct TestErr;
	impl std::fmt::Display for TestErr {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "test error")
		}
	}
	impl std::error::Error for TestErr {}
}
