//! A fine-grained reactive signals runtime: mutable and computed signals,
//! automatic dependency tracking, batched scheduling, plugins and tags,
//! and scoped disposal.
//!
//! This crate plays the role `flourish` plays over `isoprenoid` in the
//! teacher workspace, narrowed to the single concrete cooperative runtime
//! `reactor_rt` provides (see `DESIGN.md` Open Question 1) rather than the
//! teacher's `SR: SignalRuntimeRef`-generic design.
#![warn(clippy::pedantic)]
#![warn(missing_docs)]

/// `batch(fn)`: defers notification draining until `fn` returns.
pub mod batch;
/// The UI-binding tracking boundary contract.
pub mod boundary;
/// The computation context handed to a computed signal's function.
pub mod context;
/// Equality strategies used to suppress redundant notifications.
pub mod equality;
/// The crate's error taxonomy.
pub mod error;
/// Construction options shared by mutable and computed signals.
pub mod options;
/// Per-signal and group plugins, including persistence.
pub mod plugins;
mod registry;
/// `scope(fn)`: LIFO auto-dispose of signals created during `fn`.
pub mod scope;
/// The universal signal object.
pub mod signal;
/// Deep snapshot and structural diff utilities.
pub mod snapshot;
/// Named, typed collections of signals with lifecycle callbacks.
pub mod tags;
/// The async/task wrapper over a signal whose value may be pending.
pub mod task;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use reactor_rt::Runtime;

pub use batch::batch;
pub use context::{AbortSignal, Context, ExplicitDeps};
pub use equality::Equality;
pub use error::{Result, SignalError, UserError};
pub use options::{Attachment, Options};
pub use plugins::{persist, persist_bundle, refresh_on, reset_on, stale_on, BundleField, GroupPlugin, Persistor, Plugin, SaveKind};
pub use scope::scope;
pub use signal::{AnySignal, MutableSignal, Signal, SignalKind};
pub use snapshot::{deep_snapshot, structural_diff, Node, SnapshotMode, SnapshotSource};
pub use tags::{Tag, TagBuilder, TagEvent, TagKind, TagPlugin};
pub use task::{with_default as task_with_default, Status, Task};

/// Creates a mutable signal holding `value` (construction form 1).
///
/// # Errors
/// Propagates the first construction-time plugin or tag failure from
/// `options`'s `use_` list, rolled back per [`options::apply_attachments`].
pub fn mutable<T>(value: T, options: Options<T>) -> Result<MutableSignal<T>>
where
	T: Clone + PartialEq + 'static,
{
	let rt = Runtime::current();
	let Options { name, equals, on_change, fallback: _, use_ } = options;
	let signal = Signal::new_mutable(rt, value, equals.unwrap_or_default(), name, on_change);
	options::apply_attachments(&signal, use_)?;
	Ok(MutableSignal::from_signal(signal))
}

/// Creates a synchronous computed signal (construction form 2) with no
/// named explicit dependencies; implicit dependencies are still captured by
/// the ambient tracking hook while `f` runs.
///
/// # Errors
/// Same as [`mutable`].
pub fn computed<T>(f: impl Fn(&Context) -> std::result::Result<T, UserError> + 'static, options: Options<T>) -> Result<Signal<T>>
where
	T: Clone + PartialEq + 'static,
{
	computed_with_deps(None, f, options)
}

/// As [`computed`], but `deps` names explicit dependencies reachable inside
/// `f` via `ctx.dep::<V>(name)` (explicit-deps proxy).
///
/// # Errors
/// Same as [`mutable`].
pub fn computed_with_deps<T>(deps: Option<ExplicitDeps>, f: impl Fn(&Context) -> std::result::Result<T, UserError> + 'static, options: Options<T>) -> Result<Signal<T>>
where
	T: Clone + PartialEq + 'static,
{
	let rt = Runtime::current();
	let Options { name, equals, on_change, fallback, use_ } = options;
	let signal = Signal::new_computed(rt, Box::new(f), deps.map(Rc::new), equals.unwrap_or_default(), name, fallback, on_change);
	options::apply_attachments(&signal, use_)?;
	Ok(signal)
}

/// Creates an async computed signal (construction form 3): `f` returns
/// a future rather than a settled value, and the signal additionally
/// maintains a loading flag consumed by [`task::from`]/[`task::with_default`].
///
/// # Errors
/// Same as [`mutable`].
pub fn computed_async<T, F>(f: impl Fn(&Context) -> F + 'static, options: Options<T>) -> Result<Signal<T>>
where
	T: Clone + PartialEq + 'static,
	F: Future<Output = std::result::Result<T, UserError>> + 'static,
{
	computed_async_with_deps(None, f, options)
}

/// As [`computed_async`], with named explicit dependencies.
///
/// # Errors
/// Same as [`mutable`].
pub fn computed_async_with_deps<T, F>(deps: Option<ExplicitDeps>, f: impl Fn(&Context) -> F + 'static, options: Options<T>) -> Result<Signal<T>>
where
	T: Clone + PartialEq + 'static,
	F: Future<Output = std::result::Result<T, UserError>> + 'static,
{
	let rt = Runtime::current();
	let Options { name, equals, on_change, fallback, use_ } = options;
	let boxed: Box<dyn Fn(&Context) -> Pin<Box<dyn Future<Output = std::result::Result<T, UserError>>>>> = Box::new(move |ctx: &Context| Box::pin(f(ctx)) as Pin<Box<dyn Future<Output = std::result::Result<T, UserError>>>>);
	let signal = Signal::new_computed_async(rt, boxed, deps.map(Rc::new), equals.unwrap_or_default(), name, fallback, on_change);
	options::apply_attachments(&signal, use_)?;
	Ok(signal)
}

/// The `is(value, kind)` predicate, narrowed to this crate's closed
/// [`SignalKind`] set rather than the original's wider
/// `{"mutable","computed","accessor","observable","tag",undefined}` tags —
/// `accessor`/`observable` have no counterpart once a signal's element type
/// is erased behind [`AnySignal`], and a [`Tag`] is never itself a signal in
/// this crate, so checking "is this a tag" is just `Tag`'s own existence.
#[must_use]
pub fn is(signal: &dyn AnySignal, kind: SignalKind) -> bool {
	signal.kind_any() == kind
}

#[cfg(test)]
mod tests {
	use super::*;

	// `mutable`/`computed`/etc. read `Runtime::current`, the thread-local
	// singleton (per "single overloaded entry" with no runtime
	// parameter). The test harness runs each `#[test]` on its own thread, so
	// each test already observes a fresh, independent runtime with no setup
	// needed.

	#[test]
	fn mutable_factory_applies_tag_and_rolls_back_on_failure() {
		let tag = TagBuilder::new().kind(TagKind::Mutable).build();
		let s = mutable(1, Options::new().use_(vec![Attachment::tag(tag.clone())])).unwrap();
		assert_eq!(tag.size(), 1);
		assert!(tag.has(&s.as_any_signal()));
	}

	#[test]
	fn computed_factory_reflects_dependency_changes() {
		let base = mutable(2, Options::new()).unwrap();
		let base_for_compute = base.as_signal();
		let doubled = computed(move |_ctx| Ok(base_for_compute.get().unwrap() * 2), Options::new()).unwrap();
		assert_eq!(doubled.get().unwrap(), 4);
		base.set(5).unwrap();
		assert_eq!(doubled.get().unwrap(), 10);
	}

	#[test]
	fn is_predicate_matches_signal_kind() {
		let s = mutable(1, Options::new()).unwrap();
		assert!(is(s.as_any_signal().as_ref(), SignalKind::Mutable));
		assert!(!is(s.as_any_signal().as_ref(), SignalKind::Computed));
	}
}
