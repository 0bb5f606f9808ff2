//! Runtime error taxonomy.
//!
//! Not present in the prior design crate (`isoprenoid` has no typed errors at
//! all), added per the ambient-stack decision in `SPEC_FULL.md` . Shape
//! follows the closed taxonomy in the contract's error-handling
//! section rather than the prior panic-on-misuse style, since a real
//! embedding application needs to recover from e.g. a disposed-signal write.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A boxed, cloneable user error, used so a computed signal's cached error
/// can be handed back identically on every subsequent read.
#[derive(Clone)]
pub struct UserError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl UserError {
	/// Wraps an arbitrary error for storage in a signal's error cell.
	pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
 Self(Arc::new(error))
	}

	/// Wraps an already-boxed error.
	pub fn from_boxed(error: Arc<dyn std::error::Error + Send + Sync + 'static>) -> Self {
 Self(error)
	}
}

impl fmt::Debug for UserError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 fmt::Debug::fmt(&self.0, f)
	}
}

impl fmt::Display for UserError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 fmt::Display::fmt(&self.0, f)
	}
}

impl std::error::Error for UserError {}

/// The closed error taxonomy surfaced by the runtime and the signal API
/// built on top of it.
///
/// # Logic
/// Misuse errors (`Disposed`, `IllegalNesting`, `SyncContextMutation`,
/// `TagKindMismatch`, `NotASignal`, `MaxSizeExceeded`, `TagAfterDispose`)
/// are meant to be raised synchronously at the offending call site.
/// `Computation` preserves the user's original error so repeated reads of a
/// failed computed signal observe an identical error. `Cycle` is raised by
/// the scheduler when a single drain exceeds its propagation-depth cap.
#[derive(Debug, Clone, Error)]
pub enum SignalError {
	/// A write was attempted against a disposed signal.
	#[error("cannot set value on disposed signal")]
	Disposed,
	/// An operation that establishes a reactive tracking boundary was
	/// attempted while already inside a batch.
	#[error("illegal nesting: cannot open a tracking boundary inside a batch")]
	IllegalNesting,
	/// `context.refresh`/`context.stale` was called synchronously
	/// during the same computation that requested it.
	#[error("context.refresh/context.stale may only be called asynchronously")]
	SyncContextMutation,
	/// A signal was added to a tag whose `kind` filter it does not match.
	#[error("signal kind does not match tag kind")]
	TagKindMismatch,
	/// `is`/tag membership was attempted against a non-signal value.
	#[error("value is not a signal")]
	NotASignal,
	/// A tag's `maxSize` was exceeded on add.
	#[error("tag max size exceeded")]
	MaxSizeExceeded,
	/// A signal was added to a tag after the signal (or the tag) was
	/// disposed.
	#[error("cannot join a tag after disposal")]
	TagAfterDispose,
	/// A computed signal's function threw or its future rejected.
	#[error("computation failed: {0}")]
	Computation(UserError),
	/// A synchronous-flagged computed function returned a promise-like
	/// value.
	#[error("synchronous computed function returned a pending future")]
	PromiseGuard,
	/// A plugin failed during attach; construction is rolled back.
	#[error("plugin failed during attach: {0}")]
	Plugin(UserError),
	/// One or more plugin cleanups failed during disposal. Cleanups are
	/// never skipped because of this: every cleanup still runs, and any
	/// failures are collected here.
	#[error("{0} plugin cleanup(s) failed during disposal")]
	AggregatePlugin(usize),
	/// The scheduler's propagation-depth cap was exceeded in a single
	/// drain.
	#[error("cyclic propagation detected (depth cap {0} exceeded)")]
	Cycle(usize),
	/// An async computation observed its abort signal before completing.
	/// Ordinarily silent; surfaced only to code that explicitly inspects
	/// `ctx.abort_signal.reason`.
	#[error("computation was aborted and superseded")]
	Aborted,
}

/// Convenience alias for fallible runtime operations.
pub type Result<T> = std::result::Result<T, SignalError>;
