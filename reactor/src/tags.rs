//! Tags: named, typed collections of signals with lifecycle callbacks
//! (tag membership is bidirectional — a signal always knows which tags it
//! belongs to, and leaves them all on disposal).
//!
//! No single teacher file plays this role (the prior design has no group
//! collection type); modeled after `reactor_rt::Emitter`'s callback style
//! plus `ankurah-ankurah/signals`' `ObserverSet` de-duplicated membership
//! pattern, narrowed to this crate's single-threaded `Rc` world.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use reactor_rt::Uid;

use crate::error::{Result, SignalError};
use crate::signal::{AnySignal, SignalKind};

/// Restricts which signal kinds may join a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
	/// Only mutable signals may join.
	Mutable,
	/// Only computed (sync or async) signals may join.
	Computed,
	/// Any signal kind may join.
	Any,
}

impl TagKind {
	fn matches(self, kind: SignalKind) -> bool {
		match self {
			TagKind::Any => true,
			TagKind::Mutable => kind == SignalKind::Mutable,
			TagKind::Computed => matches!(kind, SignalKind::Computed | SignalKind::ComputedAsync),
		}
	}
}

/// A join/leave event, handed to a tag's `on_change` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEvent {
	/// A signal joined the tag.
	Add,
	/// A signal left the tag (explicit `delete`, `clear`, or autodispose).
	Delete,
}

/// A type-erased attachment applied to every member of a tag at join time
/// (nested tags and plugins applied to every member at join time). Plugins
/// here operate on the type-erased [`AnySignal`] surface, since a tag's
/// members may be signals of different element types.
pub struct TagPlugin(pub(crate) Rc<dyn Fn(&Rc<dyn AnySignal>) -> Box<dyn FnOnce()>>);

impl TagPlugin {
	/// Wraps a closure as a tag plugin. The closure's return value is the
	/// cleanup run when the member leaves the tag (or the tag disposes it).
	pub fn new(f: impl Fn(&Rc<dyn AnySignal>) -> Box<dyn FnOnce()> + 'static) -> Self {
		Self(Rc::new(f))
	}
}

struct Options {
	name: Option<String>,
	kind: TagKind,
	on_add: Option<Box<dyn Fn(&Rc<dyn AnySignal>)>>,
	on_delete: Option<Box<dyn Fn(&Rc<dyn AnySignal>)>>,
	on_change: Option<Box<dyn Fn(TagEvent, &Rc<dyn AnySignal>)>>,
	max_size: Option<usize>,
	auto_dispose: bool,
	nested_tags: Vec<Tag>,
	nested_plugins: Vec<TagPlugin>,
}

struct Inner {
	members: RefCell<HashMap<Uid, Rc<dyn AnySignal>>>,
	join_cleanups: RefCell<HashMap<Uid, Vec<Box<dyn FnOnce()>>>>,
	options: Options,
	disposing: Cell<bool>,
}

/// A named, typed collection of signals. Cloning a `Tag` clones the
/// handle, not the membership — all clones observe the same set.
#[derive(Clone)]
pub struct Tag(Rc<Inner>);

/// Builder for [`Tag`] construction options.
pub struct TagBuilder {
	name: Option<String>,
	kind: TagKind,
	on_add: Option<Box<dyn Fn(&Rc<dyn AnySignal>)>>,
	on_delete: Option<Box<dyn Fn(&Rc<dyn AnySignal>)>>,
	on_change: Option<Box<dyn Fn(TagEvent, &Rc<dyn AnySignal>)>>,
	max_size: Option<usize>,
	auto_dispose: bool,
	nested_tags: Vec<Tag>,
	nested_plugins: Vec<TagPlugin>,
}

impl Default for TagBuilder {
	fn default() -> Self {
		Self {
			name: None,
			kind: TagKind::Any,
			on_add: None,
			on_delete: None,
			on_change: None,
			max_size: None,
			auto_dispose: false,
			nested_tags: Vec::new(),
			nested_plugins: Vec::new(),
		}
	}
}

impl TagBuilder {
	/// Starts a tag builder with defaults: `kind = Any`, no size limit, no
	/// autodispose, no callbacks.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the tag's display name.
	#[must_use]
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Restricts membership to a signal kind.
	#[must_use]
	pub fn kind(mut self, kind: TagKind) -> Self {
		self.kind = kind;
		self
	}

	/// Fired once, exactly when a signal joins.
	#[must_use]
	pub fn on_add(mut self, f: impl Fn(&Rc<dyn AnySignal>) + 'static) -> Self {
		self.on_add = Some(Box::new(f));
		self
	}

	/// Fired once, exactly when a signal leaves (explicit delete, `clear`,
	/// or autodispose).
	#[must_use]
	pub fn on_delete(mut self, f: impl Fn(&Rc<dyn AnySignal>) + 'static) -> Self {
		self.on_delete = Some(Box::new(f));
		self
	}

	/// Fired once per join/leave, after the more specific `on_add`/`on_delete`.
	#[must_use]
	pub fn on_change(mut self, f: impl Fn(TagEvent, &Rc<dyn AnySignal>) + 'static) -> Self {
		self.on_change = Some(Box::new(f));
		self
	}

	/// Caps membership size; exceeding it on `add` throws
	/// [`SignalError::MaxSizeExceeded`].
	#[must_use]
	pub fn max_size(mut self, max_size: usize) -> Self {
		self.max_size = Some(max_size);
		self
	}

	/// When set, removing a member (via `delete`/`clear`) also disposes it,
	/// unless it is already disposing.
	#[must_use]
	pub fn auto_dispose(mut self, auto_dispose: bool) -> Self {
		self.auto_dispose = auto_dispose;
		self
	}

	/// Nests other tags: every member of this tag also joins each nested
	/// tag at join time.
	#[must_use]
	pub fn use_tags(mut self, tags: Vec<Tag>) -> Self {
		self.nested_tags = tags;
		self
	}

	/// Nests type-erased plugins applied to every member at join time.
	#[must_use]
	pub fn use_plugins(mut self, plugins: Vec<TagPlugin>) -> Self {
		self.nested_plugins = plugins;
		self
	}

	/// Builds the tag.
	///
	/// Cycle detection among nested tags happens lazily, the first time a
	/// member actually joins and the nesting chain is walked (see
	/// [`Tag::add`]).
	#[must_use]
	pub fn build(self) -> Tag {
		Tag(Rc::new(Inner {
			members: RefCell::new(HashMap::new()),
			join_cleanups: RefCell::new(HashMap::new()),
			options: Options {
				name: self.name,
				kind: self.kind,
				on_add: self.on_add,
				on_delete: self.on_delete,
				on_change: self.on_change,
				max_size: self.max_size,
				auto_dispose: self.auto_dispose,
				nested_tags: self.nested_tags,
				nested_plugins: self.nested_plugins,
			},
			disposing: Cell::new(false),
		}))
	}
}

impl Tag {
	/// Shorthand for `TagBuilder::new().build()`.
	#[must_use]
	pub fn new() -> Self {
		TagBuilder::new().build()
	}

	/// This tag's display name, if any.
	#[must_use]
	pub fn name(&self) -> Option<String> {
		self.0.options.name.clone()
	}

	/// Current membership size.
	#[must_use]
	pub fn size(&self) -> usize {
		self.0.members.borrow().len()
	}

	/// Whether `signal` is currently a member.
	#[must_use]
	pub fn has(&self, signal: &Rc<dyn AnySignal>) -> bool {
		self.0.members.borrow().contains_key(&signal.uid())
	}

	/// All current members, as a snapshot vector.
	#[must_use]
	pub fn signals(&self) -> Vec<Rc<dyn AnySignal>> {
		self.0.members.borrow().values().cloned().collect()
	}

	/// Runs `f` against every current member.
	pub fn for_each(&self, mut f: impl FnMut(&Rc<dyn AnySignal>)) {
		for member in self.signals() {
			f(&member);
		}
	}

	/// Maps every current member through `f`, collecting the results.
	pub fn map<R>(&self, mut f: impl FnMut(&Rc<dyn AnySignal>) -> R) -> Vec<R> {
		self.signals().iter().map(|member| f(member)).collect()
	}

	/// Adds `signal` to this tag, joining every nested tag and running every
	/// nested plugin in turn.
	///
	/// # Errors
	/// - [`SignalError::TagKindMismatch`] if `signal`'s kind doesn't match
	///   this tag's [`TagKind`] filter.
	/// - [`SignalError::TagAfterDispose`] if `signal` has already been
	///   disposed.
	/// - [`SignalError::MaxSizeExceeded`] if adding would exceed `max_size`.
	/// - Any nested tag's own join error (nesting cycles surface as
	///   repeated joins that each re-check membership, so a direct cycle
	///   back to this tag is a no-op rather than infinite recursion; see
	///   the de-duplication check below).
	pub fn add(&self, signal: Rc<dyn AnySignal>) -> Result<()> {
		if signal.is_disposed() {
			return Err(SignalError::TagAfterDispose);
		}
		if !self.0.options.kind.matches(signal.kind_any()) {
			return Err(SignalError::TagKindMismatch);
		}
		let uid = signal.uid();
		if self.0.members.borrow().contains_key(&uid) {
			// Idempotent / breaks a direct nested-tag cycle: a signal
			// already joining this tag (e.g. via a nested-tag chain that
			// loops back here) is not re-joined or re-notified.
			return Ok(());
		}
		if let Some(max) = self.0.options.max_size {
			if self.0.members.borrow().len() >= max {
				return Err(SignalError::MaxSizeExceeded);
			}
		}

		self.0.members.borrow_mut().insert(uid, Rc::clone(&signal));
		let mut cleanups: Vec<Box<dyn FnOnce()>> = Vec::new();

		for nested in &self.0.options.nested_tags {
			nested.add(Rc::clone(&signal))?;
			let nested = nested.clone();
			let signal_for_leave = Rc::clone(&signal);
			cleanups.push(Box::new(move || nested.remove_silently(&signal_for_leave)));
		}
		for plugin in &self.0.options.nested_plugins {
			cleanups.push((plugin.0)(&signal));
		}
		self.0.join_cleanups.borrow_mut().insert(uid, cleanups);

		if let Some(on_add) = &self.0.options.on_add {
			on_add(&signal);
		}
		if let Some(on_change) = &self.0.options.on_change {
			on_change(TagEvent::Add, &signal);
		}
		Ok(())
	}

	/// Removes `signal` from this tag (`has(signal)` becomes `false`),
	/// running its join-time cleanups and, if `auto_dispose` is set,
	/// disposing it (unless it is already disposing).
	///
	/// No-op if `signal` was not a member.
	pub fn delete(&self, signal: &Rc<dyn AnySignal>) {
		if self.remove_silently(signal) {
			if self.0.options.auto_dispose && !signal.is_disposed() {
				let _ = signal.dispose_any();
			}
		}
	}

	/// Removes every member, per-member as [`Tag::delete`] would.
	pub fn clear(&self) {
		self.0.disposing.set(true);
		for signal in self.signals() {
			self.delete(&signal);
		}
		self.0.disposing.set(false);
	}

	/// Removes `signal` from membership and runs its join cleanups, firing
	/// `on_delete`/`on_change`, but never disposes it. Used both by
	/// [`Tag::delete`] and by a member's own disposal (on dispose it is
	/// removed from every tag), which must not re-dispose the signal that is
	/// already disposing.
	pub(crate) fn remove_silently(&self, signal: &Rc<dyn AnySignal>) -> bool {
		let uid = signal.uid();
		if self.0.members.borrow_mut().remove(&uid).is_none() {
			return false;
		}
		if let Some(cleanups) = self.0.join_cleanups.borrow_mut().remove(&uid) {
			for cleanup in cleanups {
				cleanup();
			}
		}
		if let Some(on_delete) = &self.0.options.on_delete {
			on_delete(signal);
		}
		if let Some(on_change) = &self.0.options.on_change {
			on_change(TagEvent::Delete, signal);
		}
		true
	}
}

impl Default for Tag {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::equality::Equality;
	use crate::signal::Signal;
	use reactor_rt::Runtime;
	use std::cell::RefCell as StdRefCell;

	#[test]
	fn autodispose_tag_disposes_on_delete() {
		let rt = Runtime::new();
		let s = Signal::new_mutable(rt, 1, Equality::strict(), None, None);
		let handle = s.as_any_signal();
		let tag = TagBuilder::new().auto_dispose(true).build();
		tag.add(Rc::clone(&handle)).unwrap();
		tag.delete(&handle);
		assert!(s.is_disposed());
	}

	#[test]
	fn max_size_exceeded_on_third_add() {
		let rt = Runtime::new();
		let tag = TagBuilder::new().max_size(1).build();
		let a = Signal::new_mutable(rt.clone(), 1, Equality::strict(), None, None);
		let b = Signal::new_mutable(rt, 2, Equality::strict(), None, None);
		tag.add(a.as_any_signal()).unwrap();
		assert!(matches!(tag.add(b.as_any_signal()), Err(SignalError::MaxSizeExceeded)));
	}

	#[test]
	fn kind_mismatch_rejected() {
		let rt = Runtime::new();
		let tag = TagBuilder::new().kind(TagKind::Computed).build();
		let s = Signal::new_mutable(rt, 1, Equality::strict(), None, None);
		assert!(matches!(tag.add(s.as_any_signal()), Err(SignalError::TagKindMismatch)));
	}

	#[test]
	fn callbacks_fire_once_per_join_and_leave() {
		let rt = Runtime::new();
		let adds = Rc::new(StdRefCell::new(0));
		let deletes = Rc::new(StdRefCell::new(0));
		let adds2 = adds.clone();
		let deletes2 = deletes.clone();
		let tag = TagBuilder::new()
			.on_add(move |_| *adds2.borrow_mut() += 1)
			.on_delete(move |_| *deletes2.borrow_mut() += 1)
			.build();
		let s = Signal::new_mutable(rt, 1, Equality::strict(), None, None);
		let handle = s.as_any_signal();
		tag.add(Rc::clone(&handle)).unwrap();
		tag.add(Rc::clone(&handle)).unwrap();
		assert_eq!(*adds.borrow(), 1);
		tag.delete(&handle);
		tag.delete(&handle);
		assert_eq!(*deletes.borrow(), 1);
	}
}
