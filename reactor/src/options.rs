//! Construction options shared by mutable and computed signals: `name`,
//! `equals`, `use: (Plugin | Tag)[]`, `fallback`, `on_change`.
//!
//! The JS original's `use` array mixes per-signal plugins and tags in one
//! list; this crate keeps that shape as an `Attachment<T>` enum rather than
//! splitting it into two constructor parameters, so call sites read the
//! same way as `Options::new().use_(vec![...])`.

use std::rc::Rc;

use crate::equality::Equality;
use crate::error::UserError;
use crate::plugins::Plugin;
use crate::signal::Signal;
use crate::tags::Tag;

/// Either a per-signal plugin or a tag to join, in construction order.
pub enum Attachment<T: Clone + 'static> {
	/// Runs at construction, may register a dispose-time cleanup.
	Plugin(Plugin<T>),
	/// The signal joins this tag at construction.
	Tag(Tag),
}

impl<T: Clone + 'static> Attachment<T> {
	/// Wraps a plugin as an attachment.
	#[must_use]
	pub fn plugin(plugin: Plugin<T>) -> Self {
		Self::Plugin(plugin)
	}

	/// Wraps a tag as an attachment.
	#[must_use]
	pub fn tag(tag: Tag) -> Self {
		Self::Tag(tag)
	}
}

/// Construction options for a signal, mirroring the option bag.
pub struct Options<T: Clone + 'static> {
	pub(crate) name: Option<String>,
	pub(crate) equals: Option<Equality<T>>,
	pub(crate) on_change: Option<Box<dyn Fn(&T)>>,
	pub(crate) fallback: Option<Box<dyn Fn(&UserError) -> T>>,
	pub(crate) use_: Vec<Attachment<T>>,
}

impl<T: Clone + 'static> Default for Options<T> {
	fn default() -> Self {
		Self { name: None, equals: None, on_change: None, fallback: None, use_: Vec::new() }
	}
}

impl<T: Clone + 'static> Options<T> {
	/// Starts an empty option bag.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the signal's human-readable display name.
	#[must_use]
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Sets the equality strategy used to suppress redundant notifications.
	#[must_use]
	pub fn equals(mut self, equals: Equality<T>) -> Self {
		self.equals = Some(equals);
		self
	}

	/// Registers a hook invoked with the new value on every notification.
	#[must_use]
	pub fn on_change(mut self, on_change: impl Fn(&T) + 'static) -> Self {
		self.on_change = Some(Box::new(on_change));
		self
	}

	/// Computed-only: converts a caught computation error into a value
	/// instead of caching and rethrowing it.
	#[must_use]
	pub fn fallback(mut self, fallback: impl Fn(&UserError) -> T + 'static) -> Self {
		self.fallback = Some(Box::new(fallback));
		self
	}

	/// Appends plugins and/or tags applied at construction, in list order.
	#[must_use]
	pub fn use_(mut self, attachments: Vec<Attachment<T>>) -> Self {
		self.use_.extend(attachments);
		self
	}
}

/// Runs every plugin in `attachments` against `signal` in list order, joins
/// every tag, and registers dispose-time cleanups/tag-leaves.
///
/// # Errors
/// If a plugin fails during attach, already-applied plugins (and tag joins)
/// are rolled back in reverse order and the error is returned: a plugin
/// failure aborts construction and rolls back already-applied plugins.
pub(crate) fn apply_attachments<T: Clone + 'static>(signal: &Signal<T>, attachments: Vec<Attachment<T>>) -> crate::error::Result<()> {
	let mut applied_plugin_cleanups: Vec<Box<dyn FnOnce()>> = Vec::new();
	let mut joined_tags: Vec<(Tag, Rc<dyn crate::signal::AnySignal>)> = Vec::new();

	for attachment in attachments {
		match attachment {
			Attachment::Plugin(plugin) => match plugin.0(signal) {
				Ok(cleanup) => {
					if let Some(cleanup) = cleanup {
						applied_plugin_cleanups.push(cleanup);
					}
				}
				Err(err) => {
					for cleanup in applied_plugin_cleanups.into_iter().rev() {
						cleanup();
					}
					for (tag, handle) in joined_tags.into_iter().rev() {
						tag.remove_silently(&handle);
					}
					return Err(err);
				}
			},
			Attachment::Tag(tag) => {
				let handle = signal.as_any_signal();
				match tag.add(handle.clone()) {
					Ok(()) => joined_tags.push((tag, handle)),
					Err(err) => {
						for cleanup in applied_plugin_cleanups.into_iter().rev() {
							cleanup();
						}
						for (tag, handle) in joined_tags.into_iter().rev() {
							tag.remove_silently(&handle);
						}
						return Err(err);
					}
				}
			}
		}
	}

	for cleanup in applied_plugin_cleanups {
		signal.push_plugin_cleanup(cleanup);
	}
	for (tag, handle) in joined_tags {
		let leave_tag = tag.clone();
		let leave_handle = handle;
		signal.push_leave_tag(Box::new(move || leave_tag.remove_silently(&leave_handle)));
	}
	Ok(())
}
