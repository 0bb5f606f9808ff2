//! Per-signal and group plugins: persistence, `refreshOn`/`staleOn`/
//! `resetOn`, and the group-plugin shape used for coordinated behaviors over
//! a named bundle of signals.
//!
//! Grounded on `flourish::announcer`'s construction/cleanup ordering style
//! (a plugin runs at construction and hands back a cleanup closure run at
//! teardown) and on `reactor_rt::Emitter`'s listener-guard pattern for the
//! notifier subscriptions `refresh_on`/`stale_on`/`reset_on` install. The
//! persistence plugin's load-memoization follows the contract that load is
//! memoized across signals sharing the persistor; concurrent loads are
//! deduplicated.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{SignalError, UserError};
use crate::signal::{AnySignal, MutableSignal, Signal};

/// A per-signal plugin: a function run once at construction that may
/// register a dispose-time cleanup, or fail and abort construction (a
/// plugin failure aborts construction and rolls back already-applied
/// plugins).
pub struct Plugin<T: Clone + 'static>(pub(crate) Rc<dyn Fn(&Signal<T>) -> std::result::Result<Option<Box<dyn FnOnce()>>, SignalError>>);

impl<T: Clone + 'static> Plugin<T> {
	/// Wraps a closure as a plugin.
	pub fn new(f: impl Fn(&Signal<T>) -> std::result::Result<Option<Box<dyn FnOnce()>>, SignalError> + 'static) -> Self {
		Self(Rc::new(f))
	}

	/// Wraps an infallible closure as a plugin.
	pub fn infallible(f: impl Fn(&Signal<T>) -> Option<Box<dyn FnOnce()>> + 'static) -> Self {
		Self::new(move |signal| Ok(f(signal)))
	}

	/// Runs this plugin against an already-constructed `signal`, for
	/// retrofitting a plugin after construction (e.g. via
	/// [`crate::signal::AnySignal::push_plugin_cleanup_any`]) rather than
	/// only through [`crate::options::Options::use_`] at construction time.
	///
	/// # Errors
	/// Whatever the plugin itself returns on failure.
	pub fn attach(&self, signal: &Signal<T>) -> std::result::Result<Option<Box<dyn FnOnce()>>, SignalError> {
		(self.0)(signal)
	}
}

impl<T: Clone + 'static> Clone for Plugin<T> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

/// One named member of a bundle a [`GroupPlugin`] attaches over: the
/// type-erased signal handle (identity, subscribe, dispose) paired with a
/// caller-supplied JSON projection, since the bundle's members may be
/// signals of different element types that only the call site building the
/// bundle knows how to serialize.
#[derive(Clone)]
pub struct BundleField {
	/// The type-erased signal handle.
	pub signal: Rc<dyn AnySignal>,
	/// Reads the signal's current value as JSON (without tracking).
	pub to_json: Rc<dyn Fn() -> Value>,
}

/// A group plugin: attaches over a named bundle of signals rather than one
/// (used for coordinated behaviors, e.g. persisting all fields of a form
/// together).
pub struct GroupPlugin(Rc<dyn Fn(&HashMap<String, BundleField>) -> Option<Box<dyn FnOnce()>>>);

impl GroupPlugin {
	/// Wraps a closure as a group plugin.
	pub fn new(f: impl Fn(&HashMap<String, BundleField>) -> Option<Box<dyn FnOnce()>> + 'static) -> Self {
		Self(Rc::new(f))
	}

	/// Runs this group plugin over `bundle`, returning the cleanup if any.
	#[must_use]
	pub fn attach(&self, bundle: &HashMap<String, BundleField>) -> Option<Box<dyn FnOnce()>> {
		(self.0)(bundle)
	}
}

fn on_notify<T: Clone + 'static>(notifier: Rc<dyn AnySignal>, filter: Option<Rc<dyn Fn() -> bool>>, action: Rc<dyn Fn(&Signal<T>)>) -> Plugin<T> {
	Plugin::infallible(move |signal: &Signal<T>| {
		let signal = signal.clone();
		let filter = filter.clone();
		let action = action.clone();
		let guard = notifier.subscribe(Rc::new(move || {
			if filter.as_ref().is_none_or(|f| f()) {
				action(&signal);
			}
		}));
		Some(Box::new(move || drop(guard)) as Box<dyn FnOnce()>)
	})
}

/// `refreshOn(notifier, filter?)`: subscribes to `notifier` and calls
/// `signal.refresh()` on every notification that passes `filter` (or
/// unconditionally if no filter is given).
#[must_use]
pub fn refresh_on<T: Clone + 'static>(notifier: Rc<dyn AnySignal>, filter: Option<Rc<dyn Fn() -> bool>>) -> Plugin<T> {
	on_notify(notifier, filter, Rc::new(Signal::refresh))
}

/// `staleOn(notifier, filter?)`: as [`refresh_on`] but marks the signal
/// stale instead of eagerly recomputing.
#[must_use]
pub fn stale_on<T: Clone + 'static>(notifier: Rc<dyn AnySignal>, filter: Option<Rc<dyn Fn() -> bool>>) -> Plugin<T> {
	on_notify(notifier, filter, Rc::new(Signal::stale))
}

/// `resetOn(notifier, filter?)`: mutable-only; resets the signal to its
/// initial value on every qualifying notification.
#[must_use]
pub fn reset_on<T: Clone + 'static>(notifier: Rc<dyn AnySignal>, filter: Option<Rc<dyn Fn() -> bool>>) -> Plugin<T> {
	Plugin::infallible(move |signal: &Signal<T>| {
		let mutable = MutableSignal::from_signal(signal.clone());
		let filter = filter.clone();
		let guard = notifier.subscribe(Rc::new(move || {
			if filter.as_ref().is_none_or(|f| f()) {
				let _ = mutable.reset();
			}
		}));
		Some(Box::new(move || drop(guard)) as Box<dyn FnOnce()>)
	})
}

/// Whether a `save` call is a partial per-key update or a full bundle
/// overwrite (persistence storage contract).
#[derive(Debug, Clone)]
pub enum SaveKind {
	/// Partial per-key update: only the named keys changed.
	Merge(HashMap<String, Value>),
	/// Full bundle overwrite: `values` is the complete record.
	Overwrite(HashMap<String, Value>),
}

/// The storage contract a persistence plugin is configured with. `load` is
/// memoized and deduplicated across every signal sharing one `Persistor`
/// instance; `save` callers discriminate merge vs. overwrite themselves.
pub trait Persistor {
	/// Loads the persisted record, or as much of it as exists.
	///
	/// # Errors
	/// Any load failure; reported to [`Persistor::on_error`] if provided.
	fn load(&self) -> std::result::Result<HashMap<String, Value>, UserError>;

	/// Persists `kind`.
	///
	/// # Errors
	/// Any save failure; reported to [`Persistor::on_error`] if provided.
	fn save(&self, kind: SaveKind) -> std::result::Result<(), UserError>;

	/// Optional hook for load/save failures. Default: log via `tracing`.
	fn on_error(&self, err: &UserError, phase: &str) {
		warn!(target: "reactor::plugins::persistence", %err, phase, "persistence operation failed");
	}
}

struct LoadCache {
	loaded: RefCell<Option<Rc<HashMap<String, Value>>>>,
}

thread_local! {
	static LOAD_CACHES: RefCell<HashMap<usize, Rc<LoadCache>>> = RefCell::new(HashMap::new());
}

fn load_cache_for(persistor: &Rc<dyn Persistor>) -> Rc<LoadCache> {
	let key = Rc::as_ptr(persistor).cast::<()>() as usize;
	LOAD_CACHES.with(|caches| {
		caches
			.borrow_mut()
			.entry(key)
			.or_insert_with(|| Rc::new(LoadCache { loaded: RefCell::new(None) }))
			.clone()
	})
}

fn load_memoized(persistor: &Rc<dyn Persistor>) -> Option<Rc<HashMap<String, Value>>> {
	let cache = load_cache_for(persistor);
	if let Some(loaded) = cache.loaded.borrow().as_ref() {
		return Some(Rc::clone(loaded));
	}
	match persistor.load() {
		Ok(record) => {
			let record = Rc::new(record);
			*cache.loaded.borrow_mut() = Some(Rc::clone(&record));
			Some(record)
		}
		Err(err) => {
			persistor.on_error(&err, "load");
			None
		}
	}
}

/// Binds a mutable signal's value to one key of a persistor's record in
/// per-key (`merge`) mode: on attach, the signal is hydrated from the
/// persistor's (memoized, deduplicated) load if the key is present; every
/// subsequent change is saved back as a `{type: "merge", values: {key: ...}}`
/// call.
#[must_use]
pub fn persist<T>(persistor: Rc<dyn Persistor>, key: impl Into<String>) -> Plugin<T>
where
	T: Clone + Serialize + DeserializeOwned + 'static,
{
	let key = key.into();
	Plugin::infallible(move |signal: &Signal<T>| {
		let mutable = MutableSignal::from_signal(signal.clone());
		if let Some(record) = load_memoized(&persistor) {
			if let Some(raw) = record.get(&key) {
				if let Ok(value) = serde_json::from_value::<T>(raw.clone()) {
					let _ = mutable.hydrate(value);
				}
			}
		}
		let persistor = Rc::clone(&persistor);
		let key = key.clone();
		let guard = mutable.on(move || {
			if let Ok(value) = mutable.peek() {
				if let Ok(json) = serde_json::to_value(&value) {
					let mut values = HashMap::new();
					values.insert(key.clone(), json);
					if let Err(err) = persistor.save(SaveKind::Merge(values)) {
						persistor.on_error(&err, "save");
					}
				}
			}
		});
		Some(Box::new(move || drop(guard)) as Box<dyn FnOnce()>)
	})
}

/// Bundle (`overwrite`) mode persistence group plugin: every change to any
/// member re-saves the whole named bundle as a
/// `{type: "overwrite", values: {...}}` call. Hydration on attach is left to
/// the caller (via each field's own [`persist`] or a manual `hydrate`),
/// since this group plugin's bundle carries a to-JSON projection but not a
/// from-JSON one.
#[must_use]
pub fn persist_bundle(persistor: Rc<dyn Persistor>) -> GroupPlugin {
	GroupPlugin::new(move |bundle: &HashMap<String, BundleField>| {
		let bundle = bundle.clone();
		let mut guards = Vec::new();
		for field in bundle.values() {
			let bundle = bundle.clone();
			let persistor = Rc::clone(&persistor);
			let guard = field.signal.subscribe(Rc::new(move || {
				let values = bundle.iter().map(|(key, field)| (key.clone(), (field.to_json)())).collect();
				if let Err(err) = persistor.save(SaveKind::Overwrite(values)) {
					persistor.on_error(&err, "save");
				}
			}));
			guards.push(guard);
		}
		Some(Box::new(move || drop(guards)) as Box<dyn FnOnce()>)
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::equality::Equality;
	use reactor_rt::Runtime;

	struct MemoryPersistor {
		store: Rc<RefCell<HashMap<String, Value>>>,
	}

	impl Persistor for MemoryPersistor {
		fn load(&self) -> std::result::Result<HashMap<String, Value>, UserError> {
			Ok(self.store.borrow().clone())
		}
		fn save(&self, kind: SaveKind) -> std::result::Result<(), UserError> {
			match kind {
				SaveKind::Merge(values) | SaveKind::Overwrite(values) => {
					self.store.borrow_mut().extend(values);
				}
			}
			Ok(())
		}
	}

	#[test]
	fn persist_round_trips_across_a_simulated_restart() {
		let rt = Runtime::new();
		let store = Rc::new(RefCell::new(HashMap::new()));

		// "Session one": a signal bound to its own persistor instance, the
		// real-world analog of a freshly constructed persistor at app start.
		let persistor_a: Rc<dyn Persistor> = Rc::new(MemoryPersistor { store: Rc::clone(&store) });
		let a = Signal::new_mutable(rt.clone(), 0i32, Equality::strict(), None, None);
		crate::options::apply_attachments(&a, vec![crate::options::Attachment::plugin(persist(persistor_a, "count"))]).unwrap();
		let a = MutableSignal::from_signal(a);
		a.set(7).unwrap();

		// "Restart": a distinct persistor instance over the same backing
		// store, and a fresh signal.
		let persistor_b: Rc<dyn Persistor> = Rc::new(MemoryPersistor { store });
		let b = Signal::new_mutable(rt, 0i32, Equality::strict(), None, None);
		crate::options::apply_attachments(&b, vec![crate::options::Attachment::plugin(persist(persistor_b, "count"))]).unwrap();
		let b = MutableSignal::from_signal(b);
		assert_eq!(b.get().unwrap(), 7);
	}

	#[test]
	fn refresh_on_triggers_refresh() {
		let rt = Runtime::new();
		let notifier = Signal::new_mutable(rt.clone(), 0, Equality::strict(), None, None);
		let calls = Rc::new(std::cell::Cell::new(0));
		let calls2 = calls.clone();
		let computed = Signal::new_computed(
			rt,
			Box::new(move |_ctx| {
				calls2.set(calls2.get() + 1);
				Ok(calls2.get())
			}),
			None,
			Equality::strict(),
			None,
			None,
			None,
		);
		crate::options::apply_attachments(&computed, vec![crate::options::Attachment::plugin(refresh_on(notifier.as_any_signal(), None))]).unwrap();
		let _ = computed.get();
		let notifier = MutableSignal::from_signal(notifier);
		notifier.set(1).unwrap();
		assert!(calls.get() >= 2);
	}
}
