//! Thread-local uid → signal-handle registry.
//!
//! `reactor-rt`'s hook stack is deliberately signal-agnostic: its
//! `on_signal_access` hook receives only an opaque [`Uid`]
//! (`reactor_rt::hooks::HookFrame`). The computation engine
//! (`crate::context`) needs the *actual* signal handle for each uid it
//! observes, so it can subscribe to it as a dependency. This module is the
//! layer that bridges the two: every signal registers a strong handle to
//! itself at construction, and the engine looks uids back up here after a
//! computation finishes tracking.
//!
//! The registry, not the caller, is this handle's sole long-term owner: a
//! signal is kept alive by its registry entry until [`unregister`] runs at
//! disposal, mirroring the rest of the crate's "reads still work, but
//! teardown is explicit" disposal model rather than relying on a `Weak`
//! that would dangle the moment the registering call's own temporary
//! `Rc<dyn AnySignal>` goes out of scope.
//!
//! Grounded on the general "symbol table" shape the prior
//! `SignalRuntimeRef::Symbol` plays a similar role for (an opaque handle
//! the runtime hands back that the typed layer above resolves), narrowed
//! here to a plain thread-local map since this crate fixes one concrete
//! runtime rather than threading a generic symbol type through every call.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use reactor_rt::Uid;

use crate::signal::AnySignal;

thread_local! {
	static REGISTRY: RefCell<HashMap<Uid, Rc<dyn AnySignal>>> = RefCell::new(HashMap::new());
}

/// Registers `signal` under its own uid. Called once at construction.
pub(crate) fn register(uid: Uid, signal: &Rc<dyn AnySignal>) {
	REGISTRY.with(|registry| {
		registry.borrow_mut().insert(uid, Rc::clone(signal));
	});
}

/// Removes the registry entry for `uid`, dropping the registry's strong
/// handle. Called at disposal; this is what lets a disposed signal's
/// backing allocation actually be freed once every other strong handle
/// (e.g. a compute closure's own captured clone) also goes away.
pub(crate) fn unregister(uid: Uid) {
	REGISTRY.with(|registry| {
		registry.borrow_mut().remove(&uid);
	});
}

/// Looks up the live handle for `uid`, if the signal hasn't been disposed.
#[must_use]
pub(crate) fn lookup(uid: Uid) -> Option<Rc<dyn AnySignal>> {
	REGISTRY.with(|registry| registry.borrow().get(&uid).cloned())
}
