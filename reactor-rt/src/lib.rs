//! Single-threaded cooperative runtime backing the `reactor` signals crate.
//!
//! This crate plays the role `isoprenoid` plays for `flourish`: it owns the
//! pieces that don't need to know what a "signal" is — id allocation, the
//! ambient dependency-tracking hook stack, the notification scheduler and
//! its batching/cycle-detection rules, and the listener multicast primitive.
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod emitter;
pub mod error;
pub mod hooks;
pub mod runtime;

pub use emitter::{Emitter, ListenerGuard};
pub use error::SignalError;
pub use hooks::{ContextKind, HookFrame};
pub use runtime::{batch, next_uid, Propagation, Runtime, Uid};
