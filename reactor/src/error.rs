//! Re-exports the runtime's error taxonomy for this crate's public surface
//! . `reactor-rt` owns the type definitions since the taxonomy is a
//! concern of the core runtime, not of any one signal kind.

pub use reactor_rt::error::{Result, SignalError, UserError};

/// Unwraps a computation error to the user's original error, boxing any
/// other `SignalError` variant as-is. Used where a caller needs a plain
/// `UserError` (e.g. the task wrapper's `error` field) rather than the full
/// taxonomy.
#[must_use]
pub fn to_user_error(err: SignalError) -> UserError {
	match err {
 SignalError::Computation(inner) => inner,
 other => UserError::new(other),
	}
}

