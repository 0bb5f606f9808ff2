//! Equality strategies used to decide whether a write or a fresh computed
//! value should suppress notification.
//!
//! Grounded on the contract's `"strict" | "shallow" | by-key | custom`
//! closed set. The JS original compares "shallow" by *object
//! reference* per key; Rust's owned, move-by-default values have no
//! comparable reference identity once they're stored in a signal cell, so
//! this crate redefines "shallow" as one-level-deep structural equality over
//! each value's `serde_json::Value` projection (see `crate::snapshot` and
//! `DESIGN.md` for this narrowing).

use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

use crate::snapshot::shallow_equals_json;

/// A comparison strategy for a signal's stored value.
///
/// Cloning an `Equality` clones the `Rc` handle to its comparator, not the
/// comparator itself.
pub struct Equality<T: ?Sized>(Rc<dyn Fn(&T, &T) -> bool>);

impl<T: ?Sized> Clone for Equality<T> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<T: ?Sized> Equality<T> {
	/// Wraps an arbitrary comparator.
	pub fn custom(f: impl Fn(&T, &T) -> bool + 'static) -> Self {
		Self(Rc::new(f))
	}

	/// Evaluates the strategy against a previous and next value.
	#[must_use]
	pub fn eq(&self, a: &T, b: &T) -> bool {
		(self.0)(a, b)
	}
}

impl<T: PartialEq> Equality<T> {
	/// Standard `==` comparison.
	#[must_use]
	pub fn strict() -> Self {
		Self::custom(|a, b| a == b)
	}
}

impl<T: PartialEq + 'static> Default for Equality<T> {
	fn default() -> Self {
		Self::strict()
	}
}

impl<T: Serialize + 'static> Equality<T> {
	/// One-level-deep structural equality over each value's JSON
	/// projection; see the module docs for how this narrows the original
	/// "reference-equal per own key" semantics.
	#[must_use]
	pub fn shallow() -> Self {
		Self::custom(|a, b| {
			let av = serde_json::to_value(a).unwrap_or(Value::Null);
			let bv = serde_json::to_value(b).unwrap_or(Value::Null);
			shallow_equals_json(&av, &bv)
		})
	}
}

impl<T: 'static> Equality<T> {
	/// Compares a projection (a "key") of each value rather than the value
	/// itself, e.g. comparing records by id.
	pub fn by_key<K: PartialEq>(key: impl Fn(&T) -> K + 'static) -> Self {
		Self::custom(move |a, b| key(a) == key(b))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strict_compares_by_value() {
		let eq = Equality::<i32>::strict();
		assert!(eq.eq(&1, &1));
		assert!(!eq.eq(&1, &2));
	}

	#[test]
	fn by_key_ignores_other_fields() {
		#[derive(Clone)]
		struct Todo {
			id: u32,
			title: String,
		}
		let eq = Equality::by_key(|t: &Todo| t.id);
		let a = Todo { id: 1, title: "a".into() };
		let b = Todo { id: 1, title: "b".into() };
		assert!(eq.eq(&a, &b));
	}

	#[test]
	fn shallow_compares_one_level_json() {
		#[derive(Serialize, Clone)]
		struct Point {
			x: i32,
			y: i32,
		}
		let eq = Equality::<Point>::shallow();
		assert!(eq.eq(&Point { x: 1, y: 2 }, &Point { x: 1, y: 2 }));
		assert!(!eq.eq(&Point { x: 1, y: 2 }, &Point { x: 1, y: 3 }));
	}
}
