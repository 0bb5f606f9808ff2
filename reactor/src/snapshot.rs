//! Deep snapshot and structural diff utilities.
//!
//! Ported against `serde_json::Value` rather than an untyped "plain
//! object", per `DESIGN.md` Open Question 3: a signal is represented in a
//! tree by `Node::Signal`, and cycle detection operates over the signal
//! [`Uid`]s visited while walking the tree, since a constructed `Value` has
//! no identity of its own to detect cycles by.

use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use serde_json::{Map, Value};

use reactor_rt::Uid;

/// Whether a snapshot substitutes a signal's value via a tracking read
/// (`Track`) or a non-tracking one (`Peek`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
	/// Read without establishing a dependency.
	Peek,
	/// Read while establishing a dependency, if taken inside a computation.
	Track,
}

/// Object-safe handle a signal implements so it can appear inside a
/// [`Node`] tree without `deep_snapshot`/`structural_diff` needing to know
/// its element type.
pub trait SnapshotSource {
	/// This signal's identity, used for cycle detection.
	fn snapshot_uid(&self) -> Uid;
	/// Renders the current value as JSON, honoring `mode`.
	fn snapshot_value(&self, mode: SnapshotMode) -> Value;
}

/// A tree that may embed signals at arbitrary positions, the input to
/// [`deep_snapshot`].
pub enum Node {
	/// A plain JSON leaf, copied through unchanged.
	Leaf(Value),
	/// A signal; substituted by its current value.
	Signal(Rc<dyn SnapshotSource>),
	/// An array of sub-nodes.
	Array(Vec<Node>),
	/// An object of named sub-nodes.
	Object(BTreeMap<String, Node>),
}

/// Returns a plain `Value` copy of `node` where every embedded signal is
/// replaced by its current value. Cyclic references (a signal whose own
/// snapshot recursively embeds itself) are detected via a visited-uid set
/// and pass through as `null`, mirroring the original's "pass through
/// unchanged" cycle handling as closely as an owned-value port allows.
#[must_use]
pub fn deep_snapshot(node: &Node, mode: SnapshotMode) -> Value {
	let mut seen = HashSet::new();
	deep_snapshot_inner(node, mode, &mut seen)
}

fn deep_snapshot_inner(node: &Node, mode: SnapshotMode, seen: &mut HashSet<Uid>) -> Value {
	match node {
		Node::Leaf(value) => value.clone(),
		Node::Signal(signal) => {
			let uid = signal.snapshot_uid();
			if !seen.insert(uid) {
				return Value::Null;
			}
			let value = signal.snapshot_value(mode);
			seen.remove(&uid);
			value
		}
		Node::Array(items) => Value::Array(items.iter().map(|item| deep_snapshot_inner(item, mode, seen)).collect()),
		Node::Object(fields) => Value::Object(fields.iter().map(|(key, item)| (key.clone(), deep_snapshot_inner(item, mode, seen))).collect()),
	}
}

/// Reference-or-shallow-structural equality: objects are equal
/// when they carry the same own keys with equal values per key; arrays are
/// equal when same length with equal values per index. Values are compared
/// one level deep (not recursively), matching the original's per-key
/// reference check as closely as owned `Value`s allow — see `DESIGN.md`.
#[must_use]
pub fn shallow_equals_json(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Object(a), Value::Object(b)) => a.len() == b.len() && a.iter().all(|(key, av)| b.get(key).is_some_and(|bv| av == bv)),
		(Value::Array(a), Value::Array(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y),
		_ => a == b,
	}
}

/// Returns the minimal patch turning `previous` into `current`, or `None`
/// when they are identical ("no change" sentinel). Objects are diffed
/// recursively per own key; a key present in `previous` but absent from
/// `current` becomes a `null` entry in the patch. Arrays and primitives are
/// returned wholesale when they differ at all.
#[must_use]
pub fn structural_diff(current: &Value, previous: &Value) -> Option<Value> {
	if current == previous {
		return None;
	}
	match (current, previous) {
		(Value::Object(current), Value::Object(previous)) => {
			let mut patch = Map::new();
			for (key, current_value) in current {
				match previous.get(key) {
					Some(previous_value) => {
						if let Some(diff) = structural_diff(current_value, previous_value) {
							patch.insert(key.clone(), diff);
						}
					}
					None => {
						patch.insert(key.clone(), current_value.clone());
					}
				}
			}
			for key in previous.keys() {
				if !current.contains_key(key) {
					patch.insert(key.clone(), Value::Null);
				}
			}
			if patch.is_empty() {
				None
			} else {
				Some(Value::Object(patch))
			}
		}
		_ => Some(current.clone()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	struct Fixed(Uid, Value);
	impl SnapshotSource for Fixed {
		fn snapshot_uid(&self) -> Uid {
			self.0
		}
		fn snapshot_value(&self, _mode: SnapshotMode) -> Value {
			self.1.clone()
		}
	}

	fn uid(n: u64) -> Uid {
		let rt = reactor_rt::Runtime::new();
		let mut last = rt.allocate_uid();
		for _ in 1..n {
			last = rt.allocate_uid();
		}
		last
	}

	#[test]
	fn deep_snapshot_substitutes_signal_values() {
		let sig = Rc::new(Fixed(uid(1), json!(42)));
		let tree = Node::Object(BTreeMap::from([
			("count".to_string(), Node::Signal(sig)),
			("label".to_string(), Node::Leaf(json!("hi"))),
		]));
		let snap = deep_snapshot(&tree, SnapshotMode::Peek);
		assert_eq!(snap, json!({"count": 42, "label": "hi"}));
	}

	#[test]
	fn structural_diff_reports_missing_keys_as_null() {
		let previous = json!({"a": 1, "b": 2});
		let current = json!({"a": 1});
		let diff = structural_diff(&current, &previous).unwrap();
		assert_eq!(diff, json!({"b": Value::Null}));
	}

	#[test]
	fn structural_diff_is_none_when_identical() {
		let value = json!({"a": [1, 2, 3]});
		assert_eq!(structural_diff(&value, &value), None);
	}

	#[test]
	fn structural_diff_returns_arrays_wholesale() {
		let previous = json!({"items": [1, 2]});
		let current = json!({"items": [1, 2, 3]});
		let diff = structural_diff(&current, &previous).unwrap();
		assert_eq!(diff, json!({"items": [1, 2, 3]}));
	}
}
