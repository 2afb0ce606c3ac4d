// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Free-form key/value maps used for traits and event properties.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object used for user traits, group traits and event properties.
///
/// # Example
///
/// ```
/// use jitsu_analytics_core::Properties;
///
/// let traits = Properties::new()
///     .insert("email", "john.doe@gmail.com")
///     .insert("plan", "pro");
/// assert_eq!(traits.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
	inner: Map<String, Value>,
}

impl Properties {
	/// Creates an empty map.
	pub fn new() -> Self {
		Self { inner: Map::new() }
	}

	/// Inserts a key-value pair (builder style).
	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	/// Inserts a key-value pair in place.
	pub fn set<K, V>(&mut self, key: K, value: V)
	where
		K: Into<String>,
		V: Into<Value>,
	{
		self.inner.insert(key.into(), value.into());
	}

	/// Shallow merge: keys in `other` replace keys of the same name, other keys
	/// are left untouched.
	pub fn merge(mut self, other: &Properties) -> Self {
		self.merge_in_place(other);
		self
	}

	/// In-place variant of [`Properties::merge`].
	pub fn merge_in_place(&mut self, other: &Properties) {
		for (k, v) in &other.inner {
			self.inner.insert(k.clone(), v.clone());
		}
	}

	/// Removes a key, returning its value.
	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.inner.remove(key)
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.inner.get(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.inner.contains_key(key)
	}

	pub fn as_map(&self) -> &Map<String, Value> {
		&self.inner
	}

	pub fn into_value(self) -> Value {
		Value::Object(self.inner)
	}
}

/// Recursively merges `overlay` into `base`. Objects are merged key by key,
/// any other value in `overlay` replaces the one in `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
	match (base, overlay) {
		(Value::Object(base), Value::Object(overlay)) => {
			for (k, v) in overlay {
				match base.get_mut(&k) {
					Some(existing) => deep_merge(existing, v),
					None => {
						base.insert(k, v);
					}
				}
			}
		}
		(base, overlay) => *base = overlay,
	}
}

impl From<Properties> for Value {
	fn from(props: Properties) -> Self {
		props.into_value()
	}
}

/// Non-object values produce an empty map.
impl From<Value> for Properties {
	fn from(value: Value) -> Self {
		match value {
			Value::Object(map) => Self { inner: map },
			_ => Self::new(),
		}
	}
}

impl From<Map<String, Value>> for Properties {
	fn from(map: Map<String, Value>) -> Self {
		Self { inner: map }
	}
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Properties {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self {
			inner: iter
				.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use serde_json::json;

	#[test]
	fn merge_overrides_same_keys_and_keeps_others() {
		let base = Properties::new().insert("a", 1).insert("b", 2);
		let update = Properties::new().insert("b", 20).insert("c", 3);

		let merged = base.merge(&update);

		assert_eq!(merged.len(), 3);
		assert_eq!(merged.get("a"), Some(&json!(1)));
		assert_eq!(merged.get("b"), Some(&json!(20)));
		assert_eq!(merged.get("c"), Some(&json!(3)));
	}

	#[test]
	fn merge_does_not_recurse_into_nested_objects() {
		let base = Properties::from(json!({"address": {"city": "Berlin", "zip": "10115"}}));
		let update = Properties::from(json!({"address": {"city": "Paris"}}));

		let merged = base.merge(&update);

		assert_eq!(merged.get("address"), Some(&json!({"city": "Paris"})));
	}

	#[test]
	fn from_non_object_value_is_empty() {
		assert!(Properties::from(json!("user1")).is_empty());
		assert!(Properties::from(json!(null)).is_empty());
	}

	#[test]
	fn serializes_as_plain_object() {
		let props = Properties::new().insert("trackParam", "trackValue");
		let json = serde_json::to_value(&props).unwrap();
		assert_eq!(json, json!({"trackParam": "trackValue"}));
	}

	#[test]
	fn deep_merge_merges_nested_objects() {
		let mut base = json!({"page": {"title": "Home", "url": "https://a.test/"}, "traits": {}});
		deep_merge(&mut base, json!({"page": {"title": "Synthetic Title"}}));

		assert_eq!(base["page"]["title"], "Synthetic Title");
		assert_eq!(base["page"]["url"], "https://a.test/");
		assert_eq!(base["traits"], json!({}));
	}

	#[test]
	fn deep_merge_replaces_scalars_with_objects() {
		let mut base = json!({"page": "flat"});
		deep_merge(&mut base, json!({"page": {"title": "T"}}));
		assert_eq!(base, json!({"page": {"title": "T"}}));
	}

	proptest! {
		#[test]
		fn merge_is_idempotent(
			base in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,8}", 0..10),
			update in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,8}", 0..10),
		) {
			let base: Properties = base.into_iter().collect();
			let update: Properties = update.into_iter().collect();

			let once = base.clone().merge(&update);
			let twice = once.clone().merge(&update);
			prop_assert_eq!(once, twice);
		}

		#[test]
		fn merged_values_come_from_update(
			update in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,8}", 1..10),
		) {
			let base = Properties::new().insert("keep", "me");
			let update_props: Properties = update.clone().into_iter().collect();
			let merged = base.merge(&update_props);

			for (k, v) in update {
				prop_assert_eq!(merged.get(&k), Some(&Value::String(v)));
			}
		}
	}
}
