// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity types: the anonymous browser id, the identified user, and the
//! normalization of the two `identify` call shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::properties::Properties;

/// Opaque identifier assigned to a browser profile before identification.
///
/// Values read back from storage are kept verbatim, so this is a string
/// rather than a parsed UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnonymousId(String);

impl AnonymousId {
	/// Generates a fresh random id.
	pub fn generate() -> Self {
		Self(Uuid::new_v4().to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for AnonymousId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<String> for AnonymousId {
	fn from(s: String) -> Self {
		Self(s)
	}
}

impl From<&str> for AnonymousId {
	fn from(s: &str) -> Self {
		Self(s.to_string())
	}
}

/// The known user: an optional user id plus accumulated traits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	#[serde(default)]
	pub traits: Properties,
}

impl Identity {
	/// Applies an identify call.
	///
	/// `user_id` replaces the stored id only when present. `traits` are
	/// shallow-merged: same-named keys are overwritten, the rest is kept.
	pub fn merge(&mut self, user_id: Option<&str>, traits: &Properties) {
		if let Some(id) = user_id {
			self.user_id = Some(id.to_string());
		}
		self.traits.merge_in_place(traits);
	}

	pub fn is_anonymous(&self) -> bool {
		self.user_id.is_none()
	}
}

/// First argument of `identify`: either a user id or a traits object.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifyTarget {
	UserId(String),
	Traits(Properties),
}

impl IdentifyTarget {
	/// Resolves the call into the `(user_id, traits)` pair the event builder
	/// works with. Traits given in the target position are merged under the
	/// explicit `traits` argument.
	pub fn resolve(self, traits: Properties) -> ResolvedIdentify {
		match self {
			IdentifyTarget::UserId(id) => ResolvedIdentify {
				user_id: Some(id),
				traits,
			},
			IdentifyTarget::Traits(inline) => ResolvedIdentify {
				user_id: None,
				traits: inline.merge(&traits),
			},
		}
	}
}

impl From<&str> for IdentifyTarget {
	fn from(s: &str) -> Self {
		IdentifyTarget::UserId(s.to_string())
	}
}

impl From<String> for IdentifyTarget {
	fn from(s: String) -> Self {
		IdentifyTarget::UserId(s)
	}
}

impl From<&String> for IdentifyTarget {
	fn from(s: &String) -> Self {
		IdentifyTarget::UserId(s.clone())
	}
}

impl From<Properties> for IdentifyTarget {
	fn from(p: Properties) -> Self {
		IdentifyTarget::Traits(p)
	}
}

/// Best-effort interpretation of loosely-typed input: strings and numbers are
/// user ids, objects are traits, anything else identifies nothing.
impl From<Value> for IdentifyTarget {
	fn from(value: Value) -> Self {
		match value {
			Value::String(s) => IdentifyTarget::UserId(s),
			Value::Number(n) => IdentifyTarget::UserId(n.to_string()),
			Value::Object(map) => IdentifyTarget::Traits(Properties::from(map)),
			_ => IdentifyTarget::Traits(Properties::new()),
		}
	}
}

/// A fully-resolved identify call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentify {
	pub user_id: Option<String>,
	pub traits: Properties,
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use serde_json::json;

	#[test]
	fn anonymous_ids_are_unique() {
		assert_ne!(AnonymousId::generate(), AnonymousId::generate());
	}

	#[test]
	fn identity_defaults_to_anonymous() {
		let identity = Identity::default();
		assert!(identity.is_anonymous());
		assert!(identity.traits.is_empty());
	}

	#[test]
	fn merge_without_user_id_keeps_previous_user_id() {
		let mut identity = Identity::default();
		identity.merge(Some("user1"), &Properties::new().insert("email", "a@b.com"));
		identity.merge(None, &Properties::new().insert("plan", "pro"));

		assert_eq!(identity.user_id.as_deref(), Some("user1"));
		assert_eq!(identity.traits.get("email"), Some(&json!("a@b.com")));
		assert_eq!(identity.traits.get("plan"), Some(&json!("pro")));
	}

	#[test]
	fn merge_replaces_user_id_when_given() {
		let mut identity = Identity::default();
		identity.merge(Some("user1"), &Properties::new());
		identity.merge(Some("user2"), &Properties::new());
		assert_eq!(identity.user_id.as_deref(), Some("user2"));
	}

	#[test]
	fn traits_target_resolves_without_user_id() {
		let target = IdentifyTarget::from(json!({"email": "john.doe3@gmail.com"}));
		let resolved = target.resolve(Properties::new());

		assert_eq!(resolved.user_id, None);
		assert_eq!(
			resolved.traits.get("email"),
			Some(&json!("john.doe3@gmail.com"))
		);
	}

	#[test]
	fn inline_traits_are_overridden_by_explicit_traits() {
		let target = IdentifyTarget::from(Properties::new().insert("a", 1).insert("b", 1));
		let resolved = target.resolve(Properties::new().insert("b", 2));
		assert_eq!(resolved.traits.get("a"), Some(&json!(1)));
		assert_eq!(resolved.traits.get("b"), Some(&json!(2)));
	}

	#[test]
	fn numeric_value_is_a_user_id() {
		assert_eq!(
			IdentifyTarget::from(json!(42)),
			IdentifyTarget::UserId("42".to_string())
		);
	}

	#[test]
	fn null_value_identifies_nothing() {
		let resolved = IdentifyTarget::from(Value::Null).resolve(Properties::new());
		assert_eq!(resolved.user_id, None);
		assert!(resolved.traits.is_empty());
	}

	#[test]
	fn identity_serializes_camel_case() {
		let identity = Identity {
			user_id: Some("user1".to_string()),
			traits: Properties::new().insert("email", "a@b.com"),
		};
		let json = serde_json::to_value(&identity).unwrap();
		assert_eq!(json, json!({"userId": "user1", "traits": {"email": "a@b.com"}}));
	}

	proptest! {
		#[test]
		fn repeated_identify_is_idempotent(
			user_id in "[a-zA-Z0-9_]{1,20}",
			traits in proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9@.]{0,12}", 0..8),
		) {
			let traits: Properties = traits.into_iter().collect();

			let mut once = Identity::default();
			once.merge(Some(&user_id), &traits);

			let mut twice = once.clone();
			twice.merge(Some(&user_id), &traits);

			prop_assert_eq!(once, twice);
		}
	}
}
