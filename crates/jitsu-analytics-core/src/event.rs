// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The canonical event envelope and one builder per call shape.
//!
//! Builders only see fully-resolved input: the identify/page overloads are
//! normalized beforehand by [`IdentifyTarget`](crate::IdentifyTarget) and
//! [`PageTarget`](crate::PageTarget).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::ContextBlock;
use crate::identify::AnonymousId;
use crate::properties::Properties;

/// Key inside traits/properties whose object is merged into `context`
/// instead of being sent as a property.
pub const CONTEXT_OVERRIDE_KEY: &str = "context";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
	Identify,
	Group,
	Page,
	Track,
}

impl EventType {
	/// Route segment used by the collection endpoint.
	pub fn as_str(&self) -> &'static str {
		match self {
			EventType::Identify => "identify",
			EventType::Group => "group",
			EventType::Page => "page",
			EventType::Track => "track",
		}
	}
}

impl std::fmt::Display for EventType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Canonical envelope shared by all four call shapes. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
	pub message_id: String,
	#[serde(rename = "type")]
	pub event_type: EventType,
	pub anonymous_id: AnonymousId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	/// Track event name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub event: Option<String>,
	/// Page name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub group_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub traits: Option<Properties>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub properties: Option<Properties>,
	pub context: ContextBlock,
	pub timestamp: DateTime<Utc>,
}

/// Identity and context stamped onto every event.
#[derive(Debug, Clone)]
pub struct EventStamp {
	pub anonymous_id: AnonymousId,
	pub user_id: Option<String>,
	pub context: ContextBlock,
}

/// Builds an `identify` event. `traits` is the call's own argument, not the
/// merged identity; the merged set travels in `context.traits`.
pub fn identify_event(stamp: EventStamp, traits: Properties) -> Event {
	let (traits, stamp) = lift_context(traits, stamp);
	Event {
		traits: Some(traits),
		..envelope(EventType::Identify, stamp)
	}
}

/// Builds a `group` event.
pub fn group_event(stamp: EventStamp, group_id: impl Into<String>, traits: Properties) -> Event {
	let (traits, stamp) = lift_context(traits, stamp);
	Event {
		group_id: Some(group_id.into()),
		traits: Some(traits),
		..envelope(EventType::Group, stamp)
	}
}

/// Builds a `page` event. Unnamed pages are named by downstream consumers
/// from `context.page.title`.
pub fn page_event(stamp: EventStamp, name: Option<String>, properties: Properties) -> Event {
	let (properties, stamp) = lift_context(properties, stamp);
	Event {
		name,
		properties: Some(properties),
		..envelope(EventType::Page, stamp)
	}
}

/// Builds a `track` event.
pub fn track_event(stamp: EventStamp, event: impl Into<String>, properties: Properties) -> Event {
	let (properties, stamp) = lift_context(properties, stamp);
	Event {
		event: Some(event.into()),
		properties: Some(properties),
		..envelope(EventType::Track, stamp)
	}
}

fn envelope(event_type: EventType, stamp: EventStamp) -> Event {
	Event {
		message_id: Uuid::new_v4().to_string(),
		event_type,
		anonymous_id: stamp.anonymous_id,
		user_id: stamp.user_id,
		event: None,
		name: None,
		group_id: None,
		traits: None,
		properties: None,
		context: stamp.context,
		timestamp: Utc::now(),
	}
}

/// Moves a `context` object out of the payload and merges it into the
/// stamp's context. A non-object `context` stays in the payload; an override
/// that does not fit the context shape is dropped.
fn lift_context(mut payload: Properties, mut stamp: EventStamp) -> (Properties, EventStamp) {
	if !matches!(payload.get(CONTEXT_OVERRIDE_KEY), Some(Value::Object(_))) {
		return (payload, stamp);
	}
	let Some(overrides) = payload.remove(CONTEXT_OVERRIDE_KEY) else {
		return (payload, stamp);
	};
	if let Ok(context) = stamp.context.clone().with_overrides(overrides) {
		stamp.context = context;
	}
	(payload, stamp)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::{build_context, LibraryInfo};
	use crate::identify::Identity;
	use crate::page::PageInfo;
	use crate::CampaignContext;
	use serde_json::json;

	fn stamp() -> EventStamp {
		let identity = Identity {
			user_id: Some("user1".to_string()),
			traits: Properties::new().insert("email", "john.doe@gmail.com"),
		};
		let campaign = CampaignContext::from_url("https://example.test/?utm_source=source");
		EventStamp {
			anonymous_id: AnonymousId::from("anon-1"),
			user_id: identity.user_id.clone(),
			context: build_context(
				&PageInfo::new("https://example.test/basic.html").with_title("Basic"),
				&identity,
				campaign.as_ref(),
				&LibraryInfo::new("test-lib", "1.0.0"),
			),
		}
	}

	#[test]
	fn track_event_sets_name_and_properties() {
		let event = track_event(
			stamp(),
			"pageLoaded",
			Properties::new().insert("trackParam", "trackValue"),
		);

		assert_eq!(event.event_type, EventType::Track);
		assert_eq!(event.event.as_deref(), Some("pageLoaded"));
		assert_eq!(
			event.properties.as_ref().unwrap().get("trackParam"),
			Some(&json!("trackValue"))
		);
		assert_eq!(event.user_id.as_deref(), Some("user1"));
		assert_eq!(
			event.context.traits.get("email"),
			Some(&json!("john.doe@gmail.com"))
		);
		assert_eq!(
			event.context.campaign.as_ref().unwrap().source.as_deref(),
			Some("source")
		);
	}

	#[test]
	fn identify_event_carries_only_call_traits() {
		let event = identify_event(stamp(), Properties::new().insert("plan", "pro"));

		let traits = event.traits.unwrap();
		assert_eq!(traits.len(), 1);
		assert_eq!(traits.get("plan"), Some(&json!("pro")));
		assert_eq!(
			event.context.traits.get("email"),
			Some(&json!("john.doe@gmail.com"))
		);
	}

	#[test]
	fn group_event_sets_group_id() {
		let event = group_event(stamp(), "group1", Properties::new().insert("name", "Group 1"));
		assert_eq!(event.event_type, EventType::Group);
		assert_eq!(event.group_id.as_deref(), Some("group1"));
		assert_eq!(event.traits.unwrap().get("name"), Some(&json!("Group 1")));
	}

	#[test]
	fn page_event_lifts_context_override() {
		let props = Properties::from(json!({
			"caseName": "page-without-name",
			"context": {"page": {"title": "Synthetic Title"}}
		}));

		let event = page_event(stamp(), None, props);

		let properties = event.properties.unwrap();
		assert!(!properties.contains_key("context"));
		assert_eq!(properties.get("caseName"), Some(&json!("page-without-name")));
		assert_eq!(event.context.page.title.as_deref(), Some("Synthetic Title"));
		assert_eq!(event.context.page.path.as_deref(), Some("/basic.html"));
		assert_eq!(event.name, None);
	}

	#[test]
	fn malformed_context_override_is_dropped() {
		let props = Properties::from(json!({"context": {"page": 5}, "a": 1}));
		let event = track_event(stamp(), "t", props);

		assert_eq!(event.context.page.title.as_deref(), Some("Basic"));
		assert!(!event.properties.as_ref().unwrap().contains_key("context"));
	}

	#[test]
	fn non_object_context_property_is_kept() {
		let props = Properties::new().insert("context", "plain");
		let event = track_event(stamp(), "t", props);
		assert_eq!(
			event.properties.unwrap().get("context"),
			Some(&json!("plain"))
		);
	}

	#[test]
	fn wire_format_uses_camel_case_and_omits_absent_fields() {
		let event = track_event(stamp(), "pageLoaded", Properties::new());
		let json = serde_json::to_value(&event).unwrap();

		assert_eq!(json["type"], "track");
		assert_eq!(json["anonymousId"], "anon-1");
		assert_eq!(json["userId"], "user1");
		assert!(json.get("messageId").is_some());
		assert!(json.get("groupId").is_none());
		assert!(json.get("traits").is_none());
		assert_eq!(json["context"]["library"]["name"], "test-lib");
	}

	#[test]
	fn message_ids_are_unique() {
		let a = track_event(stamp(), "a", Properties::new());
		let b = track_event(stamp(), "a", Properties::new());
		assert_ne!(a.message_id, b.message_id);
	}

	#[test]
	fn event_type_routes() {
		assert_eq!(EventType::Identify.as_str(), "identify");
		assert_eq!(EventType::Group.to_string(), "group");
		assert_eq!(EventType::Page.as_str(), "page");
		assert_eq!(EventType::Track.as_str(), "track");
	}
}
