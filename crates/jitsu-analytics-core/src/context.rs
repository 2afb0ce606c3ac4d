// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The `context` block attached to every event.
//!
//! [`build_context`] is a pure function of the page state, the current
//! identity and the captured campaign. It performs no I/O and never mutates
//! its inputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::campaign::CampaignContext;
use crate::error::Result;
use crate::identify::Identity;
use crate::page::{PageContext, PageInfo};
use crate::properties::{deep_merge, Properties};

/// Name and version of the library that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryInfo {
	pub name: String,
	pub version: String,
}

impl LibraryInfo {
	pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			version: version.into(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
	pub library: LibraryInfo,
	pub page: PageContext,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub campaign: Option<CampaignContext>,
	/// Full traits of the current identity, on every event type.
	#[serde(default)]
	pub traits: Properties,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, Value>,
}

impl ContextBlock {
	/// Deep-merges a caller-supplied `context` object over this block.
	///
	/// Fails when the override would change the type of a typed field (for
	/// example `page` given as a string). A captured campaign survives an
	/// override that sets `campaign` to null.
	pub fn with_overrides(self, overrides: Value) -> Result<Self> {
		let campaign = self.campaign.clone();
		let mut value = serde_json::to_value(self)?;
		deep_merge(&mut value, overrides);
		let mut merged: Self = serde_json::from_value(value)?;
		if merged.campaign.is_none() {
			merged.campaign = campaign;
		}
		Ok(merged)
	}
}

pub fn build_context(
	page: &PageInfo,
	identity: &Identity,
	campaign: Option<&CampaignContext>,
	library: &LibraryInfo,
) -> ContextBlock {
	ContextBlock {
		library: library.clone(),
		page: page.to_context(),
		campaign: campaign.cloned(),
		traits: identity.traits.clone(),
		extra: serde_json::Map::new(),
	}
}
