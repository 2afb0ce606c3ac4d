// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Acquisition context parsed from UTM query parameters.

use serde::{Deserialize, Serialize};
use url::Url;

/// Campaign attribution captured from `utm_*` query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignContext {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub medium: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub campaign: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub term: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
}

impl CampaignContext {
	/// Parses campaign parameters from a full page URL.
	///
	/// Returns `None` when the URL does not parse or carries no non-empty
	/// `utm_*` parameter.
	pub fn from_url(url: &str) -> Option<Self> {
		let url = Url::parse(url).ok()?;
		Self::from_query_pairs(url.query_pairs())
	}

	/// Parses campaign parameters from decoded query pairs.
	pub fn from_query_pairs<I, K, V>(pairs: I) -> Option<Self>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: AsRef<str>,
	{
		let mut ctx = CampaignContext::default();
		for (key, value) in pairs {
			let value = value.as_ref().trim();
			if value.is_empty() {
				continue;
			}
			let slot = match key.as_ref() {
				"utm_source" => &mut ctx.source,
				"utm_medium" => &mut ctx.medium,
				"utm_campaign" => &mut ctx.campaign,
				"utm_term" => &mut ctx.term,
				"utm_content" => &mut ctx.content,
				_ => continue,
			};
			// first occurrence wins
			if slot.is_none() {
				*slot = Some(value.to_string());
			}
		}

		if ctx.is_empty() {
			None
		} else {
			Some(ctx)
		}
	}

	pub fn is_empty(&self) -> bool {
		self.source.is_none()
			&& self.medium.is_none()
			&& self.campaign.is_none()
			&& self.term.is_none()
			&& self.content.is_none()
	}
}
