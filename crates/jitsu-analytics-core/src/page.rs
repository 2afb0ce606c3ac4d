// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host page state and the `page` call shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{CoreError, Result};
use crate::properties::Properties;

/// What the host page currently shows. Read every time an event is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
	pub url: String,
	pub title: Option<String>,
	pub referrer: Option<String>,
}

impl PageInfo {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			title: None,
			referrer: None,
		}
	}

	pub fn with_title(mut self, title: impl Into<String>) -> Self {
		self.title = Some(title.into());
		self
	}

	pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
		self.referrer = Some(referrer.into());
		self
	}

	pub fn parsed_url(&self) -> Result<Url> {
		Url::parse(&self.url).map_err(|source| CoreError::InvalidUrl {
			url: self.url.clone(),
			source,
		})
	}

	/// The `context.page` block. URL components are left out when the URL
	/// does not parse.
	pub fn to_context(&self) -> PageContext {
		let parsed = self.parsed_url().ok();
		PageContext {
			url: Some(self.url.clone()).filter(|u| !u.is_empty()),
			path: parsed.as_ref().map(|u| u.path().to_string()),
			search: parsed
				.as_ref()
				.and_then(|u| u.query())
				.map(|q| format!("?{q}")),
			host: parsed
				.as_ref()
				.and_then(|u| u.host_str().map(|h| h.to_string())),
			title: self.title.clone(),
			referrer: self.referrer.clone(),
			extra: serde_json::Map::new(),
		}
	}
}

/// `context.page` as sent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub search: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub referrer: Option<String>,
	/// Fields supplied through a context override that have no typed slot.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, Value>,
}

/// First argument of `page`: a page name, a properties object, or nothing.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PageTarget {
	Named(String),
	Properties(Properties),
	#[default]
	Unnamed,
}

impl PageTarget {
	/// Resolves to `(name, properties)`. Properties given in the first
	/// position are merged under the explicit `properties` argument.
	pub fn resolve(self, properties: Properties) -> (Option<String>, Properties) {
		match self {
			PageTarget::Named(name) => (Some(name), properties),
			PageTarget::Properties(inline) => (None, inline.merge(&properties)),
			PageTarget::Unnamed => (None, properties),
		}
	}
}

impl From<&str> for PageTarget {
	fn from(s: &str) -> Self {
		PageTarget::Named(s.to_string())
	}
}

impl From<String> for PageTarget {
	fn from(s: String) -> Self {
		PageTarget::Named(s)
	}
}

impl From<Option<&str>> for PageTarget {
	fn from(s: Option<&str>) -> Self {
		s.map(PageTarget::from).unwrap_or_default()
	}
}

impl From<Properties> for PageTarget {
	fn from(p: Properties) -> Self {
		PageTarget::Properties(p)
	}
}

impl From<Value> for PageTarget {
	fn from(value: Value) -> Self {
		match value {
			Value::String(s) => PageTarget::Named(s),
			Value::Object(map) => PageTarget::Properties(Properties::from(map)),
			_ => PageTarget::Unnamed,
		}
	}
}
