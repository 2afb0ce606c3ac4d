// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery of a single event to the collection endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jitsu_analytics_core::Event;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::{AnalyticsError, Result};

/// Header carrying the write key, when one is configured.
pub const WRITE_KEY_HEADER: &str = "X-Write-Key";

/// Sends one event. The dispatcher calls this strictly in build order.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, event: &Event) -> Result<()>;
}

/// Body posted to the collection endpoint: the envelope plus `sentAt`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingEvent<'a> {
	#[serde(flatten)]
	event: &'a Event,
	sent_at: DateTime<Utc>,
}

/// Posts events as JSON to `{host}/api/s/{type}`.
#[derive(Clone)]
pub struct HttpTransport {
	http: Client,
	base_url: String,
	write_key: Option<String>,
}

impl std::fmt::Debug for HttpTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HttpTransport")
			.field("base_url", &self.base_url)
			.field("write_key", &self.write_key.as_ref().map(|_| "[REDACTED]"))
			.finish()
	}
}

impl HttpTransport {
	/// Creates a transport for `host`, validating it as an absolute URL.
	pub fn new(host: &str, write_key: Option<String>, timeout: Duration) -> Result<Self> {
		let parsed = Url::parse(host).map_err(|e| AnalyticsError::InvalidBaseUrl(format!("{host}: {e}")))?;
		if !matches!(parsed.scheme(), "http" | "https") {
			return Err(AnalyticsError::InvalidBaseUrl(format!(
				"{host}: unsupported scheme '{}'",
				parsed.scheme()
			)));
		}

		let http = jitsu_common_http::new_client_with_timeout(timeout)?;

		Ok(Self {
			http,
			base_url: host.trim_end_matches('/').to_string(),
			write_key,
		})
	}

	pub fn endpoint(&self, event: &Event) -> String {
		format!("{}/api/s/{}", self.base_url, event.event_type)
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn send(&self, event: &Event) -> Result<()> {
		let url = self.endpoint(event);
		let body = OutgoingEvent {
			event,
			sent_at: Utc::now(),
		};

		let mut request = self.http.post(&url).json(&body);
		if let Some(key) = &self.write_key {
			request = request.header(WRITE_KEY_HEADER, key);
		}

		let response = request.send().await?;
		let status = response.status();
		if status.is_success() {
			debug!(url = %url, message_id = %event.message_id, "event accepted");
			return Ok(());
		}

		let message = response.text().await.unwrap_or_default();
		Err(AnalyticsError::ServerError {
			status: status.as_u16(),
			message,
		})
	}
}
