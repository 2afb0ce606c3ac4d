// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The public collection client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use jitsu_analytics_core::{
	build_context, group_event, identify_event, page_event, track_event, AnonymousId,
	CampaignContext, Event, EventStamp, IdentifyTarget, Identity, LibraryInfo, PageInfo,
	PageTarget, Properties, CONTEXT_OVERRIDE_KEY,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::dispatch::{DispatchStatsSnapshot, Dispatcher, SharedDeliveryObserver};
use crate::error::{AnalyticsError, Result};
use crate::persistence::{FilePersistence, MemoryPersistence, Persistence};
use crate::store::IdentityStore;
use crate::transport::{HttpTransport, Transport};

/// Library name reported in `context.library`.
const SDK_NAME: &str = "jitsu-analytics-rust";
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builder for constructing a [`JitsuClient`].
pub struct JitsuClientBuilder {
	config: ClientConfig,
	persistence: Option<Arc<dyn Persistence>>,
	transport: Option<Arc<dyn Transport>>,
	observer: Option<SharedDeliveryObserver>,
	page: PageInfo,
}

impl JitsuClientBuilder {
	pub fn new() -> Self {
		Self {
			config: ClientConfig::default(),
			persistence: None,
			transport: None,
			observer: None,
			page: PageInfo::default(),
		}
	}

	/// Replaces the whole configuration, e.g. one from [`ClientConfig::load`].
	pub fn config(mut self, config: ClientConfig) -> Self {
		self.config = config;
		self
	}

	/// Sets the collection host, e.g. `https://collect.example.com`.
	pub fn host(mut self, host: impl Into<String>) -> Self {
		self.config.host = Some(host.into());
		self
	}

	pub fn write_key(mut self, key: impl Into<String>) -> Self {
		self.config.write_key = Some(key.into());
		self
	}

	/// Uses `persistence` as the identity backend instead of the one derived
	/// from the configuration.
	pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
		self.persistence = Some(persistence);
		self
	}

	/// Uses `transport` instead of the HTTP transport. No host is needed then.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn observer(mut self, observer: SharedDeliveryObserver) -> Self {
		self.observer = Some(observer);
		self
	}

	/// The page the client is loaded on. Its URL is checked for UTM
	/// parameters on the first call.
	pub fn page(mut self, page: PageInfo) -> Self {
		self.page = page;
		self
	}

	/// Builds the client and starts its dispatch task. Must be called inside
	/// a Tokio runtime.
	pub fn build(self) -> Result<JitsuClient> {
		let transport: Arc<dyn Transport> = match self.transport {
			Some(transport) => transport,
			None => {
				let host = self
					.config
					.host
					.as_deref()
					.ok_or_else(|| AnalyticsError::InvalidBaseUrl("no host configured".to_string()))?;
				Arc::new(HttpTransport::new(
					host,
					self.config.write_key.clone(),
					self.config.request_timeout,
				)?)
			}
		};

		let persistence: Arc<dyn Persistence> = match (self.persistence, &self.config.storage_path) {
			(Some(persistence), _) => persistence,
			(None, Some(path)) => Arc::new(FilePersistence::new(path)),
			(None, None) => Arc::new(MemoryPersistence::new()),
		};

		let store = IdentityStore::open(persistence, self.config.cookie_ttl);
		let dispatcher = Dispatcher::spawn(self.config.dispatch_config(), transport, self.observer)?;

		info!(host = ?self.config.host, page = %self.page.url, "Jitsu client initialized");

		Ok(JitsuClient {
			inner: Arc::new(ClientInner {
				store,
				dispatcher,
				page: RwLock::new(self.page),
				campaign_checked: AtomicBool::new(false),
				library: LibraryInfo::new(SDK_NAME, SDK_VERSION),
			}),
		})
	}
}

impl Default for JitsuClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct ClientInner {
	store: IdentityStore,
	dispatcher: Dispatcher,
	page: RwLock<PageInfo>,
	campaign_checked: AtomicBool,
	library: LibraryInfo,
}

/// Collection client bound to one page load.
///
/// `identify`, `group`, `page` and `track` update identity state
/// synchronously, queue the event for delivery and return the built event
/// without waiting for the network. They never fail: storage and delivery
/// problems are logged and absorbed.
///
/// # Example
///
/// ```ignore
/// use jitsu_analytics::{JitsuClient, PageInfo, Properties};
///
/// let client = JitsuClient::builder()
///     .host("https://collect.example.com")
///     .page(PageInfo::new("https://shop.example.com/?utm_source=newsletter"))
///     .build()?;
///
/// client.identify("user1", Properties::new().insert("email", "john.doe@gmail.com"));
/// client.page(None::<&str>, Properties::new());
/// client.track("pageLoaded", Properties::new().insert("trackParam", "trackValue"));
///
/// client.shutdown().await?;
/// ```
#[derive(Clone)]
pub struct JitsuClient {
	inner: Arc<ClientInner>,
}

impl JitsuClient {
	pub fn builder() -> JitsuClientBuilder {
		JitsuClientBuilder::new()
	}

	/// Identifies the user. `target` is either a user id or a traits object;
	/// a traits-only call leaves the known user id untouched.
	pub fn identify(
		&self,
		target: impl Into<IdentifyTarget>,
		traits: impl Into<Properties>,
	) -> Event {
		let resolved = target.into().resolve(traits.into());
		let (traits, overrides) = split_context_override(resolved.traits);

		self
			.inner
			.store
			.merge_identity(resolved.user_id.as_deref(), &traits);

		let event = identify_event(self.stamp(overrides), traits);
		self.dispatch(event)
	}

	/// Associates the current user with a group. The user identity is not
	/// changed.
	pub fn group(&self, group_id: impl Into<String>, traits: impl Into<Properties>) -> Event {
		let event = group_event(self.stamp(None), group_id, traits.into());
		self.dispatch(event)
	}

	/// Records a page view. `target` is a page name, a properties object, or
	/// `None`.
	pub fn page(&self, target: impl Into<PageTarget>, properties: impl Into<Properties>) -> Event {
		let (name, properties) = target.into().resolve(properties.into());
		let event = page_event(self.stamp(None), name, properties);
		self.dispatch(event)
	}

	pub fn track(&self, event: impl Into<String>, properties: impl Into<Properties>) -> Event {
		let event = track_event(self.stamp(None), event, properties.into());
		self.dispatch(event)
	}

	/// Forgets the identified user and campaign and rotates the anonymous id.
	pub fn reset(&self) -> AnonymousId {
		self.inner.store.reset()
	}

	/// Moves the host to another page. The previous URL becomes the referrer
	/// unless one is given. A captured campaign is kept even when the new URL
	/// has no UTM parameters.
	pub fn navigate(&self, url: impl Into<String>, title: Option<String>, referrer: Option<String>) {
		let mut page = self
			.inner
			.page
			.write()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		let previous = std::mem::take(&mut page.url);
		page.url = url.into();
		page.title = title;
		page.referrer = referrer.or(Some(previous).filter(|p| !p.is_empty()));
		debug!(url = %page.url, "navigated");
	}

	pub fn anonymous_id(&self) -> AnonymousId {
		self.inner.store.get_or_create_anonymous_id()
	}

	pub fn identity(&self) -> Identity {
		self.inner.store.get_identity()
	}

	pub fn campaign(&self) -> Option<CampaignContext> {
		self.inner.store.get_campaign_context()
	}

	pub fn current_page(&self) -> PageInfo {
		self
			.inner
			.page
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone()
	}

	/// True when identity storage failed and state lives in memory only.
	pub fn is_storage_degraded(&self) -> bool {
		self.inner.store.is_degraded()
	}

	pub fn stats(&self) -> DispatchStatsSnapshot {
		self.inner.dispatcher.stats()
	}

	/// Waits until every event built so far has been attempted.
	pub async fn flush(&self) -> Result<()> {
		self.inner.dispatcher.flush().await
	}

	/// Attempts delivery of everything queued, then stops the dispatcher.
	/// Later calls still update identity but their events are dropped.
	pub async fn shutdown(&self) -> Result<()> {
		self.inner.dispatcher.shutdown().await
	}

	/// Anonymous id, current identity and campaign plus the page context.
	/// Runs the one-shot campaign capture first.
	fn stamp(&self, overrides: Option<Value>) -> EventStamp {
		let page = self.current_page();
		self.capture_campaign_once(&page);

		let snapshot = self.inner.store.snapshot();
		let mut context = build_context(
			&page,
			&snapshot.identity,
			snapshot.campaign.as_ref(),
			&self.inner.library,
		);
		if let Some(overrides) = overrides {
			match context.clone().with_overrides(overrides) {
				Ok(merged) => context = merged,
				Err(e) => warn!(error = %e, "ignoring context override"),
			}
		}

		EventStamp {
			anonymous_id: snapshot.anonymous_id,
			user_id: snapshot.identity.user_id,
			context,
		}
	}

	fn capture_campaign_once(&self, page: &PageInfo) {
		if self.inner.campaign_checked.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Some(campaign) = CampaignContext::from_url(&page.url) {
			self.inner.store.set_campaign_context_once(campaign);
		}
	}

	fn dispatch(&self, event: Event) -> Event {
		match self.inner.dispatcher.send(event.clone()) {
			Ok(()) => debug!(
				event_type = %event.event_type,
				message_id = %event.message_id,
				"Queued event"
			),
			Err(AnalyticsError::ClientShutdown) => debug!(
				event_type = %event.event_type,
				"Client shut down, dropping event"
			),
			Err(e) => warn!(
				event_type = %event.event_type,
				error = %e,
				"Dropping event"
			),
		}
		event
	}
}

/// Takes an object-valued `context` key out of call traits so it neither
/// reaches the stored identity nor the event payload.
fn split_context_override(mut traits: Properties) -> (Properties, Option<Value>) {
	match traits.get(CONTEXT_OVERRIDE_KEY) {
		Some(Value::Object(_)) => {
			let overrides = traits.remove(CONTEXT_OVERRIDE_KEY);
			(traits, overrides)
		}
		_ => (traits, None),
	}
}
