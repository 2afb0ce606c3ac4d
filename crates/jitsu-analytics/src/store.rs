// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity store: anonymous id, identified user and campaign context.
//!
//! The store keeps an in-memory copy that is authoritative for the life of
//! the client and writes every mutation through to the [`Persistence`]
//! backend. Backend failures are logged and absorbed: the store then keeps
//! working from memory only, and nothing is raised to the caller.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use jitsu_analytics_core::{AnonymousId, CampaignContext, Identity, Properties};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::persistence::Persistence;

/// Persistence key of the anonymous id.
pub const ANONYMOUS_ID_KEY: &str = "__eventn_id";
/// Persistence key of the identified user id.
pub const USER_ID_KEY: &str = "__eventn_uid";
/// Persistence key of the identified user traits (a JSON object).
pub const USER_TRAITS_KEY: &str = "__eventn_id_usr";
/// Persistence key of the captured campaign context (a JSON object).
pub const CAMPAIGN_KEY: &str = "__eventn_campaign";

/// Default record lifetime: five years.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 5);

#[derive(Debug, Default)]
struct StoreState {
	anonymous_id: Option<AnonymousId>,
	identity: Identity,
	campaign: Option<CampaignContext>,
	degraded: bool,
}

/// A consistent view of the store taken under a single lock.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentitySnapshot {
	pub anonymous_id: AnonymousId,
	pub identity: Identity,
	pub campaign: Option<CampaignContext>,
}

pub struct IdentityStore {
	backend: Arc<dyn Persistence>,
	ttl: Duration,
	state: Mutex<StoreState>,
}

impl std::fmt::Debug for IdentityStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("IdentityStore")
			.field("ttl", &self.ttl)
			.finish_non_exhaustive()
	}
}

impl IdentityStore {
	/// Opens the store, reading every persisted record synchronously.
	pub fn open(backend: Arc<dyn Persistence>, ttl: Duration) -> Self {
		let store = Self {
			backend,
			ttl,
			state: Mutex::new(StoreState::default()),
		};

		let mut state = StoreState::default();
		let anonymous_id = store
			.read(&mut state, ANONYMOUS_ID_KEY)
			.filter(|id| !id.is_empty())
			.map(AnonymousId::from);
		let user_id = store
			.read(&mut state, USER_ID_KEY)
			.filter(|id| !id.is_empty());
		let traits = store
			.read_json::<Properties>(&mut state, USER_TRAITS_KEY)
			.unwrap_or_default();
		let campaign = store.read_json(&mut state, CAMPAIGN_KEY);

		state.anonymous_id = anonymous_id;
		state.identity = Identity { user_id, traits };
		state.campaign = campaign;

		debug!(
			has_anonymous_id = state.anonymous_id.is_some(),
			identified = state.identity.user_id.is_some(),
			has_campaign = state.campaign.is_some(),
			degraded = state.degraded,
			"opened identity store"
		);

		*store.lock() = state;
		store
	}

	/// Returns the persisted anonymous id, creating and persisting one if
	/// none exists. The whole check-and-create runs under one lock, so a
	/// burst of calls yields a single id.
	pub fn get_or_create_anonymous_id(&self) -> AnonymousId {
		let mut state = self.lock();
		self.ensure_anonymous_id(&mut state)
	}

	/// Current identity, `{ userId: None, traits: {} }` when never identified.
	pub fn get_identity(&self) -> Identity {
		self.lock().identity.clone()
	}

	/// Shallow-merges `traits` into the stored traits and replaces the user
	/// id only when one is given. Returns the merged identity.
	pub fn merge_identity(&self, user_id: Option<&str>, traits: &Properties) -> Identity {
		let mut state = self.lock();
		state.identity.merge(user_id, traits);

		if let Some(id) = state.identity.user_id.clone() {
			self.write(&mut state, USER_ID_KEY, &id);
		}
		match serde_json::to_string(&state.identity.traits) {
			Ok(json) => self.write(&mut state, USER_TRAITS_KEY, &json),
			Err(e) => warn!(error = %e, "failed to serialize user traits"),
		}

		state.identity.clone()
	}

	pub fn get_campaign_context(&self) -> Option<CampaignContext> {
		self.lock().campaign.clone()
	}

	/// Stores `ctx` only if no campaign has been captured for the current
	/// record lifetime. Returns whether it was stored.
	pub fn set_campaign_context_once(&self, ctx: CampaignContext) -> bool {
		let mut state = self.lock();
		if state.campaign.is_none() {
			// another client on the same backend may have captured it since we opened
			state.campaign = self.read_json(&mut state, CAMPAIGN_KEY);
		}
		if state.campaign.is_some() {
			debug!("campaign context already captured, keeping it");
			return false;
		}

		match serde_json::to_string(&ctx) {
			Ok(json) => self.write(&mut state, CAMPAIGN_KEY, &json),
			Err(e) => warn!(error = %e, "failed to serialize campaign context"),
		}
		debug!(source = ?ctx.source, campaign = ?ctx.campaign, "captured campaign context");
		state.campaign = Some(ctx);
		true
	}

	/// Anonymous id (created if needed), identity and campaign read together.
	pub fn snapshot(&self) -> IdentitySnapshot {
		let mut state = self.lock();
		let anonymous_id = self.ensure_anonymous_id(&mut state);
		IdentitySnapshot {
			anonymous_id,
			identity: state.identity.clone(),
			campaign: state.campaign.clone(),
		}
	}

	/// Forgets the user, their traits and the campaign, and starts over with
	/// a fresh anonymous id.
	pub fn reset(&self) -> AnonymousId {
		let mut state = self.lock();
		state.identity = Identity::default();
		state.campaign = None;
		state.anonymous_id = None;

		for key in [USER_ID_KEY, USER_TRAITS_KEY, CAMPAIGN_KEY, ANONYMOUS_ID_KEY] {
			if let Err(e) = self.backend.remove(key) {
				record_failure(&mut state, key, "remove", &e);
			}
		}

		let id = AnonymousId::generate();
		self.write(&mut state, ANONYMOUS_ID_KEY, id.as_str());
		state.anonymous_id = Some(id.clone());
		debug!(anonymous_id = %id, "identity reset");
		id
	}

	/// True once any backend operation has failed; state since then may
	/// exist in memory only.
	pub fn is_degraded(&self) -> bool {
		self.lock().degraded
	}

	fn ensure_anonymous_id(&self, state: &mut StoreState) -> AnonymousId {
		if let Some(id) = &state.anonymous_id {
			return id.clone();
		}

		let id = match self
			.read(state, ANONYMOUS_ID_KEY)
			.filter(|id| !id.is_empty())
		{
			Some(existing) => AnonymousId::from(existing),
			None => {
				let id = AnonymousId::generate();
				self.write(state, ANONYMOUS_ID_KEY, id.as_str());
				debug!(anonymous_id = %id, "created anonymous id");
				id
			}
		};
		state.anonymous_id = Some(id.clone());
		id
	}

	fn lock(&self) -> MutexGuard<'_, StoreState> {
		// state is always left consistent, so a poisoned lock is still usable
		self.state
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	fn read(&self, state: &mut StoreState, key: &str) -> Option<String> {
		match self.backend.get(key) {
			Ok(value) => value,
			Err(e) => {
				record_failure(state, key, "read", &e);
				None
			}
		}
	}

	fn read_json<T: serde::de::DeserializeOwned>(
		&self,
		state: &mut StoreState,
		key: &str,
	) -> Option<T> {
		let raw = self.read(state, key)?;
		match serde_json::from_str(&raw) {
			Ok(value) => Some(value),
			Err(e) => {
				warn!(key, error = %e, "ignoring malformed identity record");
				None
			}
		}
	}

	fn write(&self, state: &mut StoreState, key: &str, value: &str) {
		if let Err(e) = self.backend.set(key, value, self.ttl) {
			record_failure(state, key, "write", &e);
		}
	}
}

/// Marks the store degraded. Only the first failure is a warning.
fn record_failure(state: &mut StoreState, key: &str, operation: &str, error: &StorageError) {
	if state.degraded {
		debug!(key, operation, error = %error, "storage operation failed");
	} else {
		warn!(key, operation, error = %error, "storage operation failed, continuing in memory");
	}
	state.degraded = true;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::persistence::{FilePersistence, MemoryPersistence};
	use serde_json::json;
	use std::thread;

	struct BlockedPersistence;

	impl Persistence for BlockedPersistence {
		fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
			Err(StorageError::Unavailable("cookies blocked".to_string()))
		}

		fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StorageError> {
			Err(StorageError::Unavailable("cookies blocked".to_string()))
		}

		fn remove(&self, _key: &str) -> Result<(), StorageError> {
			Err(StorageError::Unavailable("cookies blocked".to_string()))
		}
	}

	fn memory_store() -> (Arc<MemoryPersistence>, IdentityStore) {
		let backend = Arc::new(MemoryPersistence::new());
		let store = IdentityStore::open(backend.clone(), DEFAULT_TTL);
		(backend, store)
	}

	#[test]
	fn anonymous_id_is_created_once_and_persisted() {
		let (backend, store) = memory_store();

		let first = store.get_or_create_anonymous_id();
		let second = store.get_or_create_anonymous_id();

		assert_eq!(first, second);
		assert_eq!(
			backend.get(ANONYMOUS_ID_KEY).unwrap().as_deref(),
			Some(first.as_str())
		);
	}

	#[test]
	fn anonymous_id_survives_reopen() {
		let (backend, store) = memory_store();
		let id = store.get_or_create_anonymous_id();
		drop(store);

		let reopened = IdentityStore::open(backend, DEFAULT_TTL);
		assert_eq!(reopened.get_or_create_anonymous_id(), id);
	}

	#[test]
	fn concurrent_calls_produce_one_id() {
		let (_backend, store) = memory_store();
		let store = Arc::new(store);

		let handles: Vec<_> = (0..16)
			.map(|_| {
				let store = Arc::clone(&store);
				thread::spawn(move || store.get_or_create_anonymous_id())
			})
			.collect();
		let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

		assert!(ids.windows(2).all(|w| w[0] == w[1]));
	}

	#[test]
	fn identity_defaults_to_empty() {
		let (_backend, store) = memory_store();
		assert_eq!(store.get_identity(), Identity::default());
	}

	#[test]
	fn merge_identity_persists_user_id_and_traits() {
		let (backend, store) = memory_store();

		store.merge_identity(
			Some("user1"),
			&Properties::new().insert("email", "john.doe@gmail.com"),
		);

		assert_eq!(backend.get(USER_ID_KEY).unwrap().as_deref(), Some("user1"));
		let traits: serde_json::Value =
			serde_json::from_str(&backend.get(USER_TRAITS_KEY).unwrap().unwrap()).unwrap();
		assert_eq!(traits["email"], "john.doe@gmail.com");
	}

	#[test]
	fn traits_only_merge_keeps_user_id() {
		let (_backend, store) = memory_store();
		store.merge_identity(Some("user1"), &Properties::new().insert("a", 1));

		let merged = store.merge_identity(None, &Properties::new().insert("b", 2));

		assert_eq!(merged.user_id.as_deref(), Some("user1"));
		assert_eq!(merged.traits.get("a"), Some(&json!(1)));
		assert_eq!(merged.traits.get("b"), Some(&json!(2)));
	}

	#[test]
	fn repeated_merge_is_idempotent() {
		let (backend, store) = memory_store();
		let traits = Properties::new().insert("email", "a@b.com");

		let once = store.merge_identity(Some("user1"), &traits);
		let raw_once = backend.get(USER_TRAITS_KEY).unwrap();
		let twice = store.merge_identity(Some("user1"), &traits);

		assert_eq!(once, twice);
		assert_eq!(backend.get(USER_TRAITS_KEY).unwrap(), raw_once);
	}

	#[test]
	fn campaign_is_set_only_once() {
		let (_backend, store) = memory_store();
		let first = CampaignContext::from_url("https://a.test/?utm_source=first").unwrap();
		let second = CampaignContext::from_url("https://a.test/?utm_source=second").unwrap();

		assert!(store.set_campaign_context_once(first.clone()));
		assert!(!store.set_campaign_context_once(second));
		assert_eq!(store.get_campaign_context(), Some(first));
	}

	#[test]
	fn campaign_captured_by_other_instance_is_respected() {
		let backend = Arc::new(MemoryPersistence::new());
		let a = IdentityStore::open(backend.clone(), DEFAULT_TTL);
		let b = IdentityStore::open(backend.clone(), DEFAULT_TTL);

		let first = CampaignContext::from_url("https://a.test/?utm_source=a").unwrap();
		assert!(a.set_campaign_context_once(first.clone()));

		let second = CampaignContext::from_url("https://a.test/?utm_source=b").unwrap();
		assert!(!b.set_campaign_context_once(second));
		assert_eq!(b.get_campaign_context(), Some(first));
	}

	#[test]
	fn reset_clears_identity_and_rotates_anonymous_id() {
		let (backend, store) = memory_store();
		let before = store.get_or_create_anonymous_id();
		store.merge_identity(Some("user1"), &Properties::new().insert("a", 1));
		store.set_campaign_context_once(
			CampaignContext::from_url("https://a.test/?utm_source=s").unwrap(),
		);

		let after = store.reset();

		assert_ne!(before, after);
		assert_eq!(store.get_identity(), Identity::default());
		assert_eq!(store.get_campaign_context(), None);
		assert_eq!(backend.get(USER_ID_KEY).unwrap(), None);
		assert_eq!(
			backend.get(ANONYMOUS_ID_KEY).unwrap().as_deref(),
			Some(after.as_str())
		);
	}

	#[test]
	fn blocked_storage_degrades_to_memory() {
		let store = IdentityStore::open(Arc::new(BlockedPersistence), DEFAULT_TTL);

		let id = store.get_or_create_anonymous_id();
		let merged = store.merge_identity(Some("user1"), &Properties::new().insert("a", 1));

		assert!(store.is_degraded());
		assert_eq!(store.get_or_create_anonymous_id(), id);
		assert_eq!(merged.user_id.as_deref(), Some("user1"));
		assert_eq!(store.get_identity().user_id.as_deref(), Some("user1"));
		assert!(store.set_campaign_context_once(CampaignContext::default()));
	}

	#[derive(Clone, Default)]
	struct LogBuffer(Arc<Mutex<Vec<u8>>>);

	impl std::io::Write for LogBuffer {
		fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
			self.0.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> std::io::Result<()> {
			Ok(())
		}
	}

	#[test]
	fn blocked_storage_warns_once_including_reset() {
		let logs = LogBuffer::default();
		let writer = logs.clone();
		let subscriber = tracing_subscriber::fmt()
			.with_max_level(tracing::Level::DEBUG)
			.with_ansi(false)
			.without_time()
			.with_writer(move || writer.clone())
			.finish();

		tracing::subscriber::with_default(subscriber, || {
			let store = IdentityStore::open(Arc::new(BlockedPersistence), DEFAULT_TTL);
			store.merge_identity(Some("user1"), &Properties::new());
			store.reset();
		});

		let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
		let warnings = output.lines().filter(|l| l.contains("WARN")).count();
		assert_eq!(warnings, 1, "{output}");
		assert!(output.contains("operation=\"remove\""));
	}

	#[test]
	fn malformed_traits_record_is_ignored() {
		let backend = Arc::new(MemoryPersistence::new());
		backend
			.set(USER_TRAITS_KEY, "{not json", DEFAULT_TTL)
			.unwrap();
		backend.set(USER_ID_KEY, "user1", DEFAULT_TTL).unwrap();

		let store = IdentityStore::open(backend, DEFAULT_TTL);
		let identity = store.get_identity();

		assert_eq!(identity.user_id.as_deref(), Some("user1"));
		assert!(identity.traits.is_empty());
		assert!(!store.is_degraded());
	}

	#[test]
	fn corrupt_jar_is_repaired_and_id_survives_reload() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("cookies.json");
		std::fs::write(&path, "{not json").unwrap();

		let first = IdentityStore::open(Arc::new(FilePersistence::new(&path)), DEFAULT_TTL);
		let id = first.get_or_create_anonymous_id();
		assert!(!first.is_degraded());
		drop(first);

		let second = IdentityStore::open(Arc::new(FilePersistence::new(&path)), DEFAULT_TTL);
		assert_eq!(second.get_or_create_anonymous_id(), id);
		assert!(!second.is_degraded());
	}

	#[test]
	fn snapshot_creates_anonymous_id() {
		let (_backend, store) = memory_store();
		let snapshot = store.snapshot();
		assert_eq!(snapshot.anonymous_id, store.get_or_create_anonymous_id());
		assert_eq!(snapshot.campaign, None);
	}

	mod proptests {
		use super::*;
		use proptest::prelude::*;

		fn traits_strategy() -> impl Strategy<Value = Properties> {
			prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..6)
				.prop_map(|m| m.into_iter().map(|(k, v)| (k, json!(v))).collect())
		}

		proptest! {
			#[test]
			fn anonymous_id_is_stable_across_merges(
				calls in prop::collection::vec(
					(prop::option::of("[a-z0-9]{1,10}"), traits_strategy()),
					0..12,
				)
			) {
				let (_backend, store) = memory_store();
				let id = store.get_or_create_anonymous_id();

				for (user_id, traits) in &calls {
					store.merge_identity(user_id.as_deref(), traits);
					prop_assert_eq!(store.snapshot().anonymous_id, id.clone());
				}

				let last_user = calls.iter().rev().find_map(|(u, _)| u.clone());
				prop_assert_eq!(store.get_identity().user_id, last_user);
			}
		}
	}
}
