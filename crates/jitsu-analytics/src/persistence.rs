// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key/value persistence backends for the identity store.
//!
//! A backend plays the role of the browser's cookie jar: values survive a
//! "page load" (a new client bound to the same backend) until their TTL
//! runs out. Operations are synchronous so that identity state can be read
//! at construction time and mutated without yielding.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StorageError;

/// Storage backend with per-key expiry.
pub trait Persistence: Send + Sync {
	/// Returns the value for `key` if present and not expired.
	fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
	fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StorageError>;
	fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredValue {
	value: String,
	expires_at: DateTime<Utc>,
}

impl StoredValue {
	fn new(value: &str, ttl: Duration) -> Self {
		Self {
			value: value.to_string(),
			expires_at: expiry_from_now(ttl),
		}
	}

	fn is_live(&self, now: DateTime<Utc>) -> bool {
		self.expires_at > now
	}
}

fn expiry_from_now(ttl: Duration) -> DateTime<Utc> {
	TimeDelta::from_std(ttl)
		.ok()
		.and_then(|delta| Utc::now().checked_add_signed(delta))
		.unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn poisoned() -> StorageError {
	StorageError::Unavailable("storage lock poisoned".to_string())
}

/// Process-local backend. Values live as long as the backend does.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
	entries: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryPersistence {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Persistence for MemoryPersistence {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		let mut entries = self.entries.lock().map_err(|_| poisoned())?;
		match entries.get(key) {
			Some(stored) if stored.is_live(Utc::now()) => Ok(Some(stored.value.clone())),
			Some(_) => {
				entries.remove(key);
				Ok(None)
			}
			None => Ok(None),
		}
	}

	fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StorageError> {
		let mut entries = self.entries.lock().map_err(|_| poisoned())?;
		entries.insert(key.to_string(), StoredValue::new(value, ttl));
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		let mut entries = self.entries.lock().map_err(|_| poisoned())?;
		entries.remove(key);
		Ok(())
	}
}

/// JSON cookie-jar file. Every write replaces the file atomically
/// (temp file + rename); expired entries are dropped on the next write.
///
/// A jar that does not parse reads as empty and is overwritten by the next
/// write, the way a browser discards an unreadable cookie.
#[derive(Debug)]
pub struct FilePersistence {
	path: PathBuf,
	lock: Mutex<()>,
	corrupt_warned: AtomicBool,
}

impl FilePersistence {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			lock: Mutex::new(()),
			corrupt_warned: AtomicBool::new(false),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn read_jar(&self) -> Result<HashMap<String, StoredValue>, StorageError> {
		if !self.path.exists() {
			return Ok(HashMap::new());
		}
		let contents = std::fs::read_to_string(&self.path)?;
		if contents.trim().is_empty() {
			return Ok(HashMap::new());
		}
		match serde_json::from_str(&contents) {
			Ok(jar) => Ok(jar),
			Err(e) => {
				if self.corrupt_warned.swap(true, Ordering::Relaxed) {
					debug!(path = %self.path.display(), error = %e, "cookie jar unreadable");
				} else {
					warn!(
						path = %self.path.display(),
						error = %e,
						"cookie jar unreadable, treating it as empty"
					);
				}
				Ok(HashMap::new())
			}
		}
	}

	fn write_jar(&self, jar: &HashMap<String, StoredValue>) -> Result<(), StorageError> {
		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				std::fs::create_dir_all(parent)?;
			}
		}
		let tmp_path = self.path.with_extension("json.tmp");
		let json = serde_json::to_string_pretty(jar)?;
		std::fs::write(&tmp_path, json)?;
		std::fs::rename(&tmp_path, &self.path)?;
		debug!(path = %self.path.display(), entries = jar.len(), "wrote cookie jar");
		Ok(())
	}

	fn update<F>(&self, f: F) -> Result<(), StorageError>
	where
		F: FnOnce(&mut HashMap<String, StoredValue>),
	{
		let _guard = self.lock.lock().map_err(|_| poisoned())?;
		let mut jar = self.read_jar()?;
		let now = Utc::now();
		jar.retain(|_, stored| stored.is_live(now));
		f(&mut jar);
		self.write_jar(&jar)
	}
}

impl Persistence for FilePersistence {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		let _guard = self.lock.lock().map_err(|_| poisoned())?;
		let jar = self.read_jar()?;
		Ok(jar
			.get(key)
			.filter(|stored| stored.is_live(Utc::now()))
			.map(|stored| stored.value.clone()))
	}

	fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StorageError> {
		self.update(|jar| {
			jar.insert(key.to_string(), StoredValue::new(value, ttl));
		})
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.update(|jar| {
			jar.remove(key);
		})
	}
}
