// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration: defaults, an optional TOML file, then environment
//! variables, each layer overriding the one before.
//!
//! Environment convention: `JITSU_<FIELD>`.
//!
//! ```toml
//! host = "https://collect.example.com"
//! write_key = "js.abc123"
//! request_timeout_ms = 5000
//! queue_capacity = 1000
//! max_in_flight = 16
//! shutdown_timeout_ms = 5000
//! cookie_ttl_days = 1825
//! storage_path = "/var/lib/app/jitsu-cookies.json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, trace};

use crate::dispatch::DispatchConfig;
use crate::error::ConfigError;
use crate::store::DEFAULT_TTL;

/// Resolved client configuration.
#[derive(Clone, PartialEq)]
pub struct ClientConfig {
	/// Base URL of the collection endpoint.
	pub host: Option<String>,
	pub write_key: Option<String>,
	/// Upper bound on a single delivery attempt.
	pub request_timeout: Duration,
	pub queue_capacity: usize,
	/// Sends allowed to await a response at once. `1` makes delivery strictly
	/// sequential.
	pub max_in_flight: usize,
	/// Deadline for draining pending events on shutdown.
	pub shutdown_timeout: Duration,
	/// Lifetime of persisted identity records.
	pub cookie_ttl: Duration,
	/// Cookie-jar file; identity lives in memory only when unset.
	pub storage_path: Option<PathBuf>,
}

impl std::fmt::Debug for ClientConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClientConfig")
			.field("host", &self.host)
			.field("write_key", &self.write_key.as_ref().map(|_| "[REDACTED]"))
			.field("request_timeout", &self.request_timeout)
			.field("queue_capacity", &self.queue_capacity)
			.field("max_in_flight", &self.max_in_flight)
			.field("shutdown_timeout", &self.shutdown_timeout)
			.field("cookie_ttl", &self.cookie_ttl)
			.field("storage_path", &self.storage_path)
			.finish()
	}
}

impl Default for ClientConfig {
	fn default() -> Self {
		let dispatch = DispatchConfig::default();
		Self {
			host: None,
			write_key: None,
			request_timeout: dispatch.send_timeout,
			queue_capacity: dispatch.queue_capacity,
			max_in_flight: dispatch.max_in_flight,
			shutdown_timeout: dispatch.shutdown_timeout,
			cookie_ttl: DEFAULT_TTL,
			storage_path: None,
		}
	}
}

impl ClientConfig {
	/// Loads defaults, then `path` (skipped when missing), then the
	/// environment.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut config = Self::default();
		if let Some(path) = path {
			config.apply(ConfigLayer::from_file(path)?)?;
		}
		config.apply(ConfigLayer::from_env()?)?;
		debug!(config = ?config, "loaded client configuration");
		Ok(config)
	}

	/// Defaults overridden by the environment only.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::load(None)
	}

	pub fn dispatch_config(&self) -> DispatchConfig {
		DispatchConfig {
			queue_capacity: self.queue_capacity,
			send_timeout: self.request_timeout,
			max_in_flight: self.max_in_flight,
			shutdown_timeout: self.shutdown_timeout,
		}
	}

	/// Applies every field present in `layer`.
	pub fn apply(&mut self, layer: ConfigLayer) -> Result<(), ConfigError> {
		if let Some(host) = layer.host {
			self.host = Some(host);
		}
		if let Some(key) = layer.write_key {
			self.write_key = Some(key);
		}
		if let Some(ms) = layer.request_timeout_ms {
			if ms == 0 {
				return Err(invalid("request_timeout_ms", "must be greater than zero"));
			}
			self.request_timeout = Duration::from_millis(ms);
		}
		if let Some(capacity) = layer.queue_capacity {
			if capacity == 0 {
				return Err(invalid("queue_capacity", "must be greater than zero"));
			}
			self.queue_capacity = capacity;
		}
		if let Some(max) = layer.max_in_flight {
			if max == 0 {
				return Err(invalid("max_in_flight", "must be greater than zero"));
			}
			self.max_in_flight = max;
		}
		if let Some(ms) = layer.shutdown_timeout_ms {
			self.shutdown_timeout = Duration::from_millis(ms);
		}
		if let Some(days) = layer.cookie_ttl_days {
			if days == 0 {
				return Err(invalid("cookie_ttl_days", "must be greater than zero"));
			}
			self.cookie_ttl = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
		}
		if let Some(path) = layer.storage_path {
			self.storage_path = Some(path);
		}
		Ok(())
	}
}

/// One source's worth of optional settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
	pub host: Option<String>,
	pub write_key: Option<String>,
	pub request_timeout_ms: Option<u64>,
	pub queue_capacity: Option<usize>,
	pub max_in_flight: Option<usize>,
	pub shutdown_timeout_ms: Option<u64>,
	pub cookie_ttl_days: Option<u64>,
	pub storage_path: Option<PathBuf>,
}

impl ConfigLayer {
	pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
		toml::from_str(content).map_err(|e| ConfigError::TomlParse {
			path: path.to_path_buf(),
			source: e,
		})
	}

	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		if !path.exists() {
			debug!(path = %path.display(), "config file not found, skipping");
			return Ok(Self::default());
		}

		debug!(path = %path.display(), "loading config file");
		let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
			path: path.to_path_buf(),
			source: e,
		})?;
		let layer = Self::from_toml_str(&content, path)?;
		trace!("parsed config layer from TOML");
		Ok(layer)
	}

	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Builds a layer from an arbitrary variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| lookup(name).filter(|s| !s.is_empty());
		Ok(Self {
			host: var("JITSU_HOST"),
			write_key: var("JITSU_WRITE_KEY"),
			request_timeout_ms: parse_var(&var, "JITSU_REQUEST_TIMEOUT_MS")?,
			queue_capacity: parse_var(&var, "JITSU_QUEUE_CAPACITY")?,
			max_in_flight: parse_var(&var, "JITSU_MAX_IN_FLIGHT")?,
			shutdown_timeout_ms: parse_var(&var, "JITSU_SHUTDOWN_TIMEOUT_MS")?,
			cookie_ttl_days: parse_var(&var, "JITSU_COOKIE_TTL_DAYS")?,
			storage_path: var("JITSU_STORAGE_PATH").map(PathBuf::from),
		})
	}
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>, ConfigError>
where
	T: std::str::FromStr,
	F: Fn(&str) -> Option<String>,
{
	match var(name) {
		Some(v) => v.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid number '{v}'"),
		}),
		None => Ok(None),
	}
}

fn invalid(key: &str, message: &str) -> ConfigError {
	ConfigError::InvalidValue {
		key: key.to_string(),
		message: message.to_string(),
	}
}
