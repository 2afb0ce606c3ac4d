// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the collection client.
//!
//! None of these reach the host through `identify`/`group`/`page`/`track`:
//! those calls log and carry on. They surface from client construction,
//! configuration loading, and delivery reports.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Collection client errors.
#[derive(Debug, Error)]
pub enum AnalyticsError {
	/// Collection host is missing or not a valid URL.
	#[error("invalid collection host: {0}")]
	InvalidBaseUrl(String),

	/// The client was built outside a Tokio runtime.
	#[error("a Tokio runtime is required to start the dispatcher")]
	NoRuntime,

	/// HTTP request failed.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// Collection endpoint answered with a non-success status.
	#[error("server error ({status}): {message}")]
	ServerError { status: u16, message: String },

	/// Delivery did not finish within the send timeout.
	#[error("delivery timed out after {0:?}")]
	Timeout(Duration),

	/// Dispatch queue is full; the event was dropped.
	#[error("dispatch queue is full")]
	QueueFull,

	/// Client has been shut down.
	#[error("client has been shut down")]
	ClientShutdown,

	/// Serialization error.
	#[error("serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),

	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Persistence backend errors. The identity store absorbs these and keeps
/// running in memory.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("storage I/O failed: {0}")]
	Io(#[from] std::io::Error),

	#[error("storage contents are corrupt: {0}")]
	Corrupt(#[from] serde_json::Error),

	#[error("storage unavailable: {0}")]
	Unavailable(String),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn server_error_message_includes_status() {
		let err = AnalyticsError::ServerError {
			status: 503,
			message: "unavailable".to_string(),
		};
		assert_eq!(err.to_string(), "server error (503): unavailable");
	}

	#[test]
	fn config_error_is_transparent() {
		let err = AnalyticsError::from(ConfigError::InvalidValue {
			key: "JITSU_QUEUE_CAPACITY".to_string(),
			message: "must be positive".to_string(),
		});
		assert_eq!(
			err.to_string(),
			"invalid value for JITSU_QUEUE_CAPACITY: must be positive"
		);
	}

	#[test]
	fn storage_error_from_io() {
		let err = StorageError::from(std::io::Error::new(
			std::io::ErrorKind::PermissionDenied,
			"cookies blocked",
		));
		assert!(err.to_string().contains("cookies blocked"));
	}
}
