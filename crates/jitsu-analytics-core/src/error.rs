// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the core event types.

use thiserror::Error;

/// Errors produced while interpreting page state or context overrides.
#[derive(Debug, Error)]
pub enum CoreError {
	/// The page URL could not be parsed.
	#[error("invalid page URL '{url}': {source}")]
	InvalidUrl {
		url: String,
		#[source]
		source: url::ParseError,
	},

	/// A caller-supplied `context` override did not fit the context shape.
	#[error("invalid context override: {0}")]
	InvalidContextOverride(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
