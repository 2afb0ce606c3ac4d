// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rust collection client for Jitsu.
//!
//! The client keeps a persistent anonymous id, stitches it to a user id and
//! traits once the user is identified, captures UTM campaign attribution from
//! the landing URL, and sends `identify`, `group`, `page` and `track` events to
//! the collection endpoint in the order they were made.
//!
//! # Quick Start
//!
//! ```ignore
//! use jitsu_analytics::{JitsuClient, PageInfo, Properties};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JitsuClient::builder()
//!         .host("https://collect.example.com")
//!         .write_key("js.abc123")
//!         .page(PageInfo::new(
//!             "https://shop.example.com/?utm_source=newsletter&utm_campaign=spring",
//!         ))
//!         .build()?;
//!
//!     // Attach a user id and traits to every later event
//!     client.identify("user1", Properties::new().insert("email", "john.doe@gmail.com"));
//!
//!     client.page(None::<&str>, Properties::new());
//!     client.track("pageLoaded", Properties::new().insert("trackParam", "trackValue"));
//!
//!     // Attempts delivery of everything queued
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Identity
//!
//! Identity lives in a [`Persistence`] backend under cookie-style keys:
//!
//! | Key | Content |
//! |-----|---------|
//! | `__eventn_id` | anonymous id |
//! | `__eventn_uid` | user id |
//! | `__eventn_id_usr` | user traits as JSON |
//! | `__eventn_campaign` | captured campaign as JSON |
//!
//! [`FilePersistence`] keeps them across process restarts; [`MemoryPersistence`]
//! keeps them for the life of the process. A failing backend never fails a
//! call: the client logs a warning and continues with in-memory state.
//!
//! # Delivery
//!
//! Calls return immediately with the built [`Event`]. A single background task
//! sends queued events one at a time, so the collector receives them in call
//! order. A failed or timed-out send is logged and skipped; there is no retry.
//! Use [`JitsuClient::flush`] to wait for the queue and a [`DeliveryObserver`]
//! to see per-event outcomes.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod persistence;
pub mod store;
pub mod transport;

pub use client::{JitsuClient, JitsuClientBuilder};
pub use config::{ClientConfig, ConfigLayer};
pub use dispatch::{
	DeliveryObserver, DeliveryOutcome, DispatchConfig, DispatchStatsSnapshot, SharedDeliveryObserver,
};
pub use error::{AnalyticsError, ConfigError, Result, StorageError};
pub use persistence::{FilePersistence, MemoryPersistence, Persistence};
pub use store::{IdentitySnapshot, IdentityStore};
pub use transport::{HttpTransport, Transport};

// Re-export types from jitsu-analytics-core that callers need
pub use jitsu_analytics_core::{
	AnonymousId, CampaignContext, ContextBlock, Event, EventType, IdentifyTarget, Identity,
	PageContext, PageInfo, PageTarget, Properties,
};
