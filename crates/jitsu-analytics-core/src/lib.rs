// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Jitsu collection client.
//!
//! This crate is free of I/O. It defines:
//!
//! - [`Identity`] and [`AnonymousId`]: who an event is attributed to
//! - [`CampaignContext`]: UTM attribution parsed from the landing URL
//! - [`build_context`]: the pure context enricher
//! - [`Event`] and the per-call builders ([`identify_event`], [`group_event`],
//!   [`page_event`], [`track_event`])
//! - [`IdentifyTarget`] / [`PageTarget`]: normalization of overloaded call shapes

pub mod campaign;
pub mod context;
pub mod error;
pub mod event;
pub mod identify;
pub mod page;
pub mod properties;

pub use campaign::CampaignContext;
pub use context::{build_context, ContextBlock, LibraryInfo};
pub use error::{CoreError, Result};
pub use event::{
	group_event, identify_event, page_event, track_event, Event, EventStamp, EventType,
	CONTEXT_OVERRIDE_KEY,
};
pub use identify::{AnonymousId, IdentifyTarget, Identity, ResolvedIdentify};
pub use page::{PageContext, PageInfo, PageTarget};
pub use properties::{deep_merge, Properties};
