// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities: a pre-configured `reqwest` client builder with a
//! consistent User-Agent header.

mod client;

pub use client::{builder, new_client_with_timeout, platform, user_agent};
