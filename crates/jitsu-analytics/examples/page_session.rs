// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Example: Simulate a page session with the jitsu-analytics client.
//!
//! Run with:
//!   JITSU_HOST=http://localhost:8080 cargo run --example page_session -p jitsu-analytics
//!
//! Optional config file path as the first argument. Set `RUST_LOG=debug` to
//! see identity and dispatch decisions.

use std::path::PathBuf;

use jitsu_analytics::{ClientConfig, JitsuClient, PageInfo, Properties};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let config_path = std::env::args().nth(1).map(PathBuf::from);
	let mut config = ClientConfig::load(config_path.as_deref())?;
	if config.storage_path.is_none() {
		config.storage_path = Some(std::env::temp_dir().join("jitsu-example-cookies.json"));
	}

	println!("Initializing Jitsu client...");
	println!("  Host: {}", config.host.as_deref().unwrap_or("<unset>"));
	if let Some(path) = &config.storage_path {
		println!("  Cookie jar: {}", path.display());
	}

	let client = JitsuClient::builder()
		.config(config)
		.page(
			PageInfo::new("https://shop.example.com/basic.html?utm_source=source&utm_medium=medium&utm_campaign=campaign")
				.with_title("Basic"),
		)
		.build()?;

	println!("  Anonymous ID: {}", client.anonymous_id());

	client.identify("user1", Properties::new().insert("email", "john.doe@gmail.com"));
	client.page(None::<&str>, Properties::new());
	client.track("pageLoaded", Properties::new().insert("trackParam", "trackValue"));

	client.navigate("https://shop.example.com/pricing.html", Some("Pricing".to_string()), None);
	let event = client.page("pricing", Properties::new().insert("plan", "pro"));
	println!("\nLast event:\n{}", serde_json::to_string_pretty(&event)?);

	client.shutdown().await?;

	let stats = client.stats();
	println!("\nSession complete.");
	println!("  Delivered: {}", stats.delivered);
	println!("  Failed: {}", stats.failed);
	println!("  Dropped: {}", stats.dropped);

	Ok(())
}
