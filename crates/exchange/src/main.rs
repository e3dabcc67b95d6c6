// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Exchange bootstrap node entry point
//!
//! Authenticates arriving clients and hands each one the address of a
//! matching engine. Takes an optional config file path as the first
//! argument; settings can also come from `EXCHANGE_*` environment
//! variables.

mod assigner;
mod auth;
mod config;
mod logging;
mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use crate::assigner::Assigner;
use crate::config::ExchangeConfig;
use crate::server::create_server;

#[tokio::main]
async fn main() -> Result<()> {
	let config = match std::env::args().nth(1) {
		Some(path) => ExchangeConfig::from_file(&path)
			.with_context(|| format!("Failed to load config from {}", path))?,
		None => ExchangeConfig::from_env().unwrap_or_default(),
	};

	logging::init_logging()?;

	// Misconfiguration is fatal at startup, before the port binds.
	let assigner = Arc::new(
		Assigner::new(config.engines.clone(), config.policy)
			.context("refusing to start without matching engines")?,
	);

	info!(
		target: "exchange",
		engines = config.engines.len(),
		policy = ?config.policy,
		"exchange listening on {}",
		config.bind_addr
	);

	tonic::transport::Server::builder()
		.add_service(create_server(assigner, config.secret.clone()))
		.serve_with_shutdown(config.bind_addr, async {
			let _ = signal::ctrl_c().await;
			info!(target: "exchange", "shutdown signal received");
		})
		.await
		.context("gRPC server failed")?;

	info!(target: "exchange", "exchange stopped");
	Ok(())
}
