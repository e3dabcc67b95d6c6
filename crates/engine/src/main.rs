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

//! Matching engine node entry point
//!
//! Takes an optional config file path as the first argument; every
//! setting can also come from `ENGINE_*` environment variables.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use lattice_engine::config::{EngineConfig, LOG_COMPONENT_NAME};
use lattice_engine::peer::GrpcPeerLink;
use lattice_engine::sync::PeerLink;
use lattice_engine::{MatchEngine, Synchronizer, create_server, logging};

#[tokio::main]
async fn main() -> Result<()> {
	let config = match std::env::args().nth(1) {
		Some(path) => EngineConfig::from_file(&path)
			.with_context(|| format!("Failed to load config from {}", path))?,
		None => EngineConfig::from_env().unwrap_or_default(),
	};

	logging::init_logging(LOG_COMPONENT_NAME)?;
	info!(
		target: "server",
		engine_id = %config.engine_id,
		addr = %config.advertised_addr,
		peers = ?config.peers,
		"starting matching engine"
	);

	let engine = Arc::new(MatchEngine::new(
		&config.engine_id,
		&config.advertised_addr,
		&config.secret,
	));

	let peers: Vec<(String, Arc<dyn PeerLink>)> = config
		.peers
		.iter()
		.map(|addr| {
			(
				addr.clone(),
				Arc::new(GrpcPeerLink::new(addr)) as Arc<dyn PeerLink>,
			)
		})
		.collect();
	let sync = Arc::new(Synchronizer::new(
		&config.engine_id,
		&config.advertised_addr,
		peers,
		Duration::from_millis(config.gossip_interval_ms),
	));

	// Wire the engine <-> synchronizer capabilities, then start gossip.
	engine.wire_router(sync.clone());
	sync.attach_books(engine.clone());
	let gossip = sync.start();

	info!(target: "server", "engine listening on {}", config.bind_addr);
	tonic::transport::Server::builder()
		.add_service(create_server(engine.clone(), sync.clone()))
		.serve_with_shutdown(config.bind_addr, async {
			let _ = signal::ctrl_c().await;
			info!(target: "server", "shutdown signal received");
		})
		.await
		.context("gRPC server failed")?;

	// Cooperative shutdown: stop gossip, give in-flight fill streams a
	// short grace interval to drain.
	sync.stop();
	let _ = gossip.await;
	tokio::time::sleep(Duration::from_millis(200)).await;
	info!(target: "server", "engine stopped");

	Ok(())
}
