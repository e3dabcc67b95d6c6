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

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory component name
pub const LOG_COMPONENT_NAME: &str = "engine";

/// Matching engine node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
	/// gRPC server bind address
	pub bind_addr: SocketAddr,
	/// Address peers and clients reach this engine at; embedded into
	/// orders this engine originates and into fill destinations
	pub advertised_addr: String,
	/// Engine identifier used in gossip messages and logs
	pub engine_id: String,
	/// Peer engine addresses (`ip:port`)
	pub peers: Vec<String>,
	/// Shared secret clients must present on registration
	pub secret: String,
	/// Gossip loop interval in milliseconds
	pub gossip_interval_ms: u64,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			bind_addr: "0.0.0.0:50051".parse().unwrap(),
			advertised_addr: "127.0.0.1:50051".to_string(),
			engine_id: "engine_0".to_string(),
			peers: Vec::new(),
			secret: "dev-secret".to_string(),
			gossip_interval_ms: 100,
		}
	}
}

impl EngineConfig {
	/// Load configuration from environment variables
	pub fn from_env() -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::Environment::with_prefix("ENGINE"))
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.add_source(config::Environment::with_prefix("ENGINE"))
			.build()?;

		cfg.try_deserialize()
	}
}
