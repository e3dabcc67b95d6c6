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

use crate::assigner::{AssignPolicy, EngineEntry};

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory component name
pub const LOG_COMPONENT_NAME: &str = "exchange";

/// Exchange bootstrap node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
	/// gRPC server bind address
	pub bind_addr: SocketAddr,
	/// Shared secret clients must present
	pub secret: String,
	/// Client assignment policy
	pub policy: AssignPolicy,
	/// Matching engines clients can be assigned to
	pub engines: Vec<EngineEntry>,
}

impl Default for ExchangeConfig {
	fn default() -> Self {
		Self {
			bind_addr: "0.0.0.0:50050".parse().unwrap(),
			secret: "dev-secret".to_string(),
			policy: AssignPolicy::Random,
			engines: vec![EngineEntry {
				id: "engine_0".to_string(),
				address: "127.0.0.1:50051".to_string(),
				x: 0.0,
				y: 0.0,
			}],
		}
	}
}

impl ExchangeConfig {
	/// Load configuration from environment variables
	pub fn from_env() -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::Environment::with_prefix("EXCHANGE"))
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.add_source(config::Environment::with_prefix("EXCHANGE"))
			.build()?;

		cfg.try_deserialize()
	}
}
