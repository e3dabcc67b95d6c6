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

//! Client-to-engine assignment

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One matching engine in the directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEntry {
	pub id: String,
	pub address: String,
	/// Engine location, used by the nearest policy
	pub x: f64,
	pub y: f64,
}

/// Assignment policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignPolicy {
	/// Uniform random over the directory
	Random,
	/// Engine closest to the client's reported location
	Nearest,
}

/// Error types for assignment operations
#[derive(Debug, Error)]
pub enum AssignError {
	#[error("no matching engines configured")]
	EmptyDirectory,
}

/// Directory of matching engines clients can be assigned to
pub struct Assigner {
	engines: Vec<EngineEntry>,
	policy: AssignPolicy,
}

impl Assigner {
	pub fn new(engines: Vec<EngineEntry>, policy: AssignPolicy) -> Result<Self, AssignError> {
		if engines.is_empty() {
			return Err(AssignError::EmptyDirectory);
		}
		Ok(Self { engines, policy })
	}

	/// Pick an engine for a client at `(x, y)`
	pub fn assign(&self, x: f64, y: f64) -> &EngineEntry {
		match self.policy {
			AssignPolicy::Random => {
				let index = rand::thread_rng().gen_range(0..self.engines.len());
				&self.engines[index]
			}
			AssignPolicy::Nearest => self
				.engines
				.iter()
				.min_by(|a, b| {
					let da = (a.x - x).powi(2) + (a.y - y).powi(2);
					let db = (b.x - x).powi(2) + (b.y - y).powi(2);
					da.total_cmp(&db)
				})
				.expect("directory is non-empty by construction"),
		}
	}
}
