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

use lattice_sdk::auth::verify_shared_secret;
use thiserror::Error;

/// Error types for authentication operations
#[derive(Debug, Error)]
pub enum AuthError {
	#[error("invalid shared secret for client {0}")]
	InvalidSecret(String),
}

/// Authenticate a client against the configured shared secret
pub fn authenticate(client_id: &str, presented: &str, configured: &str) -> Result<(), AuthError> {
	if verify_shared_secret(presented, configured) {
		Ok(())
	} else {
		Err(AuthError::InvalidSecret(client_id.to_string()))
	}
}
