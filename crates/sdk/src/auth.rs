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

//! Shared-secret verification used by both the exchange bootstrap node
//! and the matching engines.

use sha2::{Digest, Sha256};

/// Compare a presented shared secret against the configured one.
///
/// Both values are hashed first so the comparison runs over fixed-length
/// digests and the loop never exits early on a mismatched byte.
pub fn verify_shared_secret(presented: &str, configured: &str) -> bool {
	let presented = Sha256::digest(presented.as_bytes());
	let configured = Sha256::digest(configured.as_bytes());

	let mut diff = 0u8;
	for (a, b) in presented.iter().zip(configured.iter()) {
		diff |= a ^ b;
	}
	diff == 0
}
