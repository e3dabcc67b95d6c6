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

//! Lattice Matching Engine
//!
//! One node of a distributed limit-order matching cluster. Each engine
//! owns authoritative books for the orders it admits and gossips
//! aggregated price-level snapshots with its peers; orders that would
//! cross at a strictly better price on a peer are forwarded there
//! exactly once, and fills produced remotely are routed back to the
//! client's origin engine.
//!
//! Architecture:
//! - Per-book mutex: a whole match runs as one exclusive section
//! - Synchronizer gossip loop: push + pull of idempotent snapshots
//!   tagged with per-engine sequence numbers
//! - Capability traits break the engine <-> synchronizer cycle:
//!   the engine consumes `PeerRouter`, the synchronizer `BookSource`
//! - Per-client SPSC fill queues drained by server-streamed `GetFills`

pub mod config;
pub mod engine;
pub mod logging;
pub mod orderbook;
pub mod peer;
pub mod server;
pub mod sync;
pub mod types;

// Include generated gRPC code
pub mod proto {
	tonic::include_proto!("lattice");
}

pub use config::EngineConfig;
pub use engine::{BookSource, FillQueue, MatchEngine, PeerRouter};
pub use orderbook::{OrderBook, PriceLevel};
pub use peer::GrpcPeerLink;
pub use server::{MatchingApi, create_server};
pub use sync::{
	BestPriceUpdate, BookPull, BookUpdate, GlobalBbo, PeerLink, Quote, SyncError, Synchronizer,
};
pub use types::*;
