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

use lattice_sdk::types::{Fill, OrderStatus, Side};
use serde::{Deserialize, Serialize};

/// Order inside a matching engine
///
/// Identity fields are immutable once the order is admitted;
/// `remaining_quantity` and `status` mutate as the order matches.
/// `origin_addr` is set by the first engine to admit the order and is
/// never rewritten by any peer - it is what bounds rerouting to a single
/// hop and what fills are routed back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Globally unique order id (serves as the idempotency key)
	pub order_id: String,
	pub client_id: String,
	/// Advertised address of the origin engine; write-once
	pub origin_addr: String,
	pub symbol: String,
	pub side: Side,
	/// Limit price in ticks
	pub price: u64,
	pub quantity: u64,
	pub remaining_quantity: u64,
	pub status: OrderStatus,
	/// Nanoseconds since the Unix epoch, UTC
	pub timestamp_ns: i64,
}

/// Bookkeeping entry kept per admitted order
///
/// Enough state to answer duplicate submits and to cancel without
/// scanning the book: the price pins the level the order rests at.
#[derive(Debug, Clone)]
pub struct OrderRecord {
	pub symbol: String,
	pub side: Side,
	pub price: u64,
	pub status: OrderStatus,
}

/// A fill paired with the client it must be delivered to
#[derive(Debug, Clone)]
pub struct FillDelivery {
	pub client_id: String,
	pub fill: Fill,
}

/// Result of matching one incoming order against a book
///
/// Every match produces two records sharing one deterministic fill id:
/// one addressed to the taker's origin engine and one to the maker's.
#[derive(Debug, Default)]
pub struct MatchOutcome {
	/// Fills for the incoming order's client
	pub taker_fills: Vec<FillDelivery>,
	/// Fills for the resting orders' clients, in match order
	pub maker_fills: Vec<FillDelivery>,
	/// Maker orders whose remaining quantity reached zero
	pub filled_maker_ids: Vec<String>,
	/// Taker quantity left after matching (rested if non-zero)
	pub taker_remaining: u64,
}

/// Aggregated view of one price level, as gossiped between engines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSummary {
	pub price: u64,
	pub quantity: u64,
	pub order_count: u32,
}

/// Aggregated per-symbol book snapshot
#[derive(Debug, Clone, Default)]
pub struct BookSummary {
	pub symbol: String,
	pub bids: Vec<LevelSummary>,
	pub asks: Vec<LevelSummary>,
}

/// Error types for matching engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
	#[error("invalid order: {0}")]
	InvalidOrder(String),
	#[error("unknown order id: {0}")]
	OrderNotFound(String),
	#[error("order routing failed: {0}")]
	RouteFailed(String),
	#[error("authentication failed for client {0}")]
	AuthFailed(String),
	#[error("engine is not wired to a synchronizer")]
	NotWired,
}

/// Outcome of a submit accepted by this engine
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
	/// Processed locally; fills (if any) were dispatched
	Executed { order_id: String, fill_count: usize },
	/// Forwarded once to a peer advertising a strictly better price
	Routed { order_id: String, peer_addr: String },
	/// Order id already seen; nothing re-executed
	Duplicate {
		order_id: String,
		status: OrderStatus,
	},
}
