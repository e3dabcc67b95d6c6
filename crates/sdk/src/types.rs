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

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
	Buy,
	Sell,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	New,
	PartiallyFilled,
	Filled,
	Cancelled,
}

/// Price ticks per currency unit.
///
/// Prices cross the wire as doubles but are held as integer ticks
/// everywhere inside the cluster, so one tick is the smallest price
/// increment (0.01 at the default scale).
pub const PRICE_SCALE: u64 = 100;

/// Convert a wire price to internal ticks.
///
/// Returns `None` for non-finite, non-positive, or out-of-range prices.
pub fn price_to_ticks(price: f64) -> Option<u64> {
	if !price.is_finite() || price <= 0.0 {
		return None;
	}
	let ticks = (price * PRICE_SCALE as f64).round();
	if ticks < 1.0 || ticks >= u64::MAX as f64 {
		return None;
	}
	Some(ticks as u64)
}

/// Convert internal ticks back to a wire price.
pub fn ticks_to_price(ticks: u64) -> f64 {
	ticks as f64 / PRICE_SCALE as f64
}

/// Nanoseconds since the Unix epoch, UTC.
pub fn now_ns() -> i64 {
	std::time::SystemTime::now()
		.duration_since(std::time::SystemTime::UNIX_EPOCH)
		.unwrap()
		.as_nanos() as i64
}

/// Execution record delivered to both parties of a match.
///
/// The pair of records produced by one match share the same `fill_id`,
/// which is deterministic from the two order ids so duplicates can be
/// detected downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
	pub fill_id: String,
	/// Incoming (aggressing) order of the match
	pub taker_order_id: String,
	/// Resting order consumed by the match
	pub maker_order_id: String,
	pub symbol: String,
	/// Execution price in ticks
	pub price: u64,
	pub quantity: u64,
	pub timestamp_ns: i64,
	pub buyer_id: String,
	pub seller_id: String,
	/// Origin engine of the party this record notifies
	pub destination_addr: String,
}

impl Fill {
	/// Deterministic fill id for the `(taker, maker)` order pair.
	pub fn deterministic_id(taker_order_id: &str, maker_order_id: &str) -> String {
		format!("fill_{}_{}", taker_order_id, maker_order_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_price_round_trip() {
		let ticks = price_to_ticks(100.25).unwrap();
		assert_eq!(ticks, 10025);
		assert_eq!(ticks_to_price(ticks), 100.25);
	}

	#[test]
	fn test_price_rejects_garbage() {
		assert_eq!(price_to_ticks(0.0), None);
		assert_eq!(price_to_ticks(-1.5), None);
		assert_eq!(price_to_ticks(f64::NAN), None);
		assert_eq!(price_to_ticks(f64::INFINITY), None);
	}

	#[test]
	fn test_one_tick_is_the_smallest_increment() {
		assert_eq!(price_to_ticks(0.01), Some(1));
		assert_eq!(price_to_ticks(0.001), None);
	}

	#[test]
	fn test_fill_id_is_deterministic() {
		let a = Fill::deterministic_id("o1", "o2");
		let b = Fill::deterministic_id("o1", "o2");
		assert_eq!(a, b);
		assert_ne!(a, Fill::deterministic_id("o2", "o1"));
	}
}
