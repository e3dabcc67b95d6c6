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

use std::collections::{BTreeMap, VecDeque};

use lattice_sdk::types::{Fill, OrderStatus, Side, now_ns};
use serde::{Deserialize, Serialize};

use crate::types::{FillDelivery, LevelSummary, MatchOutcome, Order};

/// Price level in the order book
///
/// Orders are kept in arrival order; `total_quantity` is maintained on
/// every mutation so snapshots never walk the queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceLevel {
	orders: VecDeque<Order>,
	total_quantity: u64,
}

impl PriceLevel {
	fn push(&mut self, order: Order) {
		self.total_quantity += order.remaining_quantity;
		self.orders.push_back(order);
	}

	fn pop_front(&mut self) -> Option<Order> {
		let order = self.orders.pop_front();
		if let Some(order) = &order {
			self.total_quantity -= order.remaining_quantity;
		}
		order
	}

	fn remove(&mut self, order_id: &str) -> Option<Order> {
		let pos = self.orders.iter().position(|o| o.order_id == order_id)?;
		let order = self.orders.remove(pos)?;
		self.total_quantity -= order.remaining_quantity;
		Some(order)
	}

	fn is_empty(&self) -> bool {
		self.orders.is_empty()
	}

	fn summary(&self, price: u64) -> LevelSummary {
		LevelSummary {
			price,
			quantity: self.total_quantity,
			order_count: self.orders.len() as u32,
		}
	}

	/// Total resting quantity at this level
	pub fn total_quantity(&self) -> u64 {
		self.total_quantity
	}

	#[cfg(test)]
	pub(crate) fn order_ids(&self) -> Vec<String> {
		self.orders.iter().map(|o| o.order_id.clone()).collect()
	}
}

/// Limit order book for one symbol
///
/// Both sides are ordered maps keyed by price so matching walks levels
/// in strict price priority: ascending asks for an incoming buy,
/// descending bids for an incoming sell. The book itself is not
/// synchronized; the engine guards each book with its own mutex and
/// `add_order` runs to completion inside that critical section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
	symbol: String,
	bids: BTreeMap<u64, PriceLevel>,
	asks: BTreeMap<u64, PriceLevel>,
}

impl OrderBook {
	/// Create a new order book for a symbol
	pub fn new(symbol: impl Into<String>) -> Self {
		Self {
			symbol: symbol.into(),
			bids: BTreeMap::new(),
			asks: BTreeMap::new(),
		}
	}

	/// Get the symbol identifier
	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	/// Get the best bid price in ticks
	pub fn best_bid(&self) -> Option<u64> {
		self.bids.keys().next_back().copied()
	}

	/// Get the best ask price in ticks
	pub fn best_ask(&self) -> Option<u64> {
		self.asks.keys().next().copied()
	}

	/// Match an incoming order against the book, resting any remainder
	///
	/// Produces one taker-side and one maker-side fill record per match,
	/// sharing a deterministic fill id. Exhausted resting orders and
	/// emptied levels are evicted before this returns, so the book never
	/// stays crossed: `best_bid < best_ask` holds on return.
	pub fn add_order(&mut self, mut order: Order) -> MatchOutcome {
		let mut outcome = MatchOutcome::default();

		match order.side {
			Side::Buy => {
				while order.remaining_quantity > 0 {
					let Some(price) = self.best_ask() else { break };
					if price > order.price {
						break;
					}
					let level = self
						.asks
						.get_mut(&price)
						.expect("best ask level disappeared during match");
					Self::match_at_level(level, &mut order, price, &mut outcome);
					if level.is_empty() {
						self.asks.remove(&price);
					}
				}
			}
			Side::Sell => {
				while order.remaining_quantity > 0 {
					let Some(price) = self.best_bid() else { break };
					if price < order.price {
						break;
					}
					let level = self
						.bids
						.get_mut(&price)
						.expect("best bid level disappeared during match");
					Self::match_at_level(level, &mut order, price, &mut outcome);
					if level.is_empty() {
						self.bids.remove(&price);
					}
				}
			}
		}

		order.status = if order.remaining_quantity == 0 {
			OrderStatus::Filled
		} else if order.remaining_quantity < order.quantity {
			OrderStatus::PartiallyFilled
		} else {
			OrderStatus::New
		};
		outcome.taker_remaining = order.remaining_quantity;

		if order.remaining_quantity > 0 {
			let side_map = match order.side {
				Side::Buy => &mut self.bids,
				Side::Sell => &mut self.asks,
			};
			side_map.entry(order.price).or_default().push(order);
		}

		debug_assert!(
			match (self.best_bid(), self.best_ask()) {
				(Some(bid), Some(ask)) => bid < ask,
				_ => true,
			},
			"book left crossed after add_order"
		);

		outcome
	}

	/// Match the incoming order against one price level, FIFO
	fn match_at_level(
		level: &mut PriceLevel,
		taker: &mut Order,
		price: u64,
		outcome: &mut MatchOutcome,
	) {
		while taker.remaining_quantity > 0 {
			let Some(maker) = level.orders.front_mut() else {
				break;
			};

			let fill_quantity = taker.remaining_quantity.min(maker.remaining_quantity);
			taker.remaining_quantity -= fill_quantity;
			// A resting order with zero remaining would already have been
			// evicted; going negative here means the book is corrupt.
			maker.remaining_quantity = maker
				.remaining_quantity
				.checked_sub(fill_quantity)
				.expect("resting order remaining quantity underflow");

			let (buyer_id, seller_id) = match taker.side {
				Side::Buy => (taker.client_id.clone(), maker.client_id.clone()),
				Side::Sell => (maker.client_id.clone(), taker.client_id.clone()),
			};

			let taker_fill = Fill {
				fill_id: Fill::deterministic_id(&taker.order_id, &maker.order_id),
				taker_order_id: taker.order_id.clone(),
				maker_order_id: maker.order_id.clone(),
				symbol: taker.symbol.clone(),
				price,
				quantity: fill_quantity,
				timestamp_ns: now_ns(),
				buyer_id,
				seller_id,
				destination_addr: taker.origin_addr.clone(),
			};
			let maker_fill = Fill {
				destination_addr: maker.origin_addr.clone(),
				..taker_fill.clone()
			};
			let maker_client_id = maker.client_id.clone();
			let maker_exhausted = maker.remaining_quantity == 0;
			maker.status = if maker_exhausted {
				OrderStatus::Filled
			} else {
				OrderStatus::PartiallyFilled
			};
			let maker_order_id = maker.order_id.clone();

			level.total_quantity -= fill_quantity;
			outcome.taker_fills.push(FillDelivery {
				client_id: taker.client_id.clone(),
				fill: taker_fill,
			});
			outcome.maker_fills.push(FillDelivery {
				client_id: maker_client_id,
				fill: maker_fill,
			});

			if maker_exhausted {
				outcome.filled_maker_ids.push(maker_order_id);
				level.pop_front();
			}
		}
	}

	/// Remove a resting order from its price level
	///
	/// Empty levels are dropped. Returns `None` when the order is not
	/// resting at that price (already filled or never rested here).
	pub fn remove_order(&mut self, side: Side, price: u64, order_id: &str) -> Option<Order> {
		let side_map = match side {
			Side::Buy => &mut self.bids,
			Side::Sell => &mut self.asks,
		};

		let level = side_map.get_mut(&price)?;
		let removed = level.remove(order_id);
		if level.is_empty() {
			side_map.remove(&price);
		}
		removed
	}

	/// Per-level aggregates: bids best-first (descending), asks best-first
	/// (ascending)
	pub fn level_summaries(&self) -> (Vec<LevelSummary>, Vec<LevelSummary>) {
		let bids = self
			.bids
			.iter()
			.rev()
			.map(|(price, level)| level.summary(*price))
			.collect();
		let asks = self
			.asks
			.iter()
			.map(|(price, level)| level.summary(*price))
			.collect();
		(bids, asks)
	}

	#[cfg(test)]
	pub(crate) fn level(&self, side: Side, price: u64) -> Option<&PriceLevel> {
		match side {
			Side::Buy => self.bids.get(&price),
			Side::Sell => self.asks.get(&price),
		}
	}
}
