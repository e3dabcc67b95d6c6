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

//! Matching engine node
//!
//! Owns the per-symbol order books and decides, per incoming order,
//! between matching locally and forwarding once to a peer that
//! advertises a strictly better price. Fills are pushed into per-client
//! queues when the client is registered here, or routed to the client's
//! origin engine otherwise.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use lattice_sdk::auth::verify_shared_secret;
use lattice_sdk::types::{Fill, OrderStatus};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::orderbook::OrderBook;
use crate::sync::SyncError;
use crate::types::{
	BookSummary, EngineError, FillDelivery, LevelSummary, Order, OrderRecord, SubmitOutcome,
};

/// Routing capability the synchronizer provides to the engine
///
/// The engine consults it on every submit and hands it orders and fills
/// that must travel to a peer. Lookups are in-memory; only the routing
/// calls suspend.
#[tonic::async_trait]
pub trait PeerRouter: Send + Sync {
	/// Address of the engine advertising the best executable price for
	/// this order, or the local address when no peer is strictly better.
	fn lookup_bbo_engine(&self, order: &Order) -> String;

	/// Forward an order to a peer engine, exactly once per order id.
	async fn route_order(&self, order: Order, dst_addr: &str) -> Result<(), SyncError>;

	/// Deliver a fill to the client's origin engine.
	async fn route_fill(
		&self,
		fill: Fill,
		client_id: &str,
		dst_addr: &str,
	) -> Result<(), SyncError>;

	/// Publish this engine's post-mutation book state to the gossip
	/// fabric. Called after every admit, match and cancel.
	fn publish_update(&self, symbol: &str, bids: Vec<LevelSummary>, asks: Vec<LevelSummary>);
}

/// Book state capability the engine provides to the synchronizer
pub trait BookSource: Send + Sync {
	/// Local best bid and ask for a symbol, in ticks
	fn local_best(&self, symbol: &str) -> (Option<u64>, Option<u64>);

	/// Symbols with a live book on this engine
	fn symbols(&self) -> Vec<String>;

	/// Aggregated per-level snapshot for a symbol
	fn snapshot(&self, symbol: &str) -> BookSummary;
}

/// Per-client fill queue
///
/// Single producer (the engine) and single consumer (the client's fill
/// stream). Fills are at-least-once: once pushed they are never rolled
/// back, and a fill popped for a stream that died is requeued at the
/// front.
#[derive(Debug, Default)]
pub struct FillQueue {
	inner: Mutex<VecDeque<Fill>>,
	notify: Notify,
}

impl FillQueue {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&self, fill: Fill) {
		self.inner
			.lock()
			.expect("fill queue mutex poisoned")
			.push_back(fill);
		self.notify.notify_one();
	}

	/// Requeue a fill at the front after a failed delivery
	pub fn push_front(&self, fill: Fill) {
		self.inner
			.lock()
			.expect("fill queue mutex poisoned")
			.push_front(fill);
		self.notify.notify_one();
	}

	/// Wait for the next fill
	pub async fn pop(&self) -> Fill {
		loop {
			if let Some(fill) = self.try_pop() {
				return fill;
			}
			self.notify.notified().await;
		}
	}

	pub fn try_pop(&self) -> Option<Fill> {
		self.inner
			.lock()
			.expect("fill queue mutex poisoned")
			.pop_front()
	}

	pub fn len(&self) -> usize {
		self.inner.lock().expect("fill queue mutex poisoned").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Matching engine for one cluster node
pub struct MatchEngine {
	engine_id: String,
	/// Advertised address, embedded into orders this engine originates
	addr: String,
	secret: String,
	/// Symbol -> book; each book is mutated under its own mutex
	books: DashMap<String, Arc<Mutex<OrderBook>>>,
	/// Order id -> record, for duplicate submits and cancels
	orders: DashMap<String, OrderRecord>,
	/// Locally registered clients and their fill queues
	clients: DashMap<String, Arc<FillQueue>>,
	/// Client id -> origin engine address; insert-only
	routing: DashMap<String, String>,
	router: OnceLock<Arc<dyn PeerRouter>>,
}

impl MatchEngine {
	pub fn new(
		engine_id: impl Into<String>,
		addr: impl Into<String>,
		secret: impl Into<String>,
	) -> Self {
		Self {
			engine_id: engine_id.into(),
			addr: addr.into(),
			secret: secret.into(),
			books: DashMap::new(),
			orders: DashMap::new(),
			clients: DashMap::new(),
			routing: DashMap::new(),
			router: OnceLock::new(),
		}
	}

	/// Wire the synchronizer-provided routing capability.
	///
	/// Must be called once before orders are accepted.
	pub fn wire_router(&self, router: Arc<dyn PeerRouter>) {
		if self.router.set(router).is_err() {
			warn!(target: "engine", "peer router already wired, ignoring");
		}
	}

	pub fn engine_id(&self) -> &str {
		&self.engine_id
	}

	pub fn addr(&self) -> &str {
		&self.addr
	}

	/// Register a client on this engine
	///
	/// Idempotent: a second registration from the same id keeps the
	/// existing fill queue and is only worth a warning.
	pub fn register_client(&self, client_id: &str, secret: &str) -> Result<(), EngineError> {
		if !verify_shared_secret(secret, &self.secret) {
			warn!(target: "engine", client_id = %client_id, "client registration rejected: bad secret");
			return Err(EngineError::AuthFailed(client_id.to_string()));
		}

		match self.clients.entry(client_id.to_string()) {
			Entry::Occupied(_) => {
				warn!(target: "engine", client_id = %client_id, "client already registered");
			}
			Entry::Vacant(entry) => {
				entry.insert(Arc::new(FillQueue::new()));
				info!(target: "engine", client_id = %client_id, "client registered");
			}
		}
		Ok(())
	}

	/// Fill queue of a locally registered client
	pub fn fill_queue(&self, client_id: &str) -> Option<Arc<FillQueue>> {
		self.clients.get(client_id).map(|q| q.clone())
	}

	/// Submit an order: route it to a strictly better peer (at most
	/// once) or match it against the local book.
	pub async fn submit_order(&self, mut order: Order) -> Result<SubmitOutcome, EngineError> {
		let router = self.router.get().ok_or(EngineError::NotWired)?.clone();

		if order.quantity == 0 {
			return Err(EngineError::InvalidOrder("zero quantity".to_string()));
		}
		if order.price == 0 {
			return Err(EngineError::InvalidOrder("non-positive price".to_string()));
		}
		if order.remaining_quantity != order.quantity {
			warn!(
				target: "engine",
				order_id = %order.order_id,
				remaining = order.remaining_quantity,
				quantity = order.quantity,
				"remaining quantity mismatch on arrival, treating as fresh"
			);
			order.remaining_quantity = order.quantity;
		}
		// First engine to admit the order becomes its origin.
		if order.origin_addr.is_empty() {
			order.origin_addr = self.addr.clone();
		}

		if let Some(record) = self.orders.get(&order.order_id) {
			debug!(target: "engine", order_id = %order.order_id, "duplicate submit, returning prior status");
			return Ok(SubmitOutcome::Duplicate {
				order_id: order.order_id.clone(),
				status: record.status,
			});
		}

		// Routing gate: forward only orders this engine originated, so a
		// rerouted order is always processed where it lands.
		let best_addr = router.lookup_bbo_engine(&order);
		if best_addr != self.addr && order.origin_addr == self.addr {
			let order_id = order.order_id.clone();
			match router.route_order(order, &best_addr).await {
				Ok(()) => {
					info!(
						target: "engine",
						order_id = %order_id,
						peer = %best_addr,
						"order rerouted to better-priced peer"
					);
					return Ok(SubmitOutcome::Routed {
						order_id,
						peer_addr: best_addr,
					});
				}
				Err(SyncError::AlreadyRouted(_)) => {
					return Ok(SubmitOutcome::Duplicate {
						order_id,
						status: OrderStatus::New,
					});
				}
				// The peer advertised a better price; queueing locally
				// instead would execute worse than the cluster can.
				Err(e) => return Err(EngineError::RouteFailed(e.to_string())),
			}
		}

		self.process_locally(router.as_ref(), order).await
	}

	/// Match an order against the local book and dispatch its fills
	async fn process_locally(
		&self,
		router: &dyn PeerRouter,
		order: Order,
	) -> Result<SubmitOutcome, EngineError> {
		// Tie the client to its origin engine on first sight; the entry
		// is never overwritten afterwards.
		self.routing
			.entry(order.client_id.clone())
			.or_insert_with(|| order.origin_addr.clone());

		// Reserve the order id before matching so a concurrent duplicate
		// cannot execute twice.
		match self.orders.entry(order.order_id.clone()) {
			Entry::Occupied(existing) => {
				return Ok(SubmitOutcome::Duplicate {
					order_id: order.order_id.clone(),
					status: existing.get().status,
				});
			}
			Entry::Vacant(entry) => {
				entry.insert(OrderRecord {
					symbol: order.symbol.clone(),
					side: order.side,
					price: order.price,
					status: OrderStatus::New,
				});
			}
		}

		let book = self
			.books
			.entry(order.symbol.clone())
			.or_insert_with(|| Arc::new(Mutex::new(OrderBook::new(order.symbol.clone()))))
			.clone();

		let order_id = order.order_id.clone();
		let symbol = order.symbol.clone();

		// Non-suspending section: the whole match runs under the book
		// mutex, preserving price-time priority under concurrency.
		let (outcome, taker_status, bids, asks) = {
			let mut book = book.lock().expect("order book mutex poisoned");
			let outcome = book.add_order(order);
			let taker_status = if outcome.taker_remaining == 0 {
				OrderStatus::Filled
			} else if !outcome.taker_fills.is_empty() {
				OrderStatus::PartiallyFilled
			} else {
				OrderStatus::New
			};
			let (bids, asks) = book.level_summaries();
			(outcome, taker_status, bids, asks)
		};

		if let Some(mut record) = self.orders.get_mut(&order_id) {
			record.status = taker_status;
		}
		for maker_id in &outcome.filled_maker_ids {
			if let Some(mut record) = self.orders.get_mut(maker_id) {
				record.status = OrderStatus::Filled;
			}
		}
		for delivery in &outcome.maker_fills {
			let maker_id = &delivery.fill.maker_order_id;
			if outcome.filled_maker_ids.contains(maker_id) {
				continue;
			}
			if let Some(mut record) = self.orders.get_mut(maker_id) {
				record.status = OrderStatus::PartiallyFilled;
			}
		}

		router.publish_update(&symbol, bids, asks);

		let fill_count = outcome.taker_fills.len();
		debug!(
			target: "engine",
			order_id = %order_id,
			symbol = %symbol,
			fills = fill_count,
			remaining = outcome.taker_remaining,
			"order processed locally"
		);

		for delivery in outcome
			.taker_fills
			.into_iter()
			.chain(outcome.maker_fills.into_iter())
		{
			self.dispatch_fill(router, delivery).await;
		}

		Ok(SubmitOutcome::Executed {
			order_id,
			fill_count,
		})
	}

	/// Deliver one fill: local queue, else the client's origin engine
	async fn dispatch_fill(&self, router: &dyn PeerRouter, delivery: FillDelivery) {
		let FillDelivery { client_id, fill } = delivery;

		if let Some(queue) = self.clients.get(&client_id) {
			queue.push(fill);
			return;
		}

		let destination = self.routing.get(&client_id).map(|entry| entry.clone());
		match destination {
			Some(dst_addr) if dst_addr != self.addr => {
				if let Err(e) = router.route_fill(fill, &client_id, &dst_addr).await {
					// Transient: the fill is lost for now; the peer owns
					// no copy, so this is worth an error-level record.
					error!(
						target: "engine",
						client_id = %client_id,
						peer = %dst_addr,
						error = %e,
						"fill routing failed"
					);
				}
			}
			Some(_) => {
				error!(
					target: "engine",
					client_id = %client_id,
					fill_id = %fill.fill_id,
					"fill dropped: client maps to this engine but is not registered"
				);
			}
			None => {
				error!(
					target: "engine",
					client_id = %client_id,
					fill_id = %fill.fill_id,
					"fill dropped: no routing entry for client"
				);
			}
		}
	}

	/// Accept a fill produced on a peer for a client registered here
	pub fn deliver_routed_fill(&self, client_id: &str, fill: Fill) {
		match self.clients.get(client_id) {
			Some(queue) => queue.push(fill),
			None => {
				error!(
					target: "engine",
					client_id = %client_id,
					fill_id = %fill.fill_id,
					"routed fill dropped: client not registered on this engine"
				);
			}
		}
	}

	/// Cancel an order
	///
	/// Unknown id is an error; cancelling twice is a no-op. Fills already
	/// queued are unaffected.
	pub fn cancel_order(&self, order_id: &str) -> Result<(), EngineError> {
		let (symbol, side, price) = {
			let mut record = self
				.orders
				.get_mut(order_id)
				.ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;
			if record.status == OrderStatus::Cancelled {
				debug!(target: "engine", order_id = %order_id, "order already cancelled");
				return Ok(());
			}
			record.status = OrderStatus::Cancelled;
			(record.symbol.clone(), record.side, record.price)
		};

		if let Some(book) = self.books.get(&symbol).map(|b| b.clone()) {
			let (removed, bids, asks) = {
				let mut book = book.lock().expect("order book mutex poisoned");
				let removed = book.remove_order(side, price, order_id).is_some();
				let (bids, asks) = book.level_summaries();
				(removed, bids, asks)
			};
			if removed {
				if let Some(router) = self.router.get() {
					router.publish_update(&symbol, bids, asks);
				}
			}
		}

		info!(target: "engine", order_id = %order_id, "order cancelled");
		Ok(())
	}

	/// Current status of an order known to this engine
	pub fn order_status(&self, order_id: &str) -> Option<OrderStatus> {
		self.orders.get(order_id).map(|record| record.status)
	}
}

impl BookSource for MatchEngine {
	fn local_best(&self, symbol: &str) -> (Option<u64>, Option<u64>) {
		match self.books.get(symbol) {
			Some(book) => {
				let book = book.lock().expect("order book mutex poisoned");
				(book.best_bid(), book.best_ask())
			}
			None => (None, None),
		}
	}

	fn symbols(&self) -> Vec<String> {
		self.books.iter().map(|entry| entry.key().clone()).collect()
	}

	fn snapshot(&self, symbol: &str) -> BookSummary {
		match self.books.get(symbol) {
			Some(book) => {
				let book = book.lock().expect("order book mutex poisoned");
				let (bids, asks) = book.level_summaries();
				BookSummary {
					symbol: symbol.to_string(),
					bids,
					asks,
				}
			}
			None => BookSummary {
				symbol: symbol.to_string(),
				..BookSummary::default()
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use lattice_sdk::types::{Side, now_ns, price_to_ticks};
	use std::sync::atomic::{AtomicUsize, Ordering};

	/// Router stub: never reroutes, records published updates
	#[derive(Default)]
	struct LocalOnlyRouter {
		addr: String,
		publishes: AtomicUsize,
	}

	impl LocalOnlyRouter {
		fn new(addr: &str) -> Self {
			Self {
				addr: addr.to_string(),
				publishes: AtomicUsize::new(0),
			}
		}
	}

	#[tonic::async_trait]
	impl PeerRouter for LocalOnlyRouter {
		fn lookup_bbo_engine(&self, _order: &Order) -> String {
			self.addr.clone()
		}

		async fn route_order(&self, _order: Order, dst_addr: &str) -> Result<(), SyncError> {
			Err(SyncError::UnknownPeer(dst_addr.to_string()))
		}

		async fn route_fill(
			&self,
			_fill: Fill,
			_client_id: &str,
			dst_addr: &str,
		) -> Result<(), SyncError> {
			Err(SyncError::UnknownPeer(dst_addr.to_string()))
		}

		fn publish_update(
			&self,
			_symbol: &str,
			_bids: Vec<LevelSummary>,
			_asks: Vec<LevelSummary>,
		) {
			self.publishes.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Router stub that always points at a fixed peer
	struct BetterPeerRouter {
		peer_addr: String,
		routed: Mutex<Vec<String>>,
	}

	#[tonic::async_trait]
	impl PeerRouter for BetterPeerRouter {
		fn lookup_bbo_engine(&self, _order: &Order) -> String {
			self.peer_addr.clone()
		}

		async fn route_order(&self, order: Order, _dst_addr: &str) -> Result<(), SyncError> {
			self.routed.lock().unwrap().push(order.order_id);
			Ok(())
		}

		async fn route_fill(
			&self,
			_fill: Fill,
			_client_id: &str,
			_dst_addr: &str,
		) -> Result<(), SyncError> {
			Ok(())
		}

		fn publish_update(
			&self,
			_symbol: &str,
			_bids: Vec<LevelSummary>,
			_asks: Vec<LevelSummary>,
		) {
		}
	}

	const ADDR: &str = "127.0.0.1:6001";
	const SECRET: &str = "cluster-secret";

	fn engine_with_router() -> (Arc<MatchEngine>, Arc<LocalOnlyRouter>) {
		let engine = Arc::new(MatchEngine::new("engine_0", ADDR, SECRET));
		let router = Arc::new(LocalOnlyRouter::new(ADDR));
		engine.wire_router(router.clone());
		(engine, router)
	}

	fn order(order_id: &str, client_id: &str, side: Side, price: f64, quantity: u64) -> Order {
		Order {
			order_id: order_id.to_string(),
			client_id: client_id.to_string(),
			origin_addr: ADDR.to_string(),
			symbol: "X".to_string(),
			side,
			price: price_to_ticks(price).unwrap(),
			quantity,
			remaining_quantity: quantity,
			status: OrderStatus::New,
			timestamp_ns: now_ns(),
		}
	}

	#[tokio::test]
	async fn test_sell_then_buy_produces_single_fill() {
		let (engine, _) = engine_with_router();
		engine.register_client("seller", SECRET).unwrap();
		engine.register_client("buyer", SECRET).unwrap();

		engine
			.submit_order(order("S1", "seller", Side::Sell, 100.0, 10))
			.await
			.unwrap();
		let outcome = engine
			.submit_order(order("B1", "buyer", Side::Buy, 100.0, 4))
			.await
			.unwrap();

		assert_eq!(
			outcome,
			SubmitOutcome::Executed {
				order_id: "B1".to_string(),
				fill_count: 1
			}
		);

		let buyer_fill = engine.fill_queue("buyer").unwrap().try_pop().unwrap();
		assert_eq!(buyer_fill.quantity, 4);
		assert_eq!(buyer_fill.price, price_to_ticks(100.0).unwrap());
		assert_eq!(buyer_fill.buyer_id, "buyer");
		assert_eq!(buyer_fill.seller_id, "seller");

		let seller_fill = engine.fill_queue("seller").unwrap().try_pop().unwrap();
		assert_eq!(seller_fill.fill_id, buyer_fill.fill_id);

		// SELL remainder of 6 stays on the book
		let snapshot = engine.snapshot("X");
		assert_eq!(snapshot.asks.len(), 1);
		assert_eq!(snapshot.asks[0].quantity, 6);
		assert!(snapshot.bids.is_empty());
	}

	#[tokio::test]
	async fn test_fifo_fill_sequence_across_two_makers() {
		let (engine, _) = engine_with_router();
		for client in ["seller_a", "seller_b", "buyer"] {
			engine.register_client(client, SECRET).unwrap();
		}

		engine
			.submit_order(order("S1", "seller_a", Side::Sell, 100.0, 5))
			.await
			.unwrap();
		engine
			.submit_order(order("S2", "seller_b", Side::Sell, 100.0, 5))
			.await
			.unwrap();
		engine
			.submit_order(order("B1", "buyer", Side::Buy, 100.0, 7))
			.await
			.unwrap();

		let queue = engine.fill_queue("buyer").unwrap();
		let first = queue.try_pop().unwrap();
		let second = queue.try_pop().unwrap();
		assert_eq!(first.maker_order_id, "S1");
		assert_eq!(first.quantity, 5);
		assert_eq!(second.maker_order_id, "S2");
		assert_eq!(second.quantity, 2);
		assert!(queue.try_pop().is_none());

		assert_eq!(engine.order_status("S1"), Some(OrderStatus::Filled));
		assert_eq!(engine.order_status("S2"), Some(OrderStatus::PartiallyFilled));

		let snapshot = engine.snapshot("X");
		assert_eq!(snapshot.asks[0].quantity, 3);
	}

	#[tokio::test]
	async fn test_cancel_then_cross_produces_no_fill() {
		let (engine, _) = engine_with_router();
		engine.register_client("alice", SECRET).unwrap();
		engine.register_client("bob", SECRET).unwrap();

		engine
			.submit_order(order("O1", "alice", Side::Buy, 100.0, 5))
			.await
			.unwrap();
		engine.cancel_order("O1").unwrap();
		let outcome = engine
			.submit_order(order("S1", "bob", Side::Sell, 100.0, 5))
			.await
			.unwrap();

		assert_eq!(
			outcome,
			SubmitOutcome::Executed {
				order_id: "S1".to_string(),
				fill_count: 0
			}
		);
		assert!(engine.fill_queue("alice").unwrap().is_empty());
		assert!(engine.fill_queue("bob").unwrap().is_empty());
		assert_eq!(engine.order_status("O1"), Some(OrderStatus::Cancelled));

		// Cancelling again is a no-op, unknown ids are NOT_FOUND
		engine.cancel_order("O1").unwrap();
		assert!(matches!(
			engine.cancel_order("nope"),
			Err(EngineError::OrderNotFound(_))
		));
	}

	#[tokio::test]
	async fn test_duplicate_submit_is_idempotent() {
		let (engine, _) = engine_with_router();
		engine.register_client("alice", SECRET).unwrap();
		engine.register_client("bob", SECRET).unwrap();

		engine
			.submit_order(order("S1", "alice", Side::Sell, 100.0, 5))
			.await
			.unwrap();
		engine
			.submit_order(order("B1", "bob", Side::Buy, 100.0, 5))
			.await
			.unwrap();

		// Retry of the already-executed buy: no new fills
		let retry = engine
			.submit_order(order("B1", "bob", Side::Buy, 100.0, 5))
			.await
			.unwrap();
		assert_eq!(
			retry,
			SubmitOutcome::Duplicate {
				order_id: "B1".to_string(),
				status: OrderStatus::Filled
			}
		);
		assert_eq!(engine.fill_queue("bob").unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_validation_rejects_bad_orders() {
		let (engine, _) = engine_with_router();
		engine.register_client("alice", SECRET).unwrap();

		let result = engine
			.submit_order(order("Z1", "alice", Side::Buy, 100.0, 0))
			.await;
		assert!(matches!(result, Err(EngineError::InvalidOrder(_))));

		let mut bad_price = order("Z2", "alice", Side::Buy, 100.0, 1);
		bad_price.price = 0;
		let result = engine.submit_order(bad_price).await;
		assert!(matches!(result, Err(EngineError::InvalidOrder(_))));
	}

	#[tokio::test]
	async fn test_remaining_mismatch_coerced_to_fresh() {
		let (engine, _) = engine_with_router();
		engine.register_client("alice", SECRET).unwrap();

		let mut stale = order("R1", "alice", Side::Buy, 100.0, 10);
		stale.remaining_quantity = 3;
		engine.submit_order(stale).await.unwrap();

		let snapshot = engine.snapshot("X");
		assert_eq!(snapshot.bids[0].quantity, 10);
	}

	#[tokio::test]
	async fn test_origin_order_routed_to_better_peer() {
		let engine = Arc::new(MatchEngine::new("engine_0", ADDR, SECRET));
		let router = Arc::new(BetterPeerRouter {
			peer_addr: "127.0.0.1:6002".to_string(),
			routed: Mutex::new(Vec::new()),
		});
		engine.wire_router(router.clone());
		engine.register_client("alice", SECRET).unwrap();

		let outcome = engine
			.submit_order(order("B1", "alice", Side::Buy, 100.0, 5))
			.await
			.unwrap();

		assert_eq!(
			outcome,
			SubmitOutcome::Routed {
				order_id: "B1".to_string(),
				peer_addr: "127.0.0.1:6002".to_string()
			}
		);
		assert_eq!(router.routed.lock().unwrap().as_slice(), ["B1"]);
		// The order was not queued locally
		assert!(engine.snapshot("X").bids.is_empty());
		assert_eq!(engine.order_status("B1"), None);
	}

	#[tokio::test]
	async fn test_rerouted_order_processed_locally_despite_stale_bbo() {
		// Even when this engine's view claims a peer is better, an order
		// that already travelled once must be admitted here.
		let engine = Arc::new(MatchEngine::new("engine_1", "127.0.0.1:6002", SECRET));
		let router = Arc::new(BetterPeerRouter {
			peer_addr: "127.0.0.1:6001".to_string(),
			routed: Mutex::new(Vec::new()),
		});
		engine.wire_router(router.clone());

		let mut rerouted = order("B1", "alice", Side::Buy, 100.0, 5);
		rerouted.origin_addr = "127.0.0.1:6001".to_string();
		let outcome = engine.submit_order(rerouted).await.unwrap();

		assert!(matches!(outcome, SubmitOutcome::Executed { .. }));
		assert!(router.routed.lock().unwrap().is_empty());
		assert_eq!(engine.snapshot("X").bids.len(), 1);
	}

	/// Router stub that claims a better peer but fails every route
	struct UnreachablePeerRouter {
		peer_addr: String,
	}

	#[tonic::async_trait]
	impl PeerRouter for UnreachablePeerRouter {
		fn lookup_bbo_engine(&self, _order: &Order) -> String {
			self.peer_addr.clone()
		}

		async fn route_order(&self, _order: Order, dst_addr: &str) -> Result<(), SyncError> {
			Err(SyncError::Transport(format!("{} unreachable", dst_addr)))
		}

		async fn route_fill(
			&self,
			_fill: Fill,
			_client_id: &str,
			dst_addr: &str,
		) -> Result<(), SyncError> {
			Err(SyncError::Transport(format!("{} unreachable", dst_addr)))
		}

		fn publish_update(
			&self,
			_symbol: &str,
			_bids: Vec<LevelSummary>,
			_asks: Vec<LevelSummary>,
		) {
		}
	}

	#[tokio::test]
	async fn test_route_failure_does_not_queue_locally() {
		// The peer was known better; executing here instead would fill
		// worse than the cluster can, so the order is dropped and the
		// caller told to retry.
		let engine = Arc::new(MatchEngine::new("engine_0", ADDR, SECRET));
		engine.wire_router(Arc::new(UnreachablePeerRouter {
			peer_addr: "127.0.0.1:6002".to_string(),
		}));
		engine.register_client("alice", SECRET).unwrap();

		let result = engine
			.submit_order(order("B1", "alice", Side::Buy, 100.0, 5))
			.await;
		assert!(matches!(result, Err(EngineError::RouteFailed(_))));
		assert!(engine.snapshot("X").bids.is_empty());
		assert_eq!(engine.order_status("B1"), None);
	}

	#[tokio::test]
	async fn test_fill_queue_is_fifo_and_wakes_consumer() {
		let queue = Arc::new(FillQueue::new());
		let consumer = {
			let queue = queue.clone();
			tokio::spawn(async move { queue.pop().await })
		};

		let fill = Fill {
			fill_id: "f1".to_string(),
			taker_order_id: "t".to_string(),
			maker_order_id: "m".to_string(),
			symbol: "X".to_string(),
			price: 1,
			quantity: 1,
			timestamp_ns: 0,
			buyer_id: "b".to_string(),
			seller_id: "s".to_string(),
			destination_addr: ADDR.to_string(),
		};
		queue.push(fill.clone());
		assert_eq!(consumer.await.unwrap().fill_id, "f1");

		// push_front puts an undelivered fill back ahead of newer ones
		let mut second = fill.clone();
		second.fill_id = "f2".to_string();
		queue.push(second);
		queue.push_front(fill);
		assert_eq!(queue.try_pop().unwrap().fill_id, "f1");
		assert_eq!(queue.try_pop().unwrap().fill_id, "f2");
		assert!(queue.try_pop().is_none());
	}

	#[tokio::test]
	async fn test_registration_rejects_bad_secret_and_is_idempotent() {
		let (engine, _) = engine_with_router();

		assert!(matches!(
			engine.register_client("mallory", "wrong"),
			Err(EngineError::AuthFailed(_))
		));
		engine.register_client("alice", SECRET).unwrap();
		engine.register_client("alice", SECRET).unwrap();
		assert!(engine.fill_queue("alice").is_some());
	}

	#[tokio::test]
	async fn test_fill_attribution_matches_client() {
		let (engine, _) = engine_with_router();
		engine.register_client("alice", SECRET).unwrap();
		engine.register_client("bob", SECRET).unwrap();

		engine
			.submit_order(order("S1", "alice", Side::Sell, 100.0, 3))
			.await
			.unwrap();
		engine
			.submit_order(order("B1", "bob", Side::Buy, 101.0, 3))
			.await
			.unwrap();

		for client in ["alice", "bob"] {
			let fill = engine.fill_queue(client).unwrap().try_pop().unwrap();
			assert!(
				fill.buyer_id == client || fill.seller_id == client,
				"fill delivered to {} names neither side",
				client
			);
		}
	}

	#[tokio::test]
	async fn test_publish_update_follows_every_mutation() {
		let (engine, router) = engine_with_router();
		engine.register_client("alice", SECRET).unwrap();

		engine
			.submit_order(order("O1", "alice", Side::Buy, 100.0, 5))
			.await
			.unwrap();
		assert_eq!(router.publishes.load(Ordering::Relaxed), 1);

		engine.cancel_order("O1").unwrap();
		assert_eq!(router.publishes.load(Ordering::Relaxed), 2);
	}
}
