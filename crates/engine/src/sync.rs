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

//! Order book synchronizer
//!
//! Gossips aggregated price-level snapshots between engines, maintains
//! an advisory global best-bid/best-ask view per symbol, and carries the
//! two routing RPCs: forwarding an order to a better-priced peer and
//! returning a fill to a client's origin engine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use futures::future::join_all;
use lattice_sdk::types::{Fill, Side};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{BookSource, PeerRouter};
use crate::types::{LevelSummary, Order};

/// Outbound snapshot queue capacity; overflow drops the update since
/// snapshots are idempotent and superseded by the next publish.
const UPDATE_QUEUE_CAPACITY: usize = 1024;

/// Error types for synchronizer operations
#[derive(Debug, Error)]
pub enum SyncError {
	#[error("peer transport error: {0}")]
	Transport(String),
	#[error("peer status error: {0}")]
	Status(String),
	#[error("no peer link for address {0}")]
	UnknownPeer(String),
	#[error("order {0} was already routed once")]
	AlreadyRouted(String),
}

/// Transport seam between this synchronizer and one peer engine
///
/// Production uses a gRPC-backed link; tests wire engines together
/// in-process through the same trait.
#[tonic::async_trait]
pub trait PeerLink: Send + Sync {
	/// Forward an order for execution on the peer
	async fn submit_order(&self, order: Order) -> Result<(), SyncError>;

	/// Hand a fill to the peer for local delivery
	async fn deliver_fill(&self, client_id: &str, fill: Fill) -> Result<(), SyncError>;

	/// Push an aggregated book snapshot
	async fn push_book(&self, update: BookUpdate) -> Result<(), SyncError>;

	/// Pull the peer's aggregated book for one symbol
	async fn pull_book(&self, symbol: &str) -> Result<BookPull, SyncError>;

	/// Push local best prices (advisory fast path)
	async fn push_best_price(&self, update: BestPriceUpdate) -> Result<(), SyncError>;
}

/// Aggregated snapshot queued for broadcast to peers
#[derive(Debug, Clone)]
pub struct BookUpdate {
	pub symbol: String,
	pub sequence_number: u64,
	pub engine_id: String,
	pub engine_addr: String,
	pub bids: Vec<LevelSummary>,
	pub asks: Vec<LevelSummary>,
}

/// A peer's book for one symbol as returned by a pull
#[derive(Debug, Clone)]
pub struct BookPull {
	pub sequence_number: u64,
	pub bids: Vec<LevelSummary>,
	pub asks: Vec<LevelSummary>,
}

/// Advisory best-price push
#[derive(Debug, Clone)]
pub struct BestPriceUpdate {
	pub symbol: String,
	pub best_bid: Option<u64>,
	pub best_ask: Option<u64>,
	pub engine_addr: String,
}

/// One side of the global best-price view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
	pub price: u64,
	pub engine_addr: String,
}

/// Global best bid and ask for one symbol
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalBbo {
	pub bid: Option<Quote>,
	pub ask: Option<Quote>,
}

/// A peer's best prices for one symbol, derived from its snapshots
#[derive(Debug, Clone, Copy, Default)]
struct PeerQuote {
	bid: Option<u64>,
	ask: Option<u64>,
}

/// Mutable view state, all under one mutex
#[derive(Default)]
struct SyncState {
	/// Order ids this engine has forwarded, for reroute dedup
	known_orders: HashSet<String>,
	/// Highest snapshot sequence seen per (peer addr, symbol)
	peer_seq: HashMap<(String, String), u64>,
	/// Peer addr -> symbol -> best prices from its last snapshot
	peer_quotes: HashMap<String, HashMap<String, PeerQuote>>,
	/// Symbol -> global best view
	bbo: HashMap<String, GlobalBbo>,
}

/// Order book synchronizer for one engine
pub struct Synchronizer {
	engine_id: String,
	addr: String,
	peers: HashMap<String, Arc<dyn PeerLink>>,
	sequence: AtomicU64,
	update_tx: Sender<BookUpdate>,
	update_rx: Receiver<BookUpdate>,
	state: Mutex<SyncState>,
	books: OnceLock<Arc<dyn BookSource>>,
	running: AtomicBool,
	gossip_interval: Duration,
}

impl Synchronizer {
	pub fn new(
		engine_id: impl Into<String>,
		addr: impl Into<String>,
		peers: Vec<(String, Arc<dyn PeerLink>)>,
		gossip_interval: Duration,
	) -> Self {
		let (update_tx, update_rx) = bounded(UPDATE_QUEUE_CAPACITY);
		Self {
			engine_id: engine_id.into(),
			addr: addr.into(),
			peers: peers.into_iter().collect(),
			sequence: AtomicU64::new(0),
			update_tx,
			update_rx,
			state: Mutex::new(SyncState::default()),
			books: OnceLock::new(),
			running: AtomicBool::new(false),
			gossip_interval,
		}
	}

	/// Wire the engine-provided book capability.
	///
	/// Must be called once before the gossip loop starts.
	pub fn attach_books(&self, books: Arc<dyn BookSource>) {
		if self.books.set(books).is_err() {
			warn!(target: "sync", "book source already attached, ignoring");
		}
	}

	/// Engine-local monotonic snapshot sequence number
	pub fn current_seq(&self) -> u64 {
		self.sequence.load(Ordering::SeqCst)
	}

	/// Spawn the gossip loop
	pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
		self.running.store(true, Ordering::SeqCst);
		let sync = Arc::clone(self);
		tokio::spawn(async move {
			info!(target: "sync", engine_id = %sync.engine_id, "synchronizer started");
			while sync.running.load(Ordering::SeqCst) {
				sync.flush_updates().await;
				tokio::time::sleep(sync.gossip_interval).await;
				sync.pull_peers().await;
			}
			info!(target: "sync", engine_id = %sync.engine_id, "synchronizer stopped");
		})
	}

	/// Signal the gossip loop to finish its current cycle and exit
	pub fn stop(&self) {
		self.running.store(false, Ordering::SeqCst);
	}

	/// Broadcast every queued snapshot to all peers, in parallel
	pub async fn flush_updates(&self) {
		while let Ok(update) = self.update_rx.try_recv() {
			self.broadcast(update).await;
		}
	}

	async fn broadcast(&self, update: BookUpdate) {
		let pushes = self.peers.iter().map(|(peer_addr, link)| {
			let update = update.clone();
			let peer_addr = peer_addr.clone();
			let link = Arc::clone(link);
			async move { (peer_addr, link.push_book(update).await) }
		});
		for (peer_addr, result) in join_all(pushes).await {
			if let Err(e) = result {
				// Not retried: the snapshot is idempotent and the next
				// publish supersedes it.
				warn!(target: "sync", peer = %peer_addr, error = %e, "book broadcast failed");
			}
		}

		// Advisory fast path: push local best prices alongside.
		let Some(books) = self.books.get() else { return };
		let (best_bid, best_ask) = books.local_best(&update.symbol);
		let best = BestPriceUpdate {
			symbol: update.symbol.clone(),
			best_bid,
			best_ask,
			engine_addr: self.addr.clone(),
		};
		let pushes = self.peers.iter().map(|(peer_addr, link)| {
			let best = best.clone();
			let peer_addr = peer_addr.clone();
			let link = Arc::clone(link);
			async move { (peer_addr, link.push_best_price(best).await) }
		});
		for (peer_addr, result) in join_all(pushes).await {
			if let Err(e) = result {
				debug!(target: "sync", peer = %peer_addr, error = %e, "best-price push failed");
			}
		}
	}

	/// Pull books from every peer and fold fresh snapshots into the view
	pub async fn pull_peers(&self) {
		let Some(books) = self.books.get() else { return };

		let mut symbols = books.symbols();
		{
			let state = self.state.lock().expect("sync state mutex poisoned");
			for symbol in state.bbo.keys() {
				if !symbols.contains(symbol) {
					symbols.push(symbol.clone());
				}
			}
		}

		for symbol in &symbols {
			let pulls = self.peers.iter().map(|(peer_addr, link)| {
				let peer_addr = peer_addr.clone();
				let link = Arc::clone(link);
				let symbol = symbol.clone();
				async move { (peer_addr, link.pull_book(&symbol).await) }
			});
			for (peer_addr, result) in join_all(pulls).await {
				match result {
					Ok(pull) => {
						self.apply_peer_update(
							&peer_addr,
							symbol,
							pull.sequence_number,
							&pull.bids,
							&pull.asks,
						);
					}
					Err(e) => {
						// The stale contribution stays in place; the view
						// degrades toward local-best as entries age out.
						warn!(target: "sync", peer = %peer_addr, symbol = %symbol, error = %e, "peer snapshot pull failed");
					}
				}
			}
		}
	}

	/// Fold one peer snapshot into the view
	///
	/// Snapshots are idempotent and tagged with the sender's monotonic
	/// sequence number; anything at or below the last applied sequence
	/// for that peer and symbol is dropped. Returns whether the snapshot
	/// was applied.
	pub fn apply_peer_update(
		&self,
		peer_addr: &str,
		symbol: &str,
		sequence_number: u64,
		bids: &[LevelSummary],
		asks: &[LevelSummary],
	) -> bool {
		{
			let mut state = self.state.lock().expect("sync state mutex poisoned");
			let key = (peer_addr.to_string(), symbol.to_string());
			let last = state.peer_seq.entry(key).or_insert(0);
			if sequence_number <= *last {
				debug!(
					target: "sync",
					peer = %peer_addr,
					symbol = %symbol,
					seq = sequence_number,
					last = *last,
					"stale snapshot dropped"
				);
				return false;
			}
			*last = sequence_number;

			let quote = PeerQuote {
				bid: bids.iter().filter(|l| l.quantity > 0).map(|l| l.price).max(),
				ask: asks.iter().filter(|l| l.quantity > 0).map(|l| l.price).min(),
			};
			state
				.peer_quotes
				.entry(peer_addr.to_string())
				.or_default()
				.insert(symbol.to_string(), quote);
		}
		self.recompute_symbol(symbol);
		true
	}

	/// Recompute the global view for one symbol from the local book and
	/// every peer's last snapshot
	fn recompute_symbol(&self, symbol: &str) {
		let Some(books) = self.books.get() else { return };
		let (local_bid, local_ask) = books.local_best(symbol);

		let mut state = self.state.lock().expect("sync state mutex poisoned");

		let mut bid = local_bid.map(|price| Quote {
			price,
			engine_addr: self.addr.clone(),
		});
		let mut ask = local_ask.map(|price| Quote {
			price,
			engine_addr: self.addr.clone(),
		});

		for (peer_addr, quotes) in &state.peer_quotes {
			let Some(quote) = quotes.get(symbol) else { continue };
			if let Some(price) = quote.bid {
				if bid.as_ref().is_none_or(|current| price > current.price) {
					bid = Some(Quote {
						price,
						engine_addr: peer_addr.clone(),
					});
				}
			}
			if let Some(price) = quote.ask {
				if ask.as_ref().is_none_or(|current| price < current.price) {
					ask = Some(Quote {
						price,
						engine_addr: peer_addr.clone(),
					});
				}
			}
		}

		state.bbo.insert(symbol.to_string(), GlobalBbo { bid, ask });
	}

	/// Merge a pushed best-price view, keeping the price-better entry
	pub fn merge_best_price(&self, update: BestPriceUpdate) {
		let mut state = self.state.lock().expect("sync state mutex poisoned");
		let entry = state.bbo.entry(update.symbol.clone()).or_default();

		if let Some(price) = update.best_bid {
			if entry.bid.as_ref().is_none_or(|current| price > current.price) {
				entry.bid = Some(Quote {
					price,
					engine_addr: update.engine_addr.clone(),
				});
			}
		}
		if let Some(price) = update.best_ask {
			if entry.ask.as_ref().is_none_or(|current| price < current.price) {
				entry.ask = Some(Quote {
					price,
					engine_addr: update.engine_addr.clone(),
				});
			}
		}
	}

	/// Current global view for a symbol
	pub fn global_bbo(&self, symbol: &str) -> Option<GlobalBbo> {
		let state = self.state.lock().expect("sync state mutex poisoned");
		state.bbo.get(symbol).cloned()
	}
}

#[tonic::async_trait]
impl PeerRouter for Synchronizer {
	/// A peer wins only when its advertised price improves on both the
	/// order's limit and this engine's local best; empty levels never
	/// reach the view (filtered when snapshots are folded in).
	fn lookup_bbo_engine(&self, order: &Order) -> String {
		let Some(books) = self.books.get() else {
			return self.addr.clone();
		};
		let (local_bid, local_ask) = books.local_best(&order.symbol);

		let state = self.state.lock().expect("sync state mutex poisoned");
		let Some(bbo) = state.bbo.get(&order.symbol) else {
			return self.addr.clone();
		};

		match order.side {
			Side::Buy => {
				if let Some(ask) = &bbo.ask {
					if ask.engine_addr != self.addr
						&& ask.price < order.price
						&& ask.price < local_ask.unwrap_or(u64::MAX)
					{
						return ask.engine_addr.clone();
					}
				}
			}
			Side::Sell => {
				if let Some(bid) = &bbo.bid {
					if bid.engine_addr != self.addr
						&& bid.price > order.price
						&& bid.price > local_bid.unwrap_or(0)
					{
						return bid.engine_addr.clone();
					}
				}
			}
		}
		self.addr.clone()
	}

	async fn route_order(&self, order: Order, dst_addr: &str) -> Result<(), SyncError> {
		{
			let mut state = self.state.lock().expect("sync state mutex poisoned");
			if !state.known_orders.insert(order.order_id.clone()) {
				return Err(SyncError::AlreadyRouted(order.order_id.clone()));
			}
		}

		let Some(link) = self.peers.get(dst_addr) else {
			self.forget_routed(&order.order_id);
			return Err(SyncError::UnknownPeer(dst_addr.to_string()));
		};

		let order_id = order.order_id.clone();
		let result = link.submit_order(order).await;
		if result.is_err() {
			// Let the client retry the same order id after a transient
			// peer failure.
			self.forget_routed(&order_id);
		}
		result
	}

	async fn route_fill(
		&self,
		fill: Fill,
		client_id: &str,
		dst_addr: &str,
	) -> Result<(), SyncError> {
		let link = self
			.peers
			.get(dst_addr)
			.ok_or_else(|| SyncError::UnknownPeer(dst_addr.to_string()))?;
		link.deliver_fill(client_id, fill).await
	}

	fn publish_update(&self, symbol: &str, bids: Vec<LevelSummary>, asks: Vec<LevelSummary>) {
		// Only levels with volume count toward best prices.
		let bids: Vec<LevelSummary> = bids.into_iter().filter(|l| l.quantity > 0).collect();
		let asks: Vec<LevelSummary> = asks.into_iter().filter(|l| l.quantity > 0).collect();

		let sequence_number = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
		let update = BookUpdate {
			symbol: symbol.to_string(),
			sequence_number,
			engine_id: self.engine_id.clone(),
			engine_addr: self.addr.clone(),
			bids,
			asks,
		};

		match self.update_tx.try_send(update) {
			Ok(()) => {}
			Err(TrySendError::Full(update)) => {
				warn!(
					target: "sync",
					symbol = %update.symbol,
					seq = update.sequence_number,
					"update queue full, dropping snapshot"
				);
			}
			Err(TrySendError::Disconnected(_)) => {
				warn!(target: "sync", "update queue disconnected");
			}
		}

		self.recompute_symbol(symbol);
	}
}

impl Synchronizer {
	fn forget_routed(&self, order_id: &str) {
		let mut state = self.state.lock().expect("sync state mutex poisoned");
		state.known_orders.remove(order_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use lattice_sdk::types::price_to_ticks;

	/// Book source stub with fixed local bests
	struct FixedBooks {
		bid: Option<u64>,
		ask: Option<u64>,
	}

	impl BookSource for FixedBooks {
		fn local_best(&self, _symbol: &str) -> (Option<u64>, Option<u64>) {
			(self.bid, self.ask)
		}

		fn symbols(&self) -> Vec<String> {
			vec!["X".to_string()]
		}

		fn snapshot(&self, symbol: &str) -> crate::types::BookSummary {
			crate::types::BookSummary {
				symbol: symbol.to_string(),
				..Default::default()
			}
		}
	}

	const SELF_ADDR: &str = "127.0.0.1:6001";
	const PEER_ADDR: &str = "127.0.0.1:6002";

	fn synchronizer(local_bid: Option<f64>, local_ask: Option<f64>) -> Synchronizer {
		let sync = Synchronizer::new(
			"engine_0",
			SELF_ADDR,
			Vec::new(),
			Duration::from_millis(100),
		);
		sync.attach_books(Arc::new(FixedBooks {
			bid: local_bid.map(|p| price_to_ticks(p).unwrap()),
			ask: local_ask.map(|p| price_to_ticks(p).unwrap()),
		}));
		sync
	}

	fn level(price: f64, quantity: u64) -> LevelSummary {
		LevelSummary {
			price: price_to_ticks(price).unwrap(),
			quantity,
			order_count: 1,
		}
	}

	fn order(side: Side, price: f64) -> Order {
		Order {
			order_id: "o1".to_string(),
			client_id: "alice".to_string(),
			origin_addr: SELF_ADDR.to_string(),
			symbol: "X".to_string(),
			side,
			price: price_to_ticks(price).unwrap(),
			quantity: 1,
			remaining_quantity: 1,
			status: lattice_sdk::types::OrderStatus::New,
			timestamp_ns: 0,
		}
	}

	#[test]
	fn test_apply_update_is_idempotent() {
		let sync = synchronizer(None, None);

		let applied = sync.apply_peer_update(PEER_ADDR, "X", 3, &[level(99.0, 5)], &[]);
		assert!(applied);
		let view = sync.global_bbo("X").unwrap();

		// Same snapshot again changes nothing
		let reapplied = sync.apply_peer_update(PEER_ADDR, "X", 3, &[level(99.0, 5)], &[]);
		assert!(!reapplied);
		assert_eq!(sync.global_bbo("X").unwrap(), view);
	}

	#[test]
	fn test_stale_snapshot_dropped() {
		let sync = synchronizer(None, None);

		sync.apply_peer_update(PEER_ADDR, "X", 5, &[level(99.0, 5)], &[]);
		let applied = sync.apply_peer_update(PEER_ADDR, "X", 4, &[level(101.0, 5)], &[]);
		assert!(!applied);

		let view = sync.global_bbo("X").unwrap();
		assert_eq!(view.bid.unwrap().price, price_to_ticks(99.0).unwrap());
	}

	#[test]
	fn test_zero_volume_levels_ignored() {
		let sync = synchronizer(None, None);

		sync.apply_peer_update(PEER_ADDR, "X", 1, &[level(99.0, 0)], &[level(100.0, 0)]);
		let view = sync.global_bbo("X").unwrap();
		assert_eq!(view.bid, None);
		assert_eq!(view.ask, None);
	}

	#[test]
	fn test_lookup_unknown_symbol_is_local() {
		let sync = synchronizer(None, None);
		assert_eq!(sync.lookup_bbo_engine(&order(Side::Buy, 100.0)), SELF_ADDR);
	}

	#[test]
	fn test_lookup_routes_buy_to_strictly_better_ask() {
		// Peer ask 99 beats both the 100 limit and the local 101 ask
		let sync = synchronizer(None, Some(101.0));
		sync.apply_peer_update(PEER_ADDR, "X", 1, &[], &[level(99.0, 5)]);

		assert_eq!(sync.lookup_bbo_engine(&order(Side::Buy, 100.0)), PEER_ADDR);
	}

	#[test]
	fn test_lookup_requires_improvement_on_limit() {
		// Peer ask equals the limit: not strictly better
		let sync = synchronizer(None, None);
		sync.apply_peer_update(PEER_ADDR, "X", 1, &[], &[level(100.0, 5)]);

		assert_eq!(sync.lookup_bbo_engine(&order(Side::Buy, 100.0)), SELF_ADDR);
	}

	#[test]
	fn test_lookup_requires_improvement_on_local_best() {
		// Local ask 99 already beats the peer's 99.5
		let sync = synchronizer(None, Some(99.0));
		sync.apply_peer_update(PEER_ADDR, "X", 1, &[], &[level(99.5, 5)]);

		assert_eq!(sync.lookup_bbo_engine(&order(Side::Buy, 100.0)), SELF_ADDR);
	}

	#[test]
	fn test_lookup_routes_sell_to_better_bid() {
		let sync = synchronizer(Some(99.0), None);
		sync.apply_peer_update(PEER_ADDR, "X", 1, &[level(101.0, 5)], &[]);

		assert_eq!(sync.lookup_bbo_engine(&order(Side::Sell, 100.0)), PEER_ADDR);
	}

	#[test]
	fn test_merge_best_price_keeps_better_entry() {
		let sync = synchronizer(None, None);
		sync.merge_best_price(BestPriceUpdate {
			symbol: "X".to_string(),
			best_bid: price_to_ticks(99.0),
			best_ask: price_to_ticks(101.0),
			engine_addr: PEER_ADDR.to_string(),
		});
		sync.merge_best_price(BestPriceUpdate {
			symbol: "X".to_string(),
			best_bid: price_to_ticks(98.0),
			best_ask: price_to_ticks(102.0),
			engine_addr: "127.0.0.1:6003".to_string(),
		});

		let view = sync.global_bbo("X").unwrap();
		assert_eq!(view.bid.unwrap().price, price_to_ticks(99.0).unwrap());
		assert_eq!(view.ask.unwrap().price, price_to_ticks(101.0).unwrap());
	}

	#[tokio::test]
	async fn test_route_order_is_at_most_once() {
		let sync = synchronizer(None, None);

		// No link for the address: the attempt fails but the id was
		// released for retry.
		let result = sync.route_order(order(Side::Buy, 100.0), PEER_ADDR).await;
		assert!(matches!(result, Err(SyncError::UnknownPeer(_))));
		let result = sync.route_order(order(Side::Buy, 100.0), PEER_ADDR).await;
		assert!(matches!(result, Err(SyncError::UnknownPeer(_))));
	}

	#[test]
	fn test_publish_update_advances_sequence_and_local_view() {
		let sync = synchronizer(Some(99.0), Some(101.0));
		assert_eq!(sync.current_seq(), 0);

		sync.publish_update("X", vec![level(99.0, 5)], vec![level(101.0, 5)]);
		assert_eq!(sync.current_seq(), 1);

		let view = sync.global_bbo("X").unwrap();
		assert_eq!(view.bid.as_ref().unwrap().engine_addr, SELF_ADDR);
		assert_eq!(view.bid.unwrap().price, price_to_ticks(99.0).unwrap());
		assert_eq!(view.ask.unwrap().price, price_to_ticks(101.0).unwrap());
	}
}
