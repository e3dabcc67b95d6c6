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

//! gRPC-backed peer link
//!
//! One lazily connected client per peer engine. Connections are
//! established on first use so the cluster can start in any order; a
//! failed call surfaces as a transient `SyncError` and the next call
//! redials.

use std::time::Duration;

use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};

use crate::proto::matching_service_client::MatchingServiceClient;
use crate::proto::{BookRequest, RoutedFill, SubmitStatus};
use crate::server::{fill_to_wire, levels_from_wire, levels_to_wire, order_to_wire};
use crate::sync::{BestPriceUpdate, BookPull, BookUpdate, PeerLink, SyncError};
use crate::types::Order;
use lattice_sdk::types::{Fill, ticks_to_price};

/// Caller-side timeout for order forwarding
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Caller-side timeout for gossip pulls and pushes
const GOSSIP_TIMEOUT: Duration = Duration::from_secs(1);

/// gRPC peer link to one engine
pub struct GrpcPeerLink {
	endpoint: String,
	client: Mutex<Option<MatchingServiceClient<Channel>>>,
}

impl GrpcPeerLink {
	/// Create a link to the peer at `addr` (`ip:port`)
	pub fn new(addr: &str) -> Self {
		Self {
			endpoint: format!("http://{}", addr),
			client: Mutex::new(None),
		}
	}

	async fn client(&self) -> Result<MatchingServiceClient<Channel>, SyncError> {
		let mut guard = self.client.lock().await;
		if let Some(client) = guard.as_ref() {
			return Ok(client.clone());
		}

		let channel = Endpoint::from_shared(self.endpoint.clone())
			.map_err(|e| SyncError::Transport(format!("invalid endpoint: {}", e)))?
			.timeout(SUBMIT_TIMEOUT)
			.connect()
			.await
			.map_err(|e| SyncError::Transport(format!("connection failed: {}", e)))?;

		let client = MatchingServiceClient::new(channel);
		*guard = Some(client.clone());
		Ok(client)
	}

	/// Drop a cached client after a failed call so the next use redials
	async fn reset(&self) {
		*self.client.lock().await = None;
	}
}

#[tonic::async_trait]
impl PeerLink for GrpcPeerLink {
	async fn submit_order(&self, order: Order) -> Result<(), SyncError> {
		let mut client = self.client().await?;
		let request = tonic::Request::new(order_to_wire(&order));

		let reply = match client.submit_order(request).await {
			Ok(reply) => reply.into_inner(),
			Err(e) => {
				self.reset().await;
				return Err(SyncError::Status(format!("SubmitOrder failed: {}", e)));
			}
		};

		match reply.status() {
			SubmitStatus::Success | SubmitStatus::Duplicate => Ok(()),
			SubmitStatus::Error => Err(SyncError::Status(reply.error_message)),
		}
	}

	async fn deliver_fill(&self, client_id: &str, fill: Fill) -> Result<(), SyncError> {
		let mut client = self.client().await?;
		let mut request = tonic::Request::new(RoutedFill {
			client_id: client_id.to_string(),
			fill: Some(fill_to_wire(&fill)),
		});
		request.set_timeout(GOSSIP_TIMEOUT);

		match client.deliver_routed_fill(request).await {
			Ok(_) => Ok(()),
			Err(e) => {
				self.reset().await;
				Err(SyncError::Status(format!("DeliverRoutedFill failed: {}", e)))
			}
		}
	}

	async fn push_book(&self, update: BookUpdate) -> Result<(), SyncError> {
		let mut client = self.client().await?;
		let mut request = tonic::Request::new(crate::proto::BookUpdate {
			symbol: update.symbol,
			sequence_number: update.sequence_number,
			engine_id: update.engine_id,
			engine_addr: update.engine_addr,
			bids: levels_to_wire(&update.bids),
			asks: levels_to_wire(&update.asks),
		});
		request.set_timeout(GOSSIP_TIMEOUT);

		match client.sync_order_book(request).await {
			Ok(_) => Ok(()),
			Err(e) => {
				self.reset().await;
				Err(SyncError::Status(format!("SyncOrderBook failed: {}", e)))
			}
		}
	}

	async fn pull_book(&self, symbol: &str) -> Result<BookPull, SyncError> {
		let mut client = self.client().await?;
		let mut request = tonic::Request::new(BookRequest {
			symbol: symbol.to_string(),
		});
		request.set_timeout(GOSSIP_TIMEOUT);

		let snapshot = match client.get_order_book(request).await {
			Ok(reply) => reply.into_inner(),
			Err(e) => {
				self.reset().await;
				return Err(SyncError::Status(format!("GetOrderBook failed: {}", e)));
			}
		};

		Ok(BookPull {
			sequence_number: snapshot.sequence_number,
			bids: levels_from_wire(&snapshot.bids),
			asks: levels_from_wire(&snapshot.asks),
		})
	}

	async fn push_best_price(&self, update: BestPriceUpdate) -> Result<(), SyncError> {
		let mut client = self.client().await?;
		let mut request = tonic::Request::new(crate::proto::BestPriceUpdate {
			symbol: update.symbol,
			best_bid: update.best_bid.map(ticks_to_price),
			best_ask: update.best_ask.map(ticks_to_price),
			engine_addr: update.engine_addr,
		});
		request.set_timeout(GOSSIP_TIMEOUT);

		match client.sync_global_best_price(request).await {
			Ok(_) => Ok(()),
			Err(e) => {
				self.reset().await;
				Err(SyncError::Status(format!(
					"SyncGlobalBestPrice failed: {}",
					e
				)))
			}
		}
	}
}
