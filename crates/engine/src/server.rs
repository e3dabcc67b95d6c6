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

//! gRPC server for a matching engine node
//!
//! Serves both the client-facing order flow and the peer-facing gossip
//! and routing RPCs, and owns the wire <-> domain conversions shared
//! with the peer client.

use std::sync::Arc;

use lattice_sdk::types::{Fill, OrderStatus, Side, price_to_ticks, ticks_to_price};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::debug;

use crate::engine::{BookSource, MatchEngine};
use crate::proto;
use crate::proto::matching_service_server::{MatchingService, MatchingServiceServer};
use crate::proto::{
	BookRequest, BookSnapshot, BookUpdate as WireBookUpdate, CancelReply, CancelRequest,
	CancelStatus, ClientRegistration, FillMessage, FillRequest, OrderReply, OrderRequest,
	OrderSide as ProtoOrderSide, RegistrationReply, RegistrationStatus, RoutedFill, SubmitStatus,
	SyncAck,
};
use crate::sync::{BestPriceUpdate, Synchronizer};
use crate::types::{EngineError, LevelSummary, Order, SubmitOutcome};

pub(crate) fn order_from_wire(req: OrderRequest) -> Result<Order, String> {
	let side = match req.side() {
		ProtoOrderSide::Buy => Side::Buy,
		ProtoOrderSide::Sell => Side::Sell,
	};
	let price = price_to_ticks(req.price)
		.ok_or_else(|| format!("INVALID_ORDER: bad price {}", req.price))?;

	Ok(Order {
		order_id: req.order_id,
		client_id: req.client_id,
		origin_addr: req.origin_addr,
		symbol: req.symbol,
		side,
		price,
		quantity: req.quantity,
		remaining_quantity: req.remaining_quantity,
		status: OrderStatus::New,
		timestamp_ns: req.timestamp_ns,
	})
}

pub(crate) fn order_to_wire(order: &Order) -> OrderRequest {
	OrderRequest {
		order_id: order.order_id.clone(),
		symbol: order.symbol.clone(),
		side: match order.side {
			Side::Buy => ProtoOrderSide::Buy as i32,
			Side::Sell => ProtoOrderSide::Sell as i32,
		},
		price: ticks_to_price(order.price),
		quantity: order.quantity,
		remaining_quantity: order.remaining_quantity,
		client_id: order.client_id.clone(),
		origin_addr: order.origin_addr.clone(),
		timestamp_ns: order.timestamp_ns,
	}
}

pub(crate) fn fill_to_wire(fill: &Fill) -> FillMessage {
	FillMessage {
		fill_id: fill.fill_id.clone(),
		taker_order_id: fill.taker_order_id.clone(),
		maker_order_id: fill.maker_order_id.clone(),
		symbol: fill.symbol.clone(),
		price: ticks_to_price(fill.price),
		quantity: fill.quantity,
		timestamp_ns: fill.timestamp_ns,
		buyer_id: fill.buyer_id.clone(),
		seller_id: fill.seller_id.clone(),
		destination_addr: fill.destination_addr.clone(),
	}
}

pub(crate) fn fill_from_wire(msg: FillMessage) -> Result<Fill, String> {
	let price =
		price_to_ticks(msg.price).ok_or_else(|| format!("bad fill price {}", msg.price))?;
	Ok(Fill {
		fill_id: msg.fill_id,
		taker_order_id: msg.taker_order_id,
		maker_order_id: msg.maker_order_id,
		symbol: msg.symbol,
		price,
		quantity: msg.quantity,
		timestamp_ns: msg.timestamp_ns,
		buyer_id: msg.buyer_id,
		seller_id: msg.seller_id,
		destination_addr: msg.destination_addr,
	})
}

pub(crate) fn levels_to_wire(levels: &[LevelSummary]) -> Vec<proto::PriceLevel> {
	levels
		.iter()
		.map(|l| proto::PriceLevel {
			price: ticks_to_price(l.price),
			quantity: l.quantity,
			order_count: l.order_count,
		})
		.collect()
}

pub(crate) fn levels_from_wire(levels: &[proto::PriceLevel]) -> Vec<LevelSummary> {
	levels
		.iter()
		.filter_map(|l| {
			let price = price_to_ticks(l.price)?;
			Some(LevelSummary {
				price,
				quantity: l.quantity,
				order_count: l.order_count,
			})
		})
		.collect()
}

/// Matching service implementation
pub struct MatchingApi {
	engine: Arc<MatchEngine>,
	sync: Arc<Synchronizer>,
}

impl MatchingApi {
	pub fn new(engine: Arc<MatchEngine>, sync: Arc<Synchronizer>) -> Self {
		Self { engine, sync }
	}
}

#[tonic::async_trait]
impl MatchingService for MatchingApi {
	async fn register_client(
		&self,
		request: Request<ClientRegistration>,
	) -> Result<Response<RegistrationReply>, Status> {
		let req = request.into_inner();

		let reply = match self.engine.register_client(&req.client_id, &req.secret) {
			Ok(()) => RegistrationReply {
				status: RegistrationStatus::Successful as i32,
				match_engine_address: self.engine.addr().to_string(),
			},
			Err(_) => RegistrationReply {
				status: RegistrationStatus::Rejected as i32,
				match_engine_address: String::new(),
			},
		};
		Ok(Response::new(reply))
	}

	async fn submit_order(
		&self,
		request: Request<OrderRequest>,
	) -> Result<Response<OrderReply>, Status> {
		let req = request.into_inner();
		let order_id = req.order_id.clone();

		let order = match order_from_wire(req) {
			Ok(order) => order,
			Err(message) => {
				return Ok(Response::new(OrderReply {
					order_id,
					status: SubmitStatus::Error as i32,
					error_message: message,
				}));
			}
		};

		let reply = match self.engine.submit_order(order).await {
			Ok(SubmitOutcome::Executed { order_id, .. })
			| Ok(SubmitOutcome::Routed { order_id, .. }) => OrderReply {
				order_id,
				status: SubmitStatus::Success as i32,
				error_message: String::new(),
			},
			Ok(SubmitOutcome::Duplicate { order_id, .. }) => OrderReply {
				order_id,
				status: SubmitStatus::Duplicate as i32,
				error_message: String::new(),
			},
			Err(e @ EngineError::RouteFailed(_)) => OrderReply {
				order_id,
				status: SubmitStatus::Error as i32,
				error_message: format!("ROUTE_FAILED: {}", e),
			},
			Err(e) => OrderReply {
				order_id,
				status: SubmitStatus::Error as i32,
				error_message: e.to_string(),
			},
		};
		Ok(Response::new(reply))
	}

	async fn cancel_order(
		&self,
		request: Request<CancelRequest>,
	) -> Result<Response<CancelReply>, Status> {
		let req = request.into_inner();

		let status = match self.engine.cancel_order(&req.order_id) {
			Ok(()) => CancelStatus::Success,
			Err(EngineError::OrderNotFound(_)) => CancelStatus::NotFound,
			Err(_) => CancelStatus::Error,
		};
		Ok(Response::new(CancelReply {
			order_id: req.order_id,
			status: status as i32,
		}))
	}

	type GetFillsStream = ReceiverStream<Result<FillMessage, Status>>;

	async fn get_fills(
		&self,
		request: Request<FillRequest>,
	) -> Result<Response<Self::GetFillsStream>, Status> {
		let client_id = request.into_inner().client_id;
		let queue = self.engine.fill_queue(&client_id).ok_or_else(|| {
			Status::not_found(format!("client {} is not registered here", client_id))
		})?;

		debug!(target: "server", client_id = %client_id, "fill stream opened");

		let (tx, rx) = mpsc::channel(64);
		tokio::spawn(async move {
			loop {
				tokio::select! {
					fill = queue.pop() => {
						let message = fill_to_wire(&fill);
						if tx.send(Ok(message)).await.is_err() {
							// Stream consumer went away between pop and
							// send; keep the fill for the next stream.
							queue.push_front(fill);
							break;
						}
					}
					_ = tx.closed() => break,
				}
			}
		});

		Ok(Response::new(ReceiverStream::new(rx)))
	}

	async fn get_order_book(
		&self,
		request: Request<BookRequest>,
	) -> Result<Response<BookSnapshot>, Status> {
		let symbol = request.into_inner().symbol;
		let summary = self.engine.snapshot(&symbol);

		Ok(Response::new(BookSnapshot {
			symbol,
			sequence_number: self.sync.current_seq(),
			bids: levels_to_wire(&summary.bids),
			asks: levels_to_wire(&summary.asks),
		}))
	}

	async fn sync_order_book(
		&self,
		request: Request<WireBookUpdate>,
	) -> Result<Response<SyncAck>, Status> {
		let update = request.into_inner();

		self.sync.apply_peer_update(
			&update.engine_addr,
			&update.symbol,
			update.sequence_number,
			&levels_from_wire(&update.bids),
			&levels_from_wire(&update.asks),
		);
		Ok(Response::new(SyncAck {}))
	}

	async fn sync_global_best_price(
		&self,
		request: Request<proto::BestPriceUpdate>,
	) -> Result<Response<SyncAck>, Status> {
		let update = request.into_inner();

		self.sync.merge_best_price(BestPriceUpdate {
			symbol: update.symbol,
			best_bid: update.best_bid.and_then(price_to_ticks),
			best_ask: update.best_ask.and_then(price_to_ticks),
			engine_addr: update.engine_addr,
		});
		Ok(Response::new(SyncAck {}))
	}

	async fn deliver_routed_fill(
		&self,
		request: Request<RoutedFill>,
	) -> Result<Response<SyncAck>, Status> {
		let routed = request.into_inner();
		let message = routed
			.fill
			.ok_or_else(|| Status::invalid_argument("missing fill"))?;
		let fill = fill_from_wire(message).map_err(Status::invalid_argument)?;

		self.engine.deliver_routed_fill(&routed.client_id, fill);
		Ok(Response::new(SyncAck {}))
	}
}

/// Create the matching service server for one engine node
pub fn create_server(
	engine: Arc<MatchEngine>,
	sync: Arc<Synchronizer>,
) -> MatchingServiceServer<MatchingApi> {
	MatchingServiceServer::new(MatchingApi::new(engine, sync))
}
