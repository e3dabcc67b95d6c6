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

//! Typed gRPC clients for the exchange bootstrap node and the matching
//! engines.

use std::time::Duration;

use thiserror::Error;
use tonic::transport::{Channel, Endpoint};

use crate::types::{Fill, Side, now_ns, price_to_ticks};

// Include generated gRPC code
pub mod proto {
	tonic::include_proto!("lattice");
}

use proto::exchange_service_client::ExchangeServiceClient;
use proto::matching_service_client::MatchingServiceClient;
use proto::{
	CancelRequest, CancelStatus, ClientRegistration, FillMessage, FillRequest, OrderRequest,
	OrderSide as ProtoOrderSide, RegistrationStatus, SubmitStatus,
};

/// Error types for client operations
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("gRPC transport error: {0}")]
	Transport(String),
	#[error("gRPC status error: {0}")]
	Status(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Order rejected: {0}")]
	Rejected(String),
	#[error("Authentication error: {0}")]
	Authentication(String),
}

async fn dial(addr: &str) -> Result<Channel, ClientError> {
	Endpoint::from_shared(format!("http://{}", addr))
		.map_err(|e| ClientError::Transport(format!("Invalid endpoint: {}", e)))?
		.timeout(Duration::from_secs(15))
		.connect()
		.await
		.map_err(|e| ClientError::Transport(format!("Connection failed: {}", e)))
}

/// Client for the exchange bootstrap node
pub struct ExchangeClient {
	client: ExchangeServiceClient<Channel>,
}

impl ExchangeClient {
	/// Connect to the exchange at `addr` (`ip:port`)
	pub async fn connect(addr: &str) -> Result<Self, ClientError> {
		Ok(Self {
			client: ExchangeServiceClient::new(dial(addr).await?),
		})
	}

	/// Authenticate and ask for a matching engine assignment.
	///
	/// Returns the address of the engine the client should register with.
	pub async fn assign(
		&mut self,
		client_id: &str,
		secret: &str,
		x: f64,
		y: f64,
	) -> Result<String, ClientError> {
		let request = ClientRegistration {
			client_id: client_id.to_string(),
			secret: secret.to_string(),
			x,
			y,
		};

		let reply = self
			.client
			.assign_client(tonic::Request::new(request))
			.await
			.map_err(|e| ClientError::Status(format!("gRPC error: {}", e)))?
			.into_inner();

		match reply.status() {
			RegistrationStatus::Successful => Ok(reply.match_engine_address),
			RegistrationStatus::Rejected => Err(ClientError::Authentication(format!(
				"assignment rejected for client {}",
				client_id
			))),
		}
	}
}

/// Session with one matching engine
///
/// All orders submitted through the session carry this engine as their
/// origin, and all fills for the client come back on this engine's fill
/// stream regardless of where they executed.
pub struct EngineSession {
	client_id: String,
	engine_addr: String,
	client: MatchingServiceClient<Channel>,
}

impl EngineSession {
	/// Connect to the engine at `addr` and register `client_id` on it
	pub async fn register(addr: &str, client_id: &str, secret: &str) -> Result<Self, ClientError> {
		let mut client = MatchingServiceClient::new(dial(addr).await?);

		let request = ClientRegistration {
			client_id: client_id.to_string(),
			secret: secret.to_string(),
			x: 0.0,
			y: 0.0,
		};
		let reply = client
			.register_client(tonic::Request::new(request))
			.await
			.map_err(|e| ClientError::Status(format!("gRPC error: {}", e)))?
			.into_inner();

		match reply.status() {
			RegistrationStatus::Successful => Ok(Self {
				client_id: client_id.to_string(),
				engine_addr: addr.to_string(),
				client,
			}),
			RegistrationStatus::Rejected => Err(ClientError::Authentication(format!(
				"registration rejected for client {}",
				client_id
			))),
		}
	}

	/// Address of the engine this session is registered with
	pub fn engine_addr(&self) -> &str {
		&self.engine_addr
	}

	/// Submit a limit order; returns the generated order id.
	///
	/// A `DUPLICATE` reply is treated as success: the order was already
	/// accepted by a previous attempt.
	pub async fn submit_limit_order(
		&mut self,
		symbol: &str,
		side: Side,
		price: f64,
		quantity: u64,
	) -> Result<String, ClientError> {
		price_to_ticks(price)
			.ok_or_else(|| ClientError::Rejected(format!("invalid price {}", price)))?;

		let order_id = uuid::Uuid::new_v4().to_string();
		let request = OrderRequest {
			order_id: order_id.clone(),
			symbol: symbol.to_string(),
			side: match side {
				Side::Buy => ProtoOrderSide::Buy as i32,
				Side::Sell => ProtoOrderSide::Sell as i32,
			},
			price,
			quantity,
			remaining_quantity: quantity,
			client_id: self.client_id.clone(),
			origin_addr: self.engine_addr.clone(),
			timestamp_ns: now_ns(),
		};

		let reply = self
			.client
			.submit_order(tonic::Request::new(request))
			.await
			.map_err(|e| ClientError::Status(format!("gRPC error: {}", e)))?
			.into_inner();

		match reply.status() {
			SubmitStatus::Success | SubmitStatus::Duplicate => Ok(reply.order_id),
			SubmitStatus::Error => Err(ClientError::Rejected(reply.error_message)),
		}
	}

	/// Cancel an order; returns `false` when the engine does not know it
	pub async fn cancel_order(&mut self, order_id: &str) -> Result<bool, ClientError> {
		let request = CancelRequest {
			order_id: order_id.to_string(),
		};

		let reply = self
			.client
			.cancel_order(tonic::Request::new(request))
			.await
			.map_err(|e| ClientError::Status(format!("gRPC error: {}", e)))?
			.into_inner();

		match reply.status() {
			CancelStatus::Success => Ok(true),
			CancelStatus::NotFound => Ok(false),
			CancelStatus::Error => Err(ClientError::Status("cancel failed".to_string())),
		}
	}

	/// Open the fill stream for this client
	pub async fn fills(&mut self) -> Result<FillStream, ClientError> {
		let request = FillRequest {
			client_id: self.client_id.clone(),
		};

		let stream = self
			.client
			.get_fills(tonic::Request::new(request))
			.await
			.map_err(|e| ClientError::Status(format!("gRPC error: {}", e)))?
			.into_inner();

		Ok(FillStream { inner: stream })
	}
}

/// Server-streamed fills for one client
pub struct FillStream {
	inner: tonic::Streaming<FillMessage>,
}

impl FillStream {
	/// Next fill on the stream, `None` once the server closes it
	pub async fn next(&mut self) -> Result<Option<Fill>, ClientError> {
		match self.inner.message().await {
			Ok(Some(msg)) => Ok(Some(fill_from_wire(&msg)?)),
			Ok(None) => Ok(None),
			Err(e) => Err(ClientError::Status(format!("gRPC error: {}", e))),
		}
	}
}

fn fill_from_wire(msg: &FillMessage) -> Result<Fill, ClientError> {
	let price = price_to_ticks(msg.price)
		.ok_or_else(|| ClientError::Serialization(format!("bad fill price {}", msg.price)))?;

	Ok(Fill {
		fill_id: msg.fill_id.clone(),
		taker_order_id: msg.taker_order_id.clone(),
		maker_order_id: msg.maker_order_id.clone(),
		symbol: msg.symbol.clone(),
		price,
		quantity: msg.quantity,
		timestamp_ns: msg.timestamp_ns,
		buyer_id: msg.buyer_id.clone(),
		seller_id: msg.seller_id.clone(),
		destination_addr: msg.destination_addr.clone(),
	})
}
