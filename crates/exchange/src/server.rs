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

//! gRPC server for the exchange bootstrap node

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::assigner::Assigner;
use crate::auth::authenticate;

// Include generated gRPC code
pub mod proto {
	tonic::include_proto!("lattice");
}

use proto::exchange_service_server::{ExchangeService, ExchangeServiceServer};
use proto::{ClientRegistration, RegistrationReply, RegistrationStatus};

/// Exchange service implementation
pub struct ExchangeApi {
	assigner: Arc<Assigner>,
	secret: String,
}

impl ExchangeApi {
	pub fn new(assigner: Arc<Assigner>, secret: String) -> Self {
		Self { assigner, secret }
	}
}

#[tonic::async_trait]
impl ExchangeService for ExchangeApi {
	async fn assign_client(
		&self,
		request: Request<ClientRegistration>,
	) -> Result<Response<RegistrationReply>, Status> {
		let req = request.into_inner();

		if let Err(e) = authenticate(&req.client_id, &req.secret, &self.secret) {
			warn!(target: "exchange", client_id = %req.client_id, error = %e, "client rejected");
			return Ok(Response::new(RegistrationReply {
				status: RegistrationStatus::Rejected as i32,
				match_engine_address: String::new(),
			}));
		}

		let engine = self.assigner.assign(req.x, req.y);
		info!(
			target: "exchange",
			client_id = %req.client_id,
			engine_id = %engine.id,
			engine_addr = %engine.address,
			"client assigned"
		);

		Ok(Response::new(RegistrationReply {
			status: RegistrationStatus::Successful as i32,
			match_engine_address: engine.address.clone(),
		}))
	}
}

/// Create the exchange service server
pub fn create_server(assigner: Arc<Assigner>, secret: String) -> ExchangeServiceServer<ExchangeApi> {
	ExchangeServiceServer::new(ExchangeApi::new(assigner, secret))
}
