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

//! Lattice SDK - client library for the matching cluster
//!
//! This crate provides typed gRPC clients for client registration, order
//! submission, cancellation and fill streaming, plus the domain types
//! shared across the cluster (sides, statuses, fills, price ticks).
//!
//! The SDK is designed to be lightweight and embeddable:
//! - No background threads
//! - No runtime initialization
//! - No environment or configuration loading

pub mod auth;
pub mod client;
pub mod types;

pub use auth::verify_shared_secret;
pub use client::{ClientError, EngineSession, ExchangeClient, FillStream};
pub use types::*;
