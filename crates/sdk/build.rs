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

use anyhow::{Context, Result};

fn main() -> Result<()> {
	unsafe { std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?) };

	// The SDK only talks to the cluster; no server stubs are generated.
	tonic_prost_build::configure()
		.build_server(false)
		.build_client(true)
		.compile_protos(
			&[
				"../engine/proto/matching.proto",
				"../exchange/proto/exchange.proto",
			],
			&["../engine/proto/", "../exchange/proto/"],
		)
		.context("Failed to compile lattice protos")?;
	Ok(())
}
