// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Runtime configuration. Loading configuration from files or environment is
//! out of scope; callers construct this struct directly.

use std::time::Duration;

use alloy::primitives::Address;

/// Runtime configuration for the aggregator and subscription.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Address of the deployed Multicall3-compatible aggregator contract.
    pub multicall_contract_address: Address,
    /// Gas estimate per inner call, used by the aggregator's chunking pass.
    pub per_call_gas_cost: u64,
    /// Upper gas bound per outer multicall chunk.
    pub max_gas_per_chunk: u64,
    /// Per-attempt timeout for establishing the block subscription.
    pub subscribe_timeout: Duration,
    /// Cap on the subscription's exponential backoff.
    pub max_reconnect_timeout: Duration,
    /// Maximum number of reconnection attempts before the subscription gives up.
    pub max_retries: u32,
    /// URL of the RPC transport (a websocket endpoint is required for subscriptions).
    pub rpc_endpoint: String,
}

/// Standard Multicall3 address, identical across every EVM chain it's deployed on.
pub const MULTICALL3_ADDRESS: Address = alloy::primitives::address!("cA11bde05977b3631167028862bE2a173976CA11");

impl RuntimeConfig {
    /// Creates a new [`RuntimeConfig`] using the standard Multicall3 deployment address
    /// and the default reconnect cap (5s) and retry budget (5) from the reference design.
    #[must_use]
    pub fn new(rpc_endpoint: String, per_call_gas_cost: u64, max_gas_per_chunk: u64) -> Self {
        Self {
            multicall_contract_address: MULTICALL3_ADDRESS,
            per_call_gas_cost,
            max_gas_per_chunk,
            subscribe_timeout: Duration::from_secs(10),
            max_reconnect_timeout: Duration::from_secs(5),
            max_retries: 5,
            rpc_endpoint,
        }
    }
}
