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

//! Live in-memory mirror of constant-product (V2) and concentrated-liquidity
//! (V3) AMM pool reserve state on an EVM-compatible chain.
//!
//! Given a set of token addresses and pool-factory descriptors, the crate
//! deterministically enumerates candidate pools, fetches their current state
//! from the chain in batched multicall aggregations, and keeps that state
//! synchronized with the chain head by re-fetching on every new block.
//!
//! # Scope
//!
//! The RPC transport and ABI encode/decode primitives are provided by
//! [`alloy`]; this crate supplies the three pieces that sit on top of them:
//! a gas-budgeted batched call aggregator, a concurrency-safe pool-state
//! cache, and a reconnecting block subscription with per-block cancellation.
//!
//! Trade simulation, swap routing, price quoting, transaction signing and
//! historical replay are explicitly out of scope.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]

pub mod aggregator;
pub mod cache;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod pool;
pub mod subscription;
