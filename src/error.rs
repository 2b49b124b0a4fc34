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

//! Error taxonomy shared across the aggregator, cache and subscription.

use alloy::primitives::Address;
use thiserror::Error;

/// Errors raised by the batched call aggregator.
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// The outer transport call failed (node rejected the call, connection error, etc).
    #[error("transport call failed: {0}")]
    Transport(String),
    /// The decoded `Result[]` length did not match the number of calls submitted in the chunk.
    #[error("chunk returned {got} results, expected {expected}")]
    ChunkLengthMismatch { expected: usize, got: usize },
    /// The outer multicall return data could not be decoded as `Result[]`.
    #[error("failed to decode aggregate3 return data: {0}")]
    DecodeShape(String),
    /// The caller's cancellation token fired before the aggregate call completed.
    #[error("aggregate call cancelled")]
    Cancelled,
}

/// Errors raised by cache lookups, mutation and synchronization.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Aggregator(#[from] AggregatorError),
    /// A structural mismatch in an otherwise-successful return (wrong byte width, etc).
    #[error("decode shape error for pool {pool}: {reason}")]
    DecodeShape { pool: Address, reason: String },
    #[error("token not found: {0}")]
    TokenNotFound(Address),
    #[error("pool not found: {0}")]
    PoolNotFound(Address),
    #[error("invalid token address: {0}")]
    InvalidToken(Address),
    #[error("factory not registered: {0}")]
    InvalidFactory(Address),
    /// `sync*(block)` was called with `block <= last_sync_block`; soft error, safe to ignore.
    #[error("block {requested} already synced (cache is at {last_synced})")]
    BlockAlreadySynced { requested: u64, last_synced: u64 },
    /// The caller's cancellation token fired mid-sync; no cache mutation occurred.
    #[error("sync cancelled")]
    Cancelled,
}

/// Errors raised by the reconnecting block subscription.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// `subscribe()` was called while already in the `Open` state.
    #[error("already subscribed")]
    AlreadySubscribed,
    /// The underlying transport subscribe call failed.
    #[error("transport subscribe failed: {0}")]
    Transport(String),
    /// Reconnection attempts were exhausted; the subscription has transitioned to `Closed`.
    #[error("exhausted {retries} reconnection attempts")]
    MaxRetriesReached { retries: u32 },
}
