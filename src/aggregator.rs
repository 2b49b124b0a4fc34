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

//! Batched call aggregation against a Multicall3-compatible contract.
//!
//! Callers submit a flat list of [`PendingCall`]s; [`Aggregator::aggregate`]
//! splits them into gas-budgeted chunks, issues one `aggregate3` call per
//! chunk at a pinned block, and returns one [`CallOutcome`] per input call in
//! the original order. A chunk boundary never reorders or drops a call —
//! every input index appears exactly once in the output.

use alloy::{
    primitives::{Address, Bytes},
    providers::Provider,
    rpc::types::BlockId,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    codec::Multicall3,
    config::RuntimeConfig,
    error::AggregatorError,
};

/// A single inbound call to aggregate.
///
/// `gas_estimate` is never submitted on-chain; it only drives this module's
/// chunk-sizing pass, so a caller that under- or over-estimates it only
/// affects how many chunks are issued, never correctness of the result.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub target: Address,
    pub call_data: Bytes,
    pub gas_estimate: u64,
    /// Mirrors Multicall3's per-call `allowFailure` flag. `false` (the
    /// import-tokens path) means a single reverting call aborts the whole
    /// chunk, surfacing as [`AggregatorError::Transport`]; `true` (the sync
    /// path) means a revert decodes as `None` for that call only.
    pub allow_failure: bool,
}

impl PendingCall {
    #[must_use]
    pub fn new(target: Address, call_data: Bytes, gas_estimate: u64, allow_failure: bool) -> Self {
        Self { target, call_data, gas_estimate, allow_failure }
    }
}

/// Per-call outcome: the raw return bytes on success, or `None` on a failed
/// call (the pool or token does not exist, or the call reverted). Distinct
/// from a transport-level error, which aborts the whole chunk.
pub type CallOutcome = Option<Bytes>;

/// Splits calls into contiguous chunks such that no chunk's running gas
/// estimate exceeds `max_gas_per_chunk`, except a single call whose own
/// estimate already exceeds the budget — that call gets its own
/// single-element chunk rather than being dropped. Deterministic: calls are
/// assigned to chunks in input order and preserve it within each chunk.
fn chunk_ranges(gas_estimates: &[u64], max_gas_per_chunk: u64) -> Vec<(usize, usize)> {
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut running: u64 = 0;

    for (i, &gas) in gas_estimates.iter().enumerate() {
        if i > start && running.saturating_add(gas) > max_gas_per_chunk {
            chunks.push((start, i));
            start = i;
            running = 0;
        }
        running = running.saturating_add(gas);
    }
    if start < gas_estimates.len() {
        chunks.push((start, gas_estimates.len()));
    }
    chunks
}

/// Resolves the spec's `block` convention to a [`BlockId`]: `0` means
/// "latest" rather than genesis, per spec.md §4.1's public contract.
fn resolve_block_id(block: u64) -> BlockId {
    if block == 0 { BlockId::latest() } else { BlockId::from(block) }
}

/// Batched call aggregator bound to a single [`Provider`].
pub struct Aggregator<P> {
    provider: P,
    multicall_address: Address,
    max_gas_per_chunk: u64,
}

impl<P: Provider> Aggregator<P> {
    #[must_use]
    pub fn new(provider: P, config: &RuntimeConfig) -> Self {
        Self {
            provider,
            multicall_address: config.multicall_contract_address,
            max_gas_per_chunk: config.max_gas_per_chunk,
        }
    }

    /// Resolves `block == 0`'s "latest" convention (spec.md §4.1) to a
    /// concrete block number via the transport, for callers that must stamp
    /// a monotonic counter (e.g. [`crate::cache::Cache`]'s `last_sync_block`)
    /// rather than pin an RPC call directly against the `"latest"` tag.
    pub async fn resolve_latest_block(&self) -> Result<u64, AggregatorError> {
        self.provider.get_block_number().await.map_err(|e| AggregatorError::Transport(e.to_string()))
    }

    /// Aggregates `calls` against the pinned `block`, returning one outcome
    /// per input call in input order. Checks `cancel` before issuing each
    /// chunk's call; a cancellation observed between chunks leaves already-
    /// fetched outcomes out of the returned error (the caller discards the
    /// whole batch on `Err`, per cache.rs's snapshot-then-apply contract).
    pub async fn aggregate(
        &self,
        calls: &[PendingCall],
        block: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<CallOutcome>, AggregatorError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let gas_estimates: Vec<u64> = calls.iter().map(|c| c.gas_estimate).collect();
        let ranges = chunk_ranges(&gas_estimates, self.max_gas_per_chunk);
        trace!(num_calls = calls.len(), num_chunks = ranges.len(), block, "aggregating calls");

        let mut outcomes: Vec<CallOutcome> = Vec::with_capacity(calls.len());

        for (start, end) in ranges {
            if cancel.is_cancelled() {
                return Err(AggregatorError::Cancelled);
            }

            let chunk = &calls[start..end];
            let call3s: Vec<Multicall3::Call3> = chunk
                .iter()
                .map(|c| Multicall3::Call3 {
                    target: c.target,
                    allowFailure: c.allow_failure,
                    callData: c.call_data.clone(),
                })
                .collect();

            let contract = Multicall3::new(self.multicall_address, &self.provider);
            let results = contract
                .aggregate3(call3s)
                .block(resolve_block_id(block))
                .call()
                .await
                .map_err(|e| AggregatorError::Transport(e.to_string()))?;

            if results.len() != chunk.len() {
                return Err(AggregatorError::ChunkLengthMismatch { expected: chunk.len(), got: results.len() });
            }

            for result in results {
                if result.success {
                    outcomes.push(Some(result.returnData));
                } else {
                    outcomes.push(None);
                }
            }
        }

        debug!(num_calls = calls.len(), block, "aggregation complete");
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_resolve_block_id_zero_means_latest() {
        assert_eq!(resolve_block_id(0), BlockId::latest());
    }

    #[test]
    fn test_resolve_block_id_nonzero_is_pinned() {
        assert_eq!(resolve_block_id(12_345), BlockId::from(12_345));
        assert_ne!(resolve_block_id(12_345), BlockId::latest());
    }

    #[test]
    fn test_chunk_ranges_s3_scenario() {
        // 101 calls of cost 1 each, budget 10: 10 full chunks plus one of 1.
        let gas_estimates = vec![1u64; 101];
        let chunks = chunk_ranges(&gas_estimates, 10);
        let sizes: Vec<usize> = chunks.iter().map(|(s, e)| e - s).collect();
        assert_eq!(sizes, vec![10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 1]);
    }

    #[test]
    fn test_chunk_ranges_preserves_total_coverage() {
        let gas_estimates = vec![3u64, 4, 2, 9, 1, 5, 5, 5];
        let chunks = chunk_ranges(&gas_estimates, 10);
        let covered: usize = chunks.iter().map(|(s, e)| e - s).sum();
        assert_eq!(covered, gas_estimates.len());

        // Reconstruct the original index order from the chunk boundaries.
        let mut reconstructed = Vec::new();
        for (s, e) in &chunks {
            reconstructed.extend(*s..*e);
        }
        assert_eq!(reconstructed, (0..gas_estimates.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_chunk_ranges_respects_budget() {
        let gas_estimates = vec![3u64, 4, 2, 9, 1, 5, 5, 5];
        let chunks = chunk_ranges(&gas_estimates, 10);
        for (start, end) in &chunks {
            let sum: u64 = gas_estimates[*start..*end].iter().sum();
            assert!(sum <= 10 || end - start == 1, "chunk [{start}, {end}) exceeds budget with no single oversized call");
        }
    }

    #[test]
    fn test_chunk_ranges_oversized_single_call_gets_own_chunk() {
        let gas_estimates = vec![1u64, 50, 1];
        let chunks = chunk_ranges(&gas_estimates, 10);
        assert_eq!(chunks, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn test_chunk_ranges_empty() {
        assert_eq!(chunk_ranges(&[], 10), Vec::new());
    }

    #[rstest]
    #[case(vec![1; 10], 10, 1)]
    #[case(vec![1; 11], 10, 2)]
    #[case(vec![5; 4], 10, 2)]
    fn test_chunk_ranges_count(#[case] gas_estimates: Vec<u64>, #[case] budget: u64, #[case] expected_chunks: usize) {
        assert_eq!(chunk_ranges(&gas_estimates, budget).len(), expected_chunks);
    }
}
