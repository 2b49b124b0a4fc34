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

//! Outer glue: wires the cache to a live block subscription.
//!
//! This is the one module that reaches for [`anyhow`] rather than the
//! crate's own typed errors — matching the reference adapter's split, where
//! internal components propagate precise `thiserror` enums and only the
//! outermost driving loop collapses them behind a single error type.

use std::sync::Arc;

use alloy::{primitives::Address, providers::Provider};
use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cache::Cache,
    config::RuntimeConfig,
    error::{AggregatorError, CacheError},
    pool::FactoryDescriptor,
    subscription::{AlloyBlockSource, Subscription},
};

/// Bootstraps and then continuously resyncs a [`Cache`] from a live block
/// subscription.
pub struct Driver<P> {
    cache: Arc<Cache<P>>,
    subscription: Subscription<AlloyBlockSource<P>>,
}

impl<P: Provider + Clone + Send + Sync + 'static> Driver<P> {
    #[must_use]
    pub fn new(provider: P, config: RuntimeConfig) -> Self {
        let cache = Arc::new(Cache::new(provider.clone(), &config));
        let subscription = Subscription::new(AlloyBlockSource::new(provider), config);
        Self { cache, subscription }
    }

    #[must_use]
    pub fn cache(&self) -> Arc<Cache<P>> {
        self.cache.clone()
    }

    /// Imports `tokens`, registers `factories` (enumerating their candidate
    /// pools), and performs the initial `sync_all` at `block` (`0` resolves
    /// to the chain's current head, per spec.md §4.1). Call once before
    /// [`Driver::run`].
    ///
    /// If the whole-batch `import_tokens` call fails (a single reverting
    /// `allowFailure=false` call reverts the entire outer multicall per
    /// spec.md §4.2's error model), falls back to importing the batch one
    /// token at a time: addresses that import cleanly on retry are kept,
    /// addresses that fail individually are quarantined into the cache's
    /// `invalid_tokens` set (see [`Cache::insert_invalid_token`]) rather than
    /// aborting bootstrap entirely.
    pub async fn bootstrap(
        &self,
        tokens: &[Address],
        factories: Vec<FactoryDescriptor>,
        block: u64,
    ) -> anyhow::Result<()> {
        let cancel = CancellationToken::new();

        if let Err(err) = self.cache.import_tokens(tokens, block, &cancel).await {
            warn!(error = %err, "batch token import failed, retrying individually");
            for &token in tokens {
                if let Err(err) = self.cache.import_tokens(&[token], block, &cancel).await {
                    warn!(error = %err, token = %token, "token failed metadata validation, quarantining");
                    self.cache.insert_invalid_token(token);
                }
            }
        }

        for factory in factories {
            self.cache.import_pools(factory).context("importing pools for factory")?;
        }
        self.cache.sync_all(block, &cancel).await.context("initial sync_all")?;

        info!(block, "bootstrap complete");
        Ok(())
    }

    /// Opens the block subscription and resyncs the whole cache on every new
    /// head, forever (or until the subscription closes). Per spec.md §5 and
    /// §9's design notes, sync is driven sequentially with respect to the
    /// driver itself — one `sync_all` in flight at a time, matching the
    /// reference adapter's pool manager, which drains its block stream
    /// before acting rather than spawning unbounded concurrent syncs. A
    /// block whose sync is still running when a later head has already
    /// arrived observes its per-block context cancelled mid-flight; that is
    /// logged and treated as a normal skip, never an error, per the
    /// subscription's cancellation contract.
    pub async fn run(&self) -> anyhow::Result<()> {
        let (mut items_rx, mut errors_rx) = self.subscription.subscribe().context("opening block subscription")?;

        loop {
            tokio::select! {
                maybe_err = errors_rx.recv() => {
                    match maybe_err {
                        Some(err) => {
                            warn!(error = %err, "subscription reported a fatal error");
                            return Err(err.into());
                        }
                        None => {
                            info!("subscription closed, stopping driver");
                            return Ok(());
                        }
                    }
                }
                maybe_item = items_rx.recv() => {
                    let Some(item) = maybe_item else {
                        info!("subscription items channel closed, stopping driver");
                        return Ok(());
                    };
                    let block = item.number;
                    match self.cache.sync_all(block, &item.ctx).await {
                        Ok(report) => {
                            info!(block = report.block, v2 = report.v2_pools_synced, v3 = report.v3_pools_synced, "resynced");
                        }
                        Err(err) if is_benign_skip(&err) => {
                            debug!(block, "sync superseded by a newer block, skipping");
                        }
                        Err(err) => {
                            warn!(error = %err, block, "sync failed");
                        }
                    }
                }
            }
        }
    }
}

/// A sync outcome the driver treats as a normal skip rather than a failure:
/// either the per-block context was cancelled (the next block arrived
/// first), or the block had already been synced by a faster path.
fn is_benign_skip(err: &CacheError) -> bool {
    matches!(err, CacheError::Cancelled | CacheError::Aggregator(AggregatorError::Cancelled) | CacheError::BlockAlreadySynced { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_benign_skip_classifies_cancellation_as_benign() {
        assert!(is_benign_skip(&CacheError::Cancelled));
        assert!(is_benign_skip(&CacheError::Aggregator(AggregatorError::Cancelled)));
        assert!(is_benign_skip(&CacheError::BlockAlreadySynced { requested: 5, last_synced: 10 }));
    }

    #[test]
    fn test_is_benign_skip_classifies_decode_errors_as_fatal() {
        assert!(!is_benign_skip(&CacheError::DecodeShape { pool: Address::ZERO, reason: "bad width".into() }));
        assert!(!is_benign_skip(&CacheError::PoolNotFound(Address::ZERO)));
    }
}
