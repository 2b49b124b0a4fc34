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

//! The concurrency-safe pool-state cache: token/factory registries, pool
//! enumeration, and the sync engine that keeps mirrored reserves current.
//!
//! A single [`std::sync::RwLock`] guards every piece of mutable state.
//! Sync never holds that lock across a suspending call: the pool-address
//! snapshot is taken and the lock released before the aggregator is
//! awaited, and the lock is re-acquired only to apply already-decoded
//! results (§5 of the reference design this mirrors).

use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use alloy::{primitives::Address, providers::Provider};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    aggregator::{Aggregator, PendingCall},
    codec::{
        decimals_selector, decode_decimals, decode_token_string, decode_v2_reserves, decode_v3_slot0,
        get_reserves_selector, name_selector, slot0_selector, symbol_selector,
    },
    config::RuntimeConfig,
    error::CacheError,
    pool::{
        FactoryDescriptor, FactoryVariant, FeeTier, Pool, Token, TokenPair, V2Pool, V3Pool, compute_v2_pool_address,
        compute_v3_pool_address,
    },
};

struct Inner {
    tokens: HashMap<Address, Token>,
    /// Addresses that failed `decimals()`/`symbol()`/`name()` validation on a
    /// previous import attempt. Consulted so repeated `import_tokens` calls
    /// do not keep re-fetching known-bad addresses every cycle.
    invalid_tokens: HashSet<Address>,
    factories: HashMap<Address, FactoryDescriptor>,
    v2_pools: HashMap<Address, V2Pool>,
    v3_pools: HashMap<Address, V3Pool>,
    last_sync_block: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            tokens: HashMap::new(),
            invalid_tokens: HashSet::new(),
            factories: HashMap::new(),
            v2_pools: HashMap::new(),
            v3_pools: HashMap::new(),
            last_sync_block: 0,
        }
    }
}

/// Result of a sync pass: how many pools were touched and how long it took.
#[derive(Debug, Clone, Copy)]
pub struct SyncReport {
    pub block: u64,
    pub v2_pools_synced: usize,
    pub v3_pools_synced: usize,
    pub elapsed: std::time::Duration,
}

/// The live pool-state cache, generic over the chain transport.
pub struct Cache<P> {
    inner: RwLock<Inner>,
    aggregator: Aggregator<P>,
    per_call_gas_cost: u64,
}

fn now_unix() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}

impl<P: Provider> Cache<P> {
    #[must_use]
    pub fn new(provider: P, config: &RuntimeConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
            aggregator: Aggregator::new(provider, config),
            per_call_gas_cost: config.per_call_gas_cost,
        }
    }

    /// Returns the last block a `sync*` call successfully applied.
    #[must_use]
    pub fn last_sync_block(&self) -> u64 {
        self.inner.read().expect("cache lock poisoned").last_sync_block
    }

    #[must_use]
    pub fn token(&self, address: Address) -> Option<Token> {
        self.inner.read().expect("cache lock poisoned").tokens.get(&address).cloned()
    }

    #[must_use]
    pub fn pool(&self, address: Address) -> Option<Pool> {
        let guard = self.inner.read().expect("cache lock poisoned");
        if let Some(p) = guard.v2_pools.get(&address) {
            return Some(Pool::V2(p.clone()));
        }
        guard.v3_pools.get(&address).map(|p| Pool::V3(p.clone()))
    }

    /// `"SYM0/SYM1"` stringification of a pair per spec.md §3, falling back
    /// to the canonical address form for either side not yet in the token
    /// registry.
    #[must_use]
    pub fn pair_label(&self, pair: TokenPair) -> String {
        let guard = self.inner.read().expect("cache lock poisoned");
        let label = |addr: Address| guard.tokens.get(&addr).map_or_else(|| addr.to_string(), |t| t.symbol.clone());
        format!("{}/{}", label(pair.token0), label(pair.token1))
    }

    /// Returns `true` if `address` previously failed ERC20 metadata
    /// validation and has been quarantined from further import attempts.
    #[must_use]
    pub fn is_invalid_token(&self, address: Address) -> bool {
        self.inner.read().expect("cache lock poisoned").invalid_tokens.contains(&address)
    }

    /// Marks `address` as invalid in memory, without attempting to import it.
    /// Used by callers (the driver's per-token retry fallback) that resolve
    /// a failing address outside of [`Cache::import_tokens`]'s own batch.
    pub fn insert_invalid_token(&self, address: Address) {
        self.inner.write().expect("cache lock poisoned").invalid_tokens.insert(address);
        warn!(token = %address, "token quarantined after failing metadata validation");
    }

    // ---- §4.2 token import ----------------------------------------------------------------

    /// Fetches `decimals()`/`symbol()`/`name()` for each address as a single
    /// `3N`-call batch with `allowFailure=false` — any reverting call fails
    /// the whole import. Addresses already quarantined in `invalid_tokens`
    /// (see [`Cache::insert_invalid_token`]) are skipped up front so a
    /// repeated import does not keep re-fetching known-bad addresses.
    /// Inserts (overwriting) each resulting [`Token`], then re-runs pool
    /// enumeration for every registered factory so that new token × old
    /// token pairs materialize.
    pub async fn import_tokens(
        &self,
        addresses: &[Address],
        block: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Token>, CacheError> {
        let addresses: Vec<Address> = {
            let guard = self.inner.read().expect("cache lock poisoned");
            addresses.iter().copied().filter(|a| !guard.invalid_tokens.contains(a)).collect()
        };
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let mut calls = Vec::with_capacity(addresses.len() * 3);
        for &addr in &addresses {
            calls.push(PendingCall::new(addr, decimals_selector().to_vec().into(), self.per_call_gas_cost, false));
            calls.push(PendingCall::new(addr, symbol_selector().to_vec().into(), self.per_call_gas_cost, false));
            calls.push(PendingCall::new(addr, name_selector().to_vec().into(), self.per_call_gas_cost, false));
        }

        let outcomes = self.aggregator.aggregate(&calls, block, cancel).await?;
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        let mut tokens = Vec::with_capacity(addresses.len());
        for (i, &addr) in addresses.iter().enumerate() {
            let decimals_data = outcomes[i * 3].as_ref().ok_or(CacheError::InvalidToken(addr))?;
            let symbol_data = outcomes[i * 3 + 1].as_ref().ok_or(CacheError::InvalidToken(addr))?;
            let name_data = outcomes[i * 3 + 2].as_ref().ok_or(CacheError::InvalidToken(addr))?;

            let decimals = decode_decimals(decimals_data)
                .map_err(|e| CacheError::DecodeShape { pool: addr, reason: e.to_string() })?;
            let symbol = decode_token_string(symbol_data)
                .map_err(|e| CacheError::DecodeShape { pool: addr, reason: e.to_string() })?;
            let name = decode_token_string(name_data)
                .map_err(|e| CacheError::DecodeShape { pool: addr, reason: e.to_string() })?;

            tokens.push(Token::new(addr, decimals, symbol, name));
        }

        let factory_addrs: Vec<Address> = {
            let mut guard = self.inner.write().expect("cache lock poisoned");
            for token in &tokens {
                guard.tokens.insert(token.address, token.clone());
            }
            guard.factories.keys().copied().collect()
        };

        info!(count = tokens.len(), "imported tokens");

        for factory_addr in factory_addrs {
            self.import_pools_for_factory(factory_addr)?;
        }

        Ok(tokens)
    }

    // ---- §4.4 pool enumeration -------------------------------------------------------------

    /// Registers `factory` (merging fee tiers if it is already registered)
    /// and enumerates every ordered pair of distinct tokens currently in the
    /// registry against it. Returns the addresses of pools newly inserted;
    /// insertion is idempotent, so pools that already existed are left
    /// untouched and excluded from the return list.
    pub fn import_pools(&self, factory: FactoryDescriptor) -> Result<Vec<Address>, CacheError> {
        let extra_fee_tiers = match &factory.variant {
            FactoryVariant::V3 { fee_tiers } => Some(fee_tiers.clone()),
            FactoryVariant::V2 => None,
        };

        {
            let mut guard = self.inner.write().expect("cache lock poisoned");
            match guard.factories.get_mut(&factory.address) {
                Some(existing) => {
                    if let Some(fee_tiers) = extra_fee_tiers {
                        existing.merge_fee_tiers(fee_tiers);
                    }
                }
                None => {
                    guard.factories.insert(factory.address, factory.clone());
                }
            }
        }

        self.import_pools_for_factory(factory.address)
    }

    /// Enumerates every ordered pair of distinct tokens currently in the
    /// registry against `factory_addr`. `O(tokens^2)` per call; re-running
    /// the full enumeration on every `import_tokens` keeps insertion's
    /// idempotence simple rather than tracking which pairs are actually new.
    fn import_pools_for_factory(&self, factory_addr: Address) -> Result<Vec<Address>, CacheError> {
        let mut guard = self.inner.write().expect("cache lock poisoned");

        let factory = guard.factories.get(&factory_addr).cloned().ok_or(CacheError::InvalidFactory(factory_addr))?;
        let token_addrs: Vec<Address> = guard.tokens.keys().copied().collect();

        let mut newly_added = Vec::new();

        for (i, &a) in token_addrs.iter().enumerate() {
            for &b in &token_addrs[i + 1..] {
                let pair = TokenPair::new(a, b);
                match &factory.variant {
                    FactoryVariant::V2 => {
                        let addr = compute_v2_pool_address(factory.address, factory.init_code_hash, a, b);
                        if !guard.v2_pools.contains_key(&addr) {
                            guard.v2_pools.insert(
                                addr,
                                V2Pool::new_uninitialized(addr, factory.address, factory.init_code_hash, pair),
                            );
                            newly_added.push(addr);
                        }
                    }
                    FactoryVariant::V3 { fee_tiers } => {
                        for &fee in fee_tiers {
                            let addr = compute_v3_pool_address(factory.address, factory.init_code_hash, a, b, fee);
                            if !guard.v3_pools.contains_key(&addr) {
                                guard.v3_pools.insert(
                                    addr,
                                    V3Pool::new_uninitialized(
                                        addr,
                                        factory.address,
                                        factory.init_code_hash,
                                        pair,
                                        fee,
                                    ),
                                );
                                newly_added.push(addr);
                            }
                        }
                    }
                }
            }
        }

        debug!(factory = %factory_addr, new_pools = newly_added.len(), "pool enumeration complete");
        Ok(newly_added)
    }

    // ---- §4.5 sync engine -------------------------------------------------------------------

    /// Resolves the sync entry points' `block` argument: `0` is replaced
    /// with the transport's current head so the "already synced" gate and
    /// `last_sync_block` always compare against a concrete number.
    async fn resolve_block(&self, block: u64) -> Result<u64, CacheError> {
        if block == 0 { Ok(self.aggregator.resolve_latest_block().await?) } else { Ok(block) }
    }

    /// Syncs every pool currently in the cache. `block == 0` resolves to the
    /// transport's current head (spec.md §4.1's "latest" convention) before
    /// the "already synced" gate is checked, so a caller that doesn't know
    /// the concrete head number yet can still invoke this without racing
    /// `last_sync_block`'s monotonicity (I3).
    pub async fn sync_all(&self, block: u64, cancel: &CancellationToken) -> Result<SyncReport, CacheError> {
        let block = self.resolve_block(block).await?;
        let (v2_addrs, v3_addrs) = {
            let guard = self.inner.read().expect("cache lock poisoned");
            if block <= guard.last_sync_block {
                return Err(CacheError::BlockAlreadySynced { requested: block, last_synced: guard.last_sync_block });
            }
            (guard.v2_pools.keys().copied().collect::<Vec<_>>(), guard.v3_pools.keys().copied().collect::<Vec<_>>())
        };
        self.sync_addresses(&v2_addrs, &v3_addrs, block, cancel).await
    }

    /// Syncs a given subset of pool addresses. Any address not present in
    /// the cache is a hard error; no partial application occurs in that case.
    /// `block == 0` resolves to the transport's current head, as in
    /// [`Cache::sync_all`].
    pub async fn sync(&self, pool_addrs: &[Address], block: u64, cancel: &CancellationToken) -> Result<SyncReport, CacheError> {
        let block = self.resolve_block(block).await?;
        let (v2_addrs, v3_addrs) = {
            let guard = self.inner.read().expect("cache lock poisoned");
            if block <= guard.last_sync_block {
                return Err(CacheError::BlockAlreadySynced { requested: block, last_synced: guard.last_sync_block });
            }
            let mut v2 = Vec::new();
            let mut v3 = Vec::new();
            for &addr in pool_addrs {
                if guard.v2_pools.contains_key(&addr) {
                    v2.push(addr);
                } else if guard.v3_pools.contains_key(&addr) {
                    v3.push(addr);
                } else {
                    return Err(CacheError::PoolNotFound(addr));
                }
            }
            (v2, v3)
        };
        self.sync_addresses(&v2_addrs, &v3_addrs, block, cancel).await
    }

    async fn sync_addresses(
        &self,
        v2_addrs: &[Address],
        v3_addrs: &[Address],
        block: u64,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, CacheError> {
        let start = std::time::Instant::now();

        let v2_calls: Vec<PendingCall> = v2_addrs
            .iter()
            .map(|&addr| PendingCall::new(addr, get_reserves_selector().to_vec().into(), self.per_call_gas_cost, true))
            .collect();
        let v3_calls: Vec<PendingCall> = v3_addrs
            .iter()
            .map(|&addr| PendingCall::new(addr, slot0_selector().to_vec().into(), self.per_call_gas_cost, true))
            .collect();

        let v2_outcomes = self.aggregator.aggregate(&v2_calls, block, cancel).await?;
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        let v3_outcomes = self.aggregator.aggregate(&v3_calls, block, cancel).await?;
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        let mut decoded_v2 = Vec::with_capacity(v2_addrs.len());
        for (addr, outcome) in v2_addrs.iter().zip(v2_outcomes) {
            let data = outcome.unwrap_or_default();
            let reserves = decode_v2_reserves(&data).map_err(|e| CacheError::DecodeShape { pool: *addr, reason: e.to_string() })?;
            decoded_v2.push((*addr, reserves));
        }

        let mut decoded_v3 = Vec::with_capacity(v3_addrs.len());
        for (addr, outcome) in v3_addrs.iter().zip(v3_outcomes) {
            let data = outcome.unwrap_or_default();
            let slot0 = decode_v3_slot0(&data).map_err(|e| CacheError::DecodeShape { pool: *addr, reason: e.to_string() })?;
            decoded_v3.push((*addr, slot0));
        }

        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        let now = now_unix();
        let mut guard = self.inner.write().expect("cache lock poisoned");

        for (addr, reserves) in decoded_v2 {
            if let Some(reserves) = reserves {
                if let Some(pool) = guard.v2_pools.get_mut(&addr) {
                    pool.apply_reserves(reserves, block, now);
                }
            }
        }
        for (addr, slot0) in decoded_v3 {
            if let Some(slot0) = slot0 {
                if let Some(pool) = guard.v3_pools.get_mut(&addr) {
                    pool.apply_slot0(slot0, block, now);
                }
            }
        }
        guard.last_sync_block = block;

        let report = SyncReport {
            block,
            v2_pools_synced: v2_addrs.len(),
            v3_pools_synced: v3_addrs.len(),
            elapsed: start.elapsed(),
        };
        info!(block, v2 = report.v2_pools_synced, v3 = report.v3_pools_synced, ?report.elapsed, "sync applied");
        Ok(report)
    }

    // ---- token removal cascade --------------------------------------------------------------

    /// Removes `token` and every pool that references it. A factory that
    /// loses its last pool *as a result of this removal* is itself removed
    /// (P5); a factory that was already empty beforehand (e.g. registered
    /// ahead of its token pairs materializing) is left untouched, since its
    /// emptiness isn't a consequence of removing `token`.
    pub fn remove_token(&self, token: Address) -> Result<(), CacheError> {
        let mut guard = self.inner.write().expect("cache lock poisoned");
        if guard.tokens.remove(&token).is_none() {
            return Err(CacheError::TokenNotFound(token));
        }

        let affected_factories: HashSet<Address> = guard
            .v2_pools
            .values()
            .filter(|p| p.pair.contains(token))
            .map(|p| p.factory_addr)
            .chain(guard.v3_pools.values().filter(|p| p.pair.contains(token)).map(|p| p.factory_addr))
            .collect();

        guard.v2_pools.retain(|_, p| !p.pair.contains(token));
        guard.v3_pools.retain(|_, p| !p.pair.contains(token));

        let still_has_pools: HashSet<Address> =
            guard.v2_pools.values().map(|p| p.factory_addr).chain(guard.v3_pools.values().map(|p| p.factory_addr)).collect();
        guard.factories.retain(|addr, _| !affected_factories.contains(addr) || still_has_pools.contains(addr));

        Ok(())
    }
}
