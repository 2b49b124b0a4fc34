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

use alloy::primitives::{Address, B256, U256};

use super::{address::sort_tokens, fee::FeeTier};
use crate::codec::{ReservesV2, Slot0V3};

/// A pair of token addresses in canonical (`token0 < token1`) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenPair {
    pub token0: Address,
    pub token1: Address,
}

impl TokenPair {
    #[must_use]
    pub fn new(a: Address, b: Address) -> Self {
        let (token0, token1) = sort_tokens(a, b);
        Self { token0, token1 }
    }

    #[must_use]
    pub fn contains(&self, token: Address) -> bool {
        self.token0 == token || self.token1 == token
    }
}

impl std::fmt::Display for TokenPair {
    /// Canonical address-form stringification. Callers with a token registry
    /// at hand (the cache) should prefer [`crate::cache::Cache::pair_label`]
    /// for the human-readable `"SYM0/SYM1"` form spec.md describes; this impl
    /// is the registry-free fallback used by logging and `Debug`-adjacent
    /// call sites.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.token0, self.token1)
    }
}

/// A constant-product pool mirrored from `getReserves()`.
#[derive(Debug, Clone)]
pub struct V2Pool {
    pub address: Address,
    pub factory_addr: Address,
    pub init_code_hash: B256,
    pub pair: TokenPair,
    pub reserve0: U256,
    pub reserve1: U256,
    pub last_block: u64,
    pub last_timestamp: u32,
}

impl V2Pool {
    /// Constructs a freshly-enumerated pool with zeroed reserves — it has
    /// not yet been synced, and whether it even exists on-chain is unknown
    /// until the first `sync` call decodes an empty or non-empty return.
    #[must_use]
    pub fn new_uninitialized(address: Address, factory_addr: Address, init_code_hash: B256, pair: TokenPair) -> Self {
        Self {
            address,
            factory_addr,
            init_code_hash,
            pair,
            reserve0: U256::ZERO,
            reserve1: U256::ZERO,
            last_block: 0,
            last_timestamp: 0,
        }
    }

    /// Applies a decoded `getReserves()` result. `now` is the wall-clock
    /// timestamp of the sync apply step, per the sync algorithm's uniform
    /// `last_timestamp = now` rule — it is independent of the on-chain
    /// `blockTimestampLast` carried inside `reserves`.
    pub fn apply_reserves(&mut self, reserves: ReservesV2, block: u64, now: u32) {
        self.reserve0 = reserves.reserve0;
        self.reserve1 = reserves.reserve1;
        self.last_block = block;
        self.last_timestamp = now;
    }
}

/// A concentrated-liquidity pool mirrored from `slot0()`.
#[derive(Debug, Clone)]
pub struct V3Pool {
    pub address: Address,
    pub factory_addr: Address,
    pub init_code_hash: B256,
    pub pair: TokenPair,
    pub fee_tier: FeeTier,
    pub slot0: Slot0V3,
    pub last_block: u64,
    pub last_timestamp: u32,
}

impl V3Pool {
    #[must_use]
    pub fn new_uninitialized(
        address: Address,
        factory_addr: Address,
        init_code_hash: B256,
        pair: TokenPair,
        fee_tier: FeeTier,
    ) -> Self {
        Self {
            address,
            factory_addr,
            init_code_hash,
            pair,
            fee_tier,
            slot0: Slot0V3::default(),
            last_block: 0,
            last_timestamp: 0,
        }
    }

    pub fn apply_slot0(&mut self, slot0: Slot0V3, block: u64, now: u32) {
        self.slot0 = slot0;
        self.last_block = block;
        self.last_timestamp = now;
    }
}

/// A pool mirrored by this cache, tagged by AMM variant. Kept as a tagged
/// union rather than a trait object so the cache can hold homogeneous
/// `Vec<V2Pool>`/`Vec<V3Pool>` maps for the hot sync path, while still
/// exposing a uniform handle to callers that don't care which variant they
/// have.
#[derive(Debug, Clone)]
pub enum Pool {
    V2(V2Pool),
    V3(V3Pool),
}

impl Pool {
    #[must_use]
    pub fn address(&self) -> Address {
        match self {
            Pool::V2(p) => p.address,
            Pool::V3(p) => p.address,
        }
    }

    #[must_use]
    pub fn factory_addr(&self) -> Address {
        match self {
            Pool::V2(p) => p.factory_addr,
            Pool::V3(p) => p.factory_addr,
        }
    }

    #[must_use]
    pub fn pair(&self) -> TokenPair {
        match self {
            Pool::V2(p) => p.pair,
            Pool::V3(p) => p.pair,
        }
    }

    #[must_use]
    pub fn last_block(&self) -> u64 {
        match self {
            Pool::V2(p) => p.last_block,
            Pool::V3(p) => p.last_block,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    #[test]
    fn test_token_pair_canonical_order() {
        let a = address!("0000000000000000000000000000000000000002");
        let b = address!("0000000000000000000000000000000000000001");
        let pair = TokenPair::new(a, b);
        assert_eq!(pair.token0, b);
        assert_eq!(pair.token1, a);
        assert!(pair.contains(a));
        assert!(pair.contains(b));
    }

    #[test]
    fn test_v2_pool_apply_reserves() {
        let pair = TokenPair::new(
            address!("0000000000000000000000000000000000000001"),
            address!("0000000000000000000000000000000000000002"),
        );
        let mut pool = V2Pool::new_uninitialized(
            address!("0000000000000000000000000000000000000003"),
            address!("0000000000000000000000000000000000000004"),
            B256::ZERO,
            pair,
        );
        pool.apply_reserves(
            ReservesV2 { reserve0: U256::from(100u64), reserve1: U256::from(200u64), block_timestamp_last: 55 },
            42,
            1_700_000_000,
        );
        assert_eq!(pool.reserve0, U256::from(100u64));
        assert_eq!(pool.last_block, 42);
        assert_eq!(pool.last_timestamp, 1_700_000_000);
    }
}
