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

//! Deterministic CREATE2 pool-address derivation.
//!
//! `addr = last_20_bytes( Keccak256( 0xff || factory || salt || init_code_hash ) )`,
//! with a per-variant salt: `Keccak256(token0 || token1)` for V2, and
//! `Keccak256(abi.encode(token0, token1, fee))` for V3. Both branches sort
//! the pair lexicographically first, which is what makes derivation
//! order-independent of the caller's argument order.

use alloy::primitives::{Address, B256, keccak256};

use super::fee::FeeTier;

/// Returns `(token0, token1)` sorted so that `token0 < token1` byte-wise —
/// the canonical ordering every on-chain factory uses for its pool salt.
#[must_use]
pub fn sort_tokens(a: Address, b: Address) -> (Address, Address) {
    if a < b { (a, b) } else { (b, a) }
}

fn create2(factory: Address, salt: B256, init_code_hash: B256) -> Address {
    let mut preimage = Vec::with_capacity(1 + 20 + 32 + 32);
    preimage.push(0xff);
    preimage.extend_from_slice(factory.as_slice());
    preimage.extend_from_slice(salt.as_slice());
    preimage.extend_from_slice(init_code_hash.as_slice());
    let hash = keccak256(&preimage);
    Address::from_slice(&hash[12..32])
}

/// Derives a V2 pool address. Swapping `token_a`/`token_b` yields the same
/// address (P1).
#[must_use]
pub fn compute_v2_pool_address(
    factory: Address,
    init_code_hash: B256,
    token_a: Address,
    token_b: Address,
) -> Address {
    let (token0, token1) = sort_tokens(token_a, token_b);
    let mut salt_preimage = Vec::with_capacity(40);
    salt_preimage.extend_from_slice(token0.as_slice());
    salt_preimage.extend_from_slice(token1.as_slice());
    let salt = keccak256(&salt_preimage);
    create2(factory, salt, init_code_hash)
}

/// Derives a V3 pool address for a given fee tier. Reordering the pair
/// tokens leaves the address unchanged; changing `fee` always changes it
/// (P2), since the fee is baked into the salt.
#[must_use]
pub fn compute_v3_pool_address(
    factory: Address,
    init_code_hash: B256,
    token_a: Address,
    token_b: Address,
    fee: FeeTier,
) -> Address {
    let (token0, token1) = sort_tokens(token_a, token_b);
    // abi.encode(address, address, uint24): three 32-byte left-padded words.
    let mut salt_preimage = Vec::with_capacity(96);
    salt_preimage.extend_from_slice(&[0u8; 12]);
    salt_preimage.extend_from_slice(token0.as_slice());
    salt_preimage.extend_from_slice(&[0u8; 12]);
    salt_preimage.extend_from_slice(token1.as_slice());
    salt_preimage.extend_from_slice(&[0u8; 29]);
    salt_preimage.extend_from_slice(&fee.as_u32().to_be_bytes()[1..]);
    let salt = keccak256(&salt_preimage);
    create2(factory, salt, init_code_hash)
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, b256};

    use super::*;

    #[test]
    fn test_s1_v2_address_usdc_weth_uniswap_v2() {
        let factory = address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
        let init_code_hash = b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f");
        let token_a = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        let token_b = address!("dac17f958d2ee523a2206206994597c13d831ec7");

        let addr = compute_v2_pool_address(factory, init_code_hash, token_a, token_b);
        assert_eq!(addr, address!("0d4a11d5eeaac28ec3f61d100daf4d40471f1852"));

        // P1: order independence.
        let addr_swapped = compute_v2_pool_address(factory, init_code_hash, token_b, token_a);
        assert_eq!(addr, addr_swapped);
    }

    #[test]
    fn test_s2_v3_address_wbtc_weth_fee_3000() {
        let factory = address!("1F98431c8aD98523631AE4a59f267346ea31F984");
        let init_code_hash = b256!("e34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54");
        let token0 = address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599");
        let token1 = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

        let addr = compute_v3_pool_address(factory, init_code_hash, token0, token1, FeeTier::Normal);
        assert_eq!(addr, address!("cbcdf9626bc03e24f779434178a73a0b4bad62ed"));

        // P2: pair reordering does not change the address.
        let addr_swapped = compute_v3_pool_address(factory, init_code_hash, token1, token0, FeeTier::Normal);
        assert_eq!(addr, addr_swapped);

        // P2: changing the fee tier always changes the address.
        let addr_other_fee = compute_v3_pool_address(factory, init_code_hash, token0, token1, FeeTier::Low);
        assert_ne!(addr, addr_other_fee);
    }

    #[test]
    fn test_sort_tokens_deterministic() {
        let a = address!("0000000000000000000000000000000000000001");
        let b = address!("0000000000000000000000000000000000000002");
        assert_eq!(sort_tokens(a, b), (a, b));
        assert_eq!(sort_tokens(b, a), (a, b));
    }
}
