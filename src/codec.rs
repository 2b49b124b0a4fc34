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

//! Contract ABI bindings and packed-return decoding.
//!
//! Function selectors are derived by `alloy_sol_types` from the `sol!`
//! declarations below (first four bytes of the Keccak-256 hash of the
//! canonical signature) — the same mechanism `contracts/base.rs` and
//! `contracts/erc20.rs` use in the reference adapter. Return-data layouts
//! that spec.md pins to exact byte offsets (V2 reserves, V3 slot0) are
//! decoded by hand rather than through `SolCall::abi_decode_returns`, so
//! that width mismatches surface as a distinguishable [`DecodeShapeError`]
//! instead of an opaque ABI error.

use alloy::{
    primitives::U256,
    sol,
    sol_types::SolCall,
};
use thiserror::Error;

sol! {
    /// Standard Multicall3 aggregator, deployed at the same address on every chain.
    #[sol(rpc)]
    contract Multicall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (Result[] memory returnData);
    }

    /// ERC20 metadata surface used by token import.
    #[sol(rpc)]
    contract ERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function name() external view returns (string);
    }

    /// Constant-product (V2) pair reserves getter.
    #[sol(rpc)]
    contract UniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }

    /// Concentrated-liquidity (V3) pool packed core state getter.
    #[sol(rpc)]
    contract UniswapV3Pool {
        function slot0() external view returns (
            uint160 sqrtPriceX96,
            int24 tick,
            uint16 observationIndex,
            uint16 observationCardinality,
            uint16 observationCardinalityNext,
            uint8 feeProtocol,
            bool unlocked
        );
    }
}

/// Returns the four-byte selector for `getReserves()`.
#[must_use]
pub fn get_reserves_selector() -> [u8; 4] {
    UniswapV2Pair::getReservesCall::SELECTOR
}

/// Returns the four-byte selector for `slot0()`.
#[must_use]
pub fn slot0_selector() -> [u8; 4] {
    UniswapV3Pool::slot0Call::SELECTOR
}

/// Returns the four-byte selector for `decimals()`.
#[must_use]
pub fn decimals_selector() -> [u8; 4] {
    ERC20::decimalsCall::SELECTOR
}

/// Returns the four-byte selector for `symbol()`.
#[must_use]
pub fn symbol_selector() -> [u8; 4] {
    ERC20::symbolCall::SELECTOR
}

/// Returns the four-byte selector for `name()`.
#[must_use]
pub fn name_selector() -> [u8; 4] {
    ERC20::nameCall::SELECTOR
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("expected {expected} bytes, got {got}")]
pub struct DecodeShapeError {
    pub expected: usize,
    pub got: usize,
}

/// Decoded `getReserves()` return, or `None` if the call returned empty data
/// (the pool does not exist at this factory — "uninitialized").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReservesV2 {
    pub reserve0: U256,
    pub reserve1: U256,
    pub block_timestamp_last: u32,
}

/// Decodes the 96-byte packed `getReserves()` return per spec.md §6:
/// `uint112 reserve0 | uint112 reserve1 | uint32 blockTimestampLast`, each
/// padded to a 32-byte word. Empty input means "uninitialized".
pub fn decode_v2_reserves(data: &[u8]) -> Result<Option<ReservesV2>, DecodeShapeError> {
    if data.is_empty() {
        return Ok(None);
    }
    if data.len() != 96 {
        return Err(DecodeShapeError { expected: 96, got: data.len() });
    }

    let reserve0 = U256::from_be_slice(&data[0..32]);
    let reserve1 = U256::from_be_slice(&data[32..64]);
    let block_timestamp_last = u32::from_be_bytes(data[92..96].try_into().unwrap());

    Ok(Some(ReservesV2 { reserve0, reserve1, block_timestamp_last }))
}

/// Decoded `slot0()` return, or `None` if the call returned empty data
/// ("uninitialized" pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot0V3 {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub observation_index: u16,
    pub observation_cardinality: u16,
    pub observation_cardinality_next: u16,
    pub fee_protocol: u8,
    pub unlocked: bool,
}

/// Decodes the 224-byte packed `slot0()` return per spec.md §6: seven
/// left-padded 32-byte words, with `tick` sign-extended from its low 3 bytes
/// and `unlocked` read from the single byte at offset 223.
pub fn decode_v3_slot0(data: &[u8]) -> Result<Option<Slot0V3>, DecodeShapeError> {
    if data.is_empty() {
        return Ok(None);
    }
    if data.len() != 224 {
        return Err(DecodeShapeError { expected: 224, got: data.len() });
    }

    let word = |i: usize| -> &[u8] { &data[i * 32..(i + 1) * 32] };

    let sqrt_price_x96 = U256::from_be_slice(word(0));
    let tick = sign_extend_i24(word(1)[29..32].try_into().unwrap());
    let observation_index = u16::from_be_bytes(word(2)[30..32].try_into().unwrap());
    let observation_cardinality = u16::from_be_bytes(word(3)[30..32].try_into().unwrap());
    let observation_cardinality_next = u16::from_be_bytes(word(4)[30..32].try_into().unwrap());
    let fee_protocol = word(5)[31];
    let unlocked = word(6)[31] != 0;

    Ok(Some(Slot0V3 {
        sqrt_price_x96,
        tick,
        observation_index,
        observation_cardinality,
        observation_cardinality_next,
        fee_protocol,
        unlocked,
    }))
}

/// Sign-extends a big-endian 24-bit two's-complement value to `i32`.
fn sign_extend_i24(bytes: [u8; 3]) -> i32 {
    let unsigned = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
    if bytes[0] & 0x80 != 0 {
        (unsigned | 0xFF00_0000) as i32
    } else {
        unsigned as i32
    }
}

/// Decodes `decimals()`'s single 32-byte word as an unsigned integer. Per
/// spec.md §4.2 the return must be exactly 32 bytes.
pub fn decode_decimals(data: &[u8]) -> Result<u8, DecodeShapeError> {
    if data.len() != 32 {
        return Err(DecodeShapeError { expected: 32, got: data.len() });
    }
    let value = U256::from_be_slice(data);
    Ok(u8::try_from(value).unwrap_or(u8::MAX))
}

/// Decodes an ERC20 `symbol()`/`name()` return, tolerating both the standard
/// dynamic-string encoding (offset=0x20, length, bytes padded to a 32-byte
/// boundary) and the raw fixed-width `bytes32` form some legacy tokens use.
/// Trims trailing/leading non-alphanumeric characters either way.
pub fn decode_token_string(data: &[u8]) -> Result<String, DecodeShapeError> {
    if data.len() < 32 {
        return Err(DecodeShapeError { expected: 32, got: data.len() });
    }

    // Standard dynamic-string encoding: first word is an offset that must be 0x20.
    let first_word = U256::from_be_slice(&data[0..32]);
    if first_word == U256::from(32u64) && data.len() >= 64 {
        let length_word = U256::from_be_slice(&data[32..64]);
        if let Ok(length) = usize::try_from(length_word) {
            let start = 64;
            if let Some(end) = start.checked_add(length) {
                if end <= data.len() {
                    let raw = &data[start..end];
                    return Ok(trim_non_alphanumeric(raw));
                }
            }
        }
    }

    // Fallback: raw fixed-width string packed directly into the return data
    // (legacy tokens such as early MKR). Treat the whole payload as bytes.
    Ok(trim_non_alphanumeric(data))
}

fn trim_non_alphanumeric(raw: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(raw);
    lossy.trim_matches(|c: char| !c.is_ascii_alphanumeric()).trim_matches(char::from(0)).to_string()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_decode_v2_reserves_empty_is_uninitialized() {
        assert_eq!(decode_v2_reserves(&[]).unwrap(), None);
    }

    #[test]
    fn test_decode_v2_reserves_wrong_length() {
        let err = decode_v2_reserves(&[0u8; 95]).unwrap_err();
        assert_eq!(err, DecodeShapeError { expected: 96, got: 95 });
    }

    #[test]
    fn test_decode_v2_reserves_happy_path() {
        let mut data = [0u8; 96];
        data[31] = 100; // reserve0 = 100
        data[63] = 200; // reserve1 = 200
        data[92..96].copy_from_slice(&1_700_000_000u32.to_be_bytes());
        let reserves = decode_v2_reserves(&data).unwrap().unwrap();
        assert_eq!(reserves.reserve0, U256::from(100u64));
        assert_eq!(reserves.reserve1, U256::from(200u64));
        assert_eq!(reserves.block_timestamp_last, 1_700_000_000);
    }

    #[test]
    fn test_decode_v3_slot0_empty_is_uninitialized() {
        assert_eq!(decode_v3_slot0(&[]).unwrap(), None);
    }

    #[rstest]
    #[case(0i32)]
    #[case(100i32)]
    #[case(-100i32)]
    #[case(887_272i32)]
    #[case(-887_272i32)]
    fn test_slot0_tick_roundtrip(#[case] tick: i32) {
        let mut data = [0u8; 224];
        let tick_bytes = tick.to_be_bytes();
        data[29..32].copy_from_slice(&tick_bytes[1..4]);
        data[223] = 1; // unlocked
        let slot0 = decode_v3_slot0(&data).unwrap().unwrap();
        assert_eq!(slot0.tick, tick);
        assert!(slot0.unlocked);
    }

    #[test]
    fn test_decode_v3_slot0_wrong_length() {
        let err = decode_v3_slot0(&[0u8; 10]).unwrap_err();
        assert_eq!(err, DecodeShapeError { expected: 224, got: 10 });
    }

    #[test]
    fn test_decode_decimals() {
        let mut data = [0u8; 32];
        data[31] = 18;
        assert_eq!(decode_decimals(&data).unwrap(), 18);
    }

    #[test]
    fn test_decode_token_string_dynamic_encoding() {
        let mut data = vec![0u8; 32];
        data[31] = 32; // offset = 0x20
        let mut length_word = vec![0u8; 32];
        length_word[31] = 4; // length = 4
        data.extend(length_word);
        let mut payload = b"USDC".to_vec();
        payload.resize(32, 0);
        data.extend(payload);
        assert_eq!(decode_token_string(&data).unwrap(), "USDC");
    }

    #[test]
    fn test_decode_token_string_raw_fixed_width() {
        let mut data = vec![0u8; 32];
        data[0..3].copy_from_slice(b"MKR");
        assert_eq!(decode_token_string(&data).unwrap(), "MKR");
    }

    #[test]
    fn test_decode_token_string_too_short() {
        let err = decode_token_string(&[0u8; 10]).unwrap_err();
        assert_eq!(err, DecodeShapeError { expected: 32, got: 10 });
    }
}
