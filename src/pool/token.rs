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

use alloy::primitives::Address;

/// ERC20 metadata resolved once at import time and never re-fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
}

impl Token {
    #[must_use]
    pub fn new(address: Address, decimals: u8, symbol: String, name: String) -> Self {
        Self { address, decimals, symbol, name }
    }

    /// A token is valid when its address is non-zero; `decimals` is always
    /// present once a [`Token`] is constructed, so the only remaining check
    /// from the reference data model is the zero-address guard.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.address.is_zero()
    }
}
