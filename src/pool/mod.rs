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

//! Token, factory and pool data model, plus CREATE2 address derivation.

mod address;
mod fee;
mod state;
mod token;

pub use address::{compute_v2_pool_address, compute_v3_pool_address, sort_tokens};
pub use fee::FeeTier;
pub use state::{Pool, TokenPair, V2Pool, V3Pool};
pub use token::Token;

use std::collections::BTreeSet;

use alloy::primitives::{Address, B256};

/// Describes a deployed pool factory: how to derive candidate pool
/// addresses from it, and (for V3) which fee tiers it supports.
#[derive(Debug, Clone)]
pub struct FactoryDescriptor {
    pub name: String,
    pub address: Address,
    pub init_code_hash: B256,
    pub variant: FactoryVariant,
}

/// The two supported factory shapes. V2 factories have no configuration
/// beyond the address/init-code-hash pair; V3 factories enumerate one pool
/// per (token pair, fee tier) from a configurable, growable fee-tier set.
#[derive(Debug, Clone)]
pub enum FactoryVariant {
    V2,
    V3 { fee_tiers: BTreeSet<FeeTier> },
}

impl FactoryDescriptor {
    #[must_use]
    pub fn new_v2(name: impl Into<String>, address: Address, init_code_hash: B256) -> Self {
        Self { name: name.into(), address, init_code_hash, variant: FactoryVariant::V2 }
    }

    #[must_use]
    pub fn new_v3(
        name: impl Into<String>,
        address: Address,
        init_code_hash: B256,
        fee_tiers: impl IntoIterator<Item = FeeTier>,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            init_code_hash,
            variant: FactoryVariant::V3 { fee_tiers: fee_tiers.into_iter().collect() },
        }
    }

    /// Merges `fee_tiers` into this factory's existing set (a no-op for a
    /// V2 factory). Used when `import_pools` is re-invoked with an extended
    /// fee-tier set for an already-registered V3 factory.
    pub fn merge_fee_tiers(&mut self, fee_tiers: impl IntoIterator<Item = FeeTier>) {
        if let FactoryVariant::V3 { fee_tiers: existing } = &mut self.variant {
            existing.extend(fee_tiers);
        }
    }
}
