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

//! V3 fee tiers, expressed in hundredths of a basis point.

/// Closed set of fee tiers a V3-style factory can deploy pools for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeeTier {
    /// 0.01%
    Min,
    /// 0.05%
    Low,
    /// 0.3%
    Normal,
    /// 1%
    Max,
}

impl FeeTier {
    /// All four tiers, in ascending order.
    pub const ALL: [FeeTier; 4] = [FeeTier::Min, FeeTier::Low, FeeTier::Normal, FeeTier::Max];

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            FeeTier::Min => 100,
            FeeTier::Low => 500,
            FeeTier::Normal => 3000,
            FeeTier::Max => 10000,
        }
    }

    #[must_use]
    pub const fn try_from_u32(value: u32) -> Option<Self> {
        match value {
            100 => Some(FeeTier::Min),
            500 => Some(FeeTier::Low),
            3000 => Some(FeeTier::Normal),
            10000 => Some(FeeTier::Max),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeeTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(100, Some(FeeTier::Min))]
    #[case(500, Some(FeeTier::Low))]
    #[case(3000, Some(FeeTier::Normal))]
    #[case(10000, Some(FeeTier::Max))]
    #[case(1, None)]
    #[case(0, None)]
    fn test_try_from_u32(#[case] input: u32, #[case] expected: Option<FeeTier>) {
        assert_eq!(FeeTier::try_from_u32(input), expected);
    }

    #[test]
    fn test_roundtrip_all_tiers() {
        for tier in FeeTier::ALL {
            assert_eq!(FeeTier::try_from_u32(tier.as_u32()), Some(tier));
        }
    }
}
