//! Insurance tiers and the recommendation advisor.
//!
//! A box's declared value is matched against a fixed, ordered table of
//! coverage tiers. Tier ranges are inclusive at both ends; where two ranges
//! touch (5,000 / 25,000 / 100,000) the first tier in table order wins, so
//! an exact boundary value lands in the earlier, cheaper tier.
//!
//! Premium rates are stored in basis points and premiums computed with
//! integer arithmetic, rounded half-up to the minor currency unit.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::Money;

/// Coverage level, ordered from no coverage to full coverage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    None,
    CarrierRisk,
    DeclaredValue,
    Comprehensive,
}

impl TierKind {
    pub fn label(&self) -> &'static str {
        match self {
            TierKind::None => "No insurance",
            TierKind::CarrierRisk => "Carrier risk",
            TierKind::DeclaredValue => "Declared value",
            TierKind::Comprehensive => "Comprehensive",
        }
    }
}

/// One coverage tier with its value range and premium rate.
///
/// A missing `min_value` means "from zero"; a missing `max_value` means
/// "no upper bound". Both bounds are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InsuranceTier {
    pub kind: TierKind,
    pub premium_rate_bp: u32,
    pub min_value: Option<Money>,
    pub max_value: Option<Money>,
}

impl InsuranceTier {
    /// Checks whether `value` falls inside this tier's range.
    #[inline]
    pub fn matches(&self, value: Money) -> bool {
        let above_min = self.min_value.is_none_or(|min| value >= min);
        let below_max = self.max_value.is_none_or(|max| value <= max);
        above_min && below_max
    }

    /// Premium for `value` at this tier's rate, rounded half-up.
    pub fn premium_for(&self, value: Money) -> Money {
        let raw = value as u128 * self.premium_rate_bp as u128;
        ((raw + 5_000) / 10_000) as Money
    }
}

/// The fixed tier table used by this system, in matching order.
pub const DEFAULT_TIER_TABLE: [InsuranceTier; 4] = [
    InsuranceTier {
        kind: TierKind::None,
        premium_rate_bp: 0,
        min_value: Some(0),
        max_value: Some(5_000),
    },
    InsuranceTier {
        kind: TierKind::CarrierRisk,
        premium_rate_bp: 50,
        min_value: Some(5_000),
        max_value: Some(25_000),
    },
    InsuranceTier {
        kind: TierKind::DeclaredValue,
        premium_rate_bp: 100,
        min_value: Some(25_000),
        max_value: Some(100_000),
    },
    InsuranceTier {
        kind: TierKind::Comprehensive,
        premium_rate_bp: 200,
        min_value: Some(100_000),
        max_value: None,
    },
];

/// Ordered list of tiers; pure lookup, no state.
#[derive(Clone, Debug)]
pub struct TierTable {
    tiers: Vec<InsuranceTier>,
}

impl TierTable {
    /// Builds a table from an explicit tier list.
    ///
    /// The caller is responsible for supplying tiers in matching order with
    /// contiguous ranges; the table itself only performs first-match scans.
    pub fn new(tiers: Vec<InsuranceTier>) -> Self {
        Self { tiers }
    }

    pub fn tiers(&self) -> &[InsuranceTier] {
        &self.tiers
    }

    /// First tier in table order whose range contains `value`.
    ///
    /// Falls back to the first (lowest-coverage) tier if nothing matches,
    /// and to a zero-premium no-coverage tier for an empty table. Neither
    /// can happen with the default table.
    pub fn tier_for(&self, value: Money) -> &InsuranceTier {
        self.tiers
            .iter()
            .find(|tier| tier.matches(value))
            .or_else(|| self.tiers.first())
            .unwrap_or(&FALLBACK_TIER)
    }
}

/// Coverage applied when a table has no usable tier at all.
const FALLBACK_TIER: InsuranceTier = InsuranceTier {
    kind: TierKind::None,
    premium_rate_bp: 0,
    min_value: None,
    max_value: None,
};

impl Default for TierTable {
    fn default() -> Self {
        Self::new(DEFAULT_TIER_TABLE.to_vec())
    }
}

/// Recommended coverage for one box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InsuranceAssignment {
    pub tier: TierKind,
    pub declared_value: Money,
    pub premium: Money,
}

/// Recommends an insurance assignment for a box value.
///
/// Pure function; used both by automatic allocation and for manual per-box
/// overrides.
///
/// # Parameters
/// * `value` - The box's declared (summed) value
/// * `table` - The tier table to match against
pub fn recommend(value: Money, table: &TierTable) -> InsuranceAssignment {
    let tier = table.tier_for(value);
    InsuranceAssignment {
        tier: tier.kind,
        declared_value: value,
        premium: tier.premium_for(value),
    }
}
