//! Fee calculation for a cart subtotal.
//!
//! Each component of a [`PriceBreakdown`] is rounded to the cent on its own and
//! the total is the sum of the rounded components. The authority computes totals
//! the same way, so rounding the unrounded total instead would drift by a cent on
//! boundary values.

use crate::error::{CheckoutError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// 7.25%
pub const GOVERNMENT_TAX_RATE: Decimal = dec!(0.0725);
/// 3.25%
pub const PLATFORM_FEE_RATE: Decimal = dec!(0.0325);

const CENT_PLACES: u32 = 2;

/// Rounds to two fractional digits, half away from zero, and pins the scale to
/// two so that `20` and `20.00` render identically.
pub fn round_cents(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(CENT_PLACES, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CENT_PLACES);
    rounded
}

/// Monetary decomposition of an order subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub government_tax: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
}

impl PriceBreakdown {
    pub const ZERO: Self = Self {
        subtotal: Decimal::ZERO,
        government_tax: Decimal::ZERO,
        platform_fee: Decimal::ZERO,
        total: Decimal::ZERO,
    };

    /// Total in minor units, as handed to the payment provider.
    pub fn total_in_cents(&self) -> Result<i64> {
        round_cents(self.total)
            .checked_mul(dec!(100))
            .and_then(|cents| cents.to_i64())
            .ok_or_else(|| {
                CheckoutError::InvalidCartState(format!(
                    "total {} overflows minor units",
                    self.total
                ))
            })
    }

    /// Absolute difference between the two totals.
    pub fn drift(&self, other: &PriceBreakdown) -> Decimal {
        (self.total - other.total).abs()
    }
}

/// The tax and fee rates applied to a subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    government_tax_rate: Decimal,
    platform_fee_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            government_tax_rate: GOVERNMENT_TAX_RATE,
            platform_fee_rate: PLATFORM_FEE_RATE,
        }
    }
}

impl FeeSchedule {
    pub fn new(government_tax_rate: Decimal, platform_fee_rate: Decimal) -> Result<Self> {
        if government_tax_rate < Decimal::ZERO || platform_fee_rate < Decimal::ZERO {
            return Err(CheckoutError::InvalidCartState(format!(
                "fee rates must not be negative (tax {government_tax_rate}, fee {platform_fee_rate})"
            )));
        }
        Ok(Self {
            government_tax_rate,
            platform_fee_rate,
        })
    }

    pub fn government_tax_rate(&self) -> Decimal {
        self.government_tax_rate
    }

    pub fn platform_fee_rate(&self) -> Decimal {
        self.platform_fee_rate
    }

    /// Computes the breakdown for a non-negative subtotal.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::InvalidCartState`] when `subtotal` is negative
    /// or too large for the total to be represented.
    pub fn compute_breakdown(&self, subtotal: Decimal) -> Result<PriceBreakdown> {
        if subtotal < Decimal::ZERO {
            return Err(CheckoutError::InvalidCartState(format!(
                "subtotal {subtotal} is negative"
            )));
        }
        let overflow =
            || CheckoutError::InvalidCartState(format!("subtotal {subtotal} is too large to price"));

        let government_tax = round_cents(
            subtotal
                .checked_mul(self.government_tax_rate)
                .ok_or_else(overflow)?,
        );
        let platform_fee = round_cents(
            subtotal
                .checked_mul(self.platform_fee_rate)
                .ok_or_else(overflow)?,
        );
        let subtotal = round_cents(subtotal);
        let total = subtotal
            .checked_add(government_tax)
            .and_then(|sum| sum.checked_add(platform_fee))
            .ok_or_else(overflow)?;

        Ok(PriceBreakdown {
            subtotal,
            government_tax,
            platform_fee,
            total,
        })
    }
}

/// [`FeeSchedule::compute_breakdown`] with the default rates.
pub fn compute_breakdown(subtotal: Decimal) -> Result<PriceBreakdown> {
    FeeSchedule::default().compute_breakdown(subtotal)
}
