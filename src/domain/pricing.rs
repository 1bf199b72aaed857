//! Pure price computation. Used identically at transaction-creation time
//! and by the checkout preview so displayed and persisted amounts match.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::offering::Discount;

/// Full breakdown of a price as persisted on a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_price: BigDecimal,
    pub offering_discount: BigDecimal,
    pub promo_discount: BigDecimal,
    pub final_price: BigDecimal,
}

/// Amount a single discount takes off `base`.
pub fn discount_amount(base: &BigDecimal, discount: Option<&Discount>) -> BigDecimal {
    match discount {
        None => BigDecimal::from(0),
        Some(Discount::Percentage(pct)) => base * pct / BigDecimal::from(100),
        Some(Discount::Fixed(amount)) => amount.clone(),
    }
}

/// Computes the payable price. Both discounts are taken against the original
/// base price (never compounded), and the result is clamped at zero.
pub fn compute(
    base: &BigDecimal,
    offering_discount: Option<&Discount>,
    promo_discount: Option<&Discount>,
) -> PriceBreakdown {
    let offering_off = discount_amount(base, offering_discount);
    let promo_off = discount_amount(base, promo_discount);
    let zero = BigDecimal::from(0);
    let final_price = base - &offering_off - &promo_off;
    let final_price = if final_price < zero { zero } else { final_price };
    PriceBreakdown {
        base_price: base.clone(),
        offering_discount: offering_off,
        promo_discount: promo_off,
        final_price,
    }
}
