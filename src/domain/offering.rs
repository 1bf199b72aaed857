//! Course offering as seen by the checkout core.
//! Owned by the catalog; read-only here.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A discount attached to an offering or a promo code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Percentage of the base price, e.g. `Percentage(10)` takes 10% off.
    Percentage(BigDecimal),
    /// Flat amount off the base price.
    Fixed(BigDecimal),
}

/// A purchasable course variant (batch/private/group) with its own price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offering {
    pub id: Uuid,
    /// Variant label, snapshotted onto transactions at purchase time.
    pub kind: String,
    pub base_price: BigDecimal,
    pub discount: Option<Discount>,
    pub active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Whether promo codes may be applied to this offering.
    pub promo_allowed: bool,
}

impl Offering {
    /// An offering can be purchased when it is active and inside its
    /// validity window, if one is set.
    pub fn purchasable_at(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        if let Some(from) = self.valid_from {
            if now < from {
                return false;
            }
        }
        if let Some(until) = self.valid_until {
            if now > until {
                return false;
            }
        }
        true
    }
}
