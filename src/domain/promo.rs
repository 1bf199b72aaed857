use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::offering::Discount;

/// A buyer-supplied discount token. Immutable once issued except for the
/// activation flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Stored trimmed and uppercased; lookups normalize the same way.
    pub code: String,
    pub discount: Discount,
    pub active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Normalization applied to codes both at storage and at lookup time,
/// making validation case-insensitive on a trimmed string.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}
