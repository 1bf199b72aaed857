//! Purchase transaction entity and its three-state machine.
//! Framework-agnostic; persistence lives in the adapters.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::offering::Offering;
use super::pricing;
use super::promo::PromoCode;

/// Stored transaction status. "Awaiting confirmation" and "awaiting initial
/// payment" are both `Open`; there is no separate pending state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Open,
    Paid,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Open => "open",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(TransactionStatus::Open),
            "paid" => Some(TransactionStatus::Paid),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// Terminal statuses are never left again; a new purchase attempt means
    /// a new transaction.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Paid | TransactionStatus::Failed)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchase record for one (buyer, offering) attempt. The price breakdown
/// is computed once at creation and persisted; it is never implicitly
/// recomputed, so later catalog or promo edits cannot change history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Short human-readable code handed to the payment gateway.
    pub code: String,
    pub buyer_id: Uuid,
    pub offering_id: Uuid,
    /// Snapshot of the offering's variant label at purchase time.
    pub offering_kind: String,
    pub base_price: BigDecimal,
    pub offering_discount: BigDecimal,
    pub promo_code: Option<String>,
    pub promo_discount: BigDecimal,
    pub final_price: BigDecimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds a new `Open` transaction, snapshotting the offering and
    /// computing the full price breakdown.
    pub fn new(code: String, buyer_id: Uuid, offering: &Offering, promo: Option<&PromoCode>) -> Self {
        let breakdown = pricing::compute(
            &offering.base_price,
            offering.discount.as_ref(),
            promo.map(|p| &p.discount),
        );
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code,
            buyer_id,
            offering_id: offering.id,
            offering_kind: offering.kind.clone(),
            base_price: breakdown.base_price,
            offering_discount: breakdown.offering_discount,
            promo_code: promo.map(|p| p.code.clone()),
            promo_discount: breakdown.promo_discount,
            final_price: breakdown.final_price,
            status: TransactionStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }
}
