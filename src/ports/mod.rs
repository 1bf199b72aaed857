//! Ports consumed by the services. Adapters provide Postgres, in-memory,
//! and HTTP-gateway implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Offering, PromoCode, Transaction, TransactionStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A conditional write lost: the stored state no longer matches what the
    /// caller expected, or a uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract for transactions. Implementations must enforce
/// uniqueness of `code` and of one `open` transaction per (buyer, offering).
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn create(&self, tx: &Transaction) -> StoreResult<Transaction>;

    /// Atomically deletes an OPEN transaction and creates its replacement in
    /// one storage transaction. Fails with `Conflict` if the old record is
    /// no longer OPEN, in which case nothing is written.
    async fn replace_open(&self, old_id: Uuid, tx: &Transaction) -> StoreResult<Transaction>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    async fn get_by_code(&self, code: &str) -> StoreResult<Option<Transaction>>;

    async fn find_open(&self, buyer_id: Uuid, offering_id: Uuid)
        -> StoreResult<Option<Transaction>>;

    async fn find_paid(&self, buyer_id: Uuid, offering_id: Uuid)
        -> StoreResult<Option<Transaction>>;

    /// Conditional update: succeeds only while the stored status equals
    /// `expected`, otherwise fails with `Conflict` carrying the current
    /// status. This is the sole ordering guarantee reconciliation relies on.
    async fn update_status(
        &self,
        id: Uuid,
        new_status: TransactionStatus,
        expected: TransactionStatus,
    ) -> StoreResult<Transaction>;

    /// Deletes a transaction only while it is still OPEN.
    async fn delete_open(&self, id: Uuid) -> StoreResult<()>;

    /// Operator override: unconditional status write, bypassing the
    /// expected-status check. Callers must audit-log the use.
    async fn force_status(&self, id: Uuid, new_status: TransactionStatus)
        -> StoreResult<Transaction>;

    /// Operator override: hard delete regardless of status.
    async fn purge(&self, id: Uuid) -> StoreResult<()>;
}

/// Read-only view of the catalog's offerings.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn offering(&self, id: Uuid) -> StoreResult<Option<Offering>>;
}

/// Promo code lookup. Takes an already-normalized (trimmed, uppercased) code.
#[async_trait]
pub trait PromoCodes: Send + Sync {
    async fn find(&self, code: &str) -> StoreResult<Option<PromoCode>>;
}

/// A session minted by the payment gateway for one transaction. Not
/// persisted by this core; the gateway owns its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub transaction_id: Uuid,
    pub transaction_code: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// The three generic outcomes a gateway report collapses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    Success,
    Pending,
    Error,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport failure or circuit breaker open; safe to retry, the
    /// transaction stays OPEN.
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// Outbound contract to the payment gateway. `create_session` must be safe
/// to call repeatedly for the same still-OPEN transaction; each call simply
/// mints a fresh token against the same transaction code.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, tx: &Transaction) -> Result<PaymentSession, GatewayError>;
}
