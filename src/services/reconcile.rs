//! Applies gateway-reported outcomes to stored transactions. Sole writer of
//! terminal states; idempotency comes entirely from the store's conditional
//! update, so webhook delivery and buyer polling can both run through here
//! without double-applying a transition.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ports::{GatewayOutcome, StoreError, TransactionStore};
use crate::domain::{Transaction, TransactionStatus};

/// Emitted once per real Open→Paid transition, consumed by the external
/// enrollment component. This core does not itself grant access.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseEvent {
    pub buyer_id: Uuid,
    pub offering_id: Uuid,
    pub transaction_id: Uuid,
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("transaction {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(StoreError),
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn TransactionStore>,
    events: broadcast::Sender<PurchaseEvent>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { store, events }
    }

    /// Subscribes to purchase events. Receivers that lag simply miss events;
    /// delivery is best-effort.
    pub fn subscribe(&self) -> broadcast::Receiver<PurchaseEvent> {
        self.events.subscribe()
    }

    /// Applies a gateway outcome. Duplicate and contradictory-late callbacks
    /// are absorbed (gateways redeliver); only an unknown transaction or a
    /// storage failure is an error. Returns the transaction as stored after
    /// the call.
    pub async fn apply(
        &self,
        transaction_id: Uuid,
        outcome: GatewayOutcome,
    ) -> Result<Transaction, ReconcileError> {
        let target = match outcome {
            // Pending never mutates state; it only drives UI display.
            GatewayOutcome::Pending => return self.current(transaction_id).await,
            GatewayOutcome::Success => TransactionStatus::Paid,
            GatewayOutcome::Error => TransactionStatus::Failed,
        };

        match self
            .store
            .update_status(transaction_id, target, TransactionStatus::Open)
            .await
        {
            Ok(tx) => {
                tracing::info!(
                    transaction_id = %tx.id,
                    transaction_code = %tx.code,
                    status = %tx.status,
                    "transaction reconciled"
                );
                if tx.status == TransactionStatus::Paid {
                    // No subscriber is fine; send only fails when nobody
                    // listens.
                    let _ = self.events.send(PurchaseEvent {
                        buyer_id: tx.buyer_id,
                        offering_id: tx.offering_id,
                        transaction_id: tx.id,
                    });
                }
                Ok(tx)
            }
            Err(StoreError::Conflict(reason)) => {
                tracing::info!(
                    transaction_id = %transaction_id,
                    reason = %reason,
                    "duplicate or late gateway callback absorbed"
                );
                self.current(transaction_id).await
            }
            Err(StoreError::NotFound(_)) => Err(ReconcileError::NotFound(transaction_id)),
            Err(other) => Err(ReconcileError::Store(other)),
        }
    }

    async fn current(&self, transaction_id: Uuid) -> Result<Transaction, ReconcileError> {
        self.store
            .get(transaction_id)
            .await
            .map_err(ReconcileError::Store)?
            .ok_or(ReconcileError::NotFound(transaction_id))
    }
}
