//! In-memory implementations of the store ports, used by the integration
//! tests and for running the service without Postgres. They enforce the same
//! uniqueness and conditional-update semantics as the Postgres adapter: all
//! writes happen under one mutex, so delete+create in `replace_open` is
//! atomic with respect to concurrent reconciliation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Offering, PromoCode, Transaction, TransactionStatus};
use crate::ports::{Catalog, PromoCodes, StoreError, StoreResult, TransactionStore};

#[derive(Clone, Default)]
pub struct MemoryTransactionStore {
    inner: Arc<Mutex<HashMap<Uuid, Transaction>>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored transactions, for test assertions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

fn check_uniqueness(
    map: &HashMap<Uuid, Transaction>,
    candidate: &Transaction,
) -> StoreResult<()> {
    if map.values().any(|t| t.code == candidate.code) {
        return Err(StoreError::Conflict(format!(
            "transaction code {} already exists",
            candidate.code
        )));
    }
    let open_exists = map.values().any(|t| {
        t.buyer_id == candidate.buyer_id
            && t.offering_id == candidate.offering_id
            && t.status == TransactionStatus::Open
    });
    if open_exists {
        return Err(StoreError::Conflict(format!(
            "open transaction already exists for buyer {} and offering {}",
            candidate.buyer_id, candidate.offering_id
        )));
    }
    Ok(())
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn create(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let mut map = self.inner.lock().await;
        check_uniqueness(&map, tx)?;
        map.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn replace_open(&self, old_id: Uuid, tx: &Transaction) -> StoreResult<Transaction> {
        let mut map = self.inner.lock().await;
        // A vanished record means another writer already replaced or purged
        // it, the same situation the Postgres adapter detects as zero rows
        // deleted. Both cases are Conflict so the caller's retry path fires.
        match map.get(&old_id) {
            None => {
                return Err(StoreError::Conflict(format!(
                    "transaction {old_id} is no longer open"
                )));
            }
            Some(old) if old.status != TransactionStatus::Open => {
                return Err(StoreError::Conflict(format!(
                    "transaction {old_id} is {}, expected open",
                    old.status
                )));
            }
            Some(_) => {}
        }
        // The lock covers both halves, so delete+create is atomic. Put the
        // old record back if the insert would violate uniqueness.
        let old = map.remove(&old_id);
        if let Err(e) = check_uniqueness(&map, tx) {
            if let Some(old) = old {
                map.insert(old_id, old);
            }
            return Err(e);
        }
        map.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        Ok(self.inner.lock().await.get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> StoreResult<Option<Transaction>> {
        Ok(self
            .inner
            .lock()
            .await
            .values()
            .find(|t| t.code == code)
            .cloned())
    }

    async fn find_open(
        &self,
        buyer_id: Uuid,
        offering_id: Uuid,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .inner
            .lock()
            .await
            .values()
            .find(|t| {
                t.buyer_id == buyer_id
                    && t.offering_id == offering_id
                    && t.status == TransactionStatus::Open
            })
            .cloned())
    }

    async fn find_paid(
        &self,
        buyer_id: Uuid,
        offering_id: Uuid,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .inner
            .lock()
            .await
            .values()
            .find(|t| {
                t.buyer_id == buyer_id
                    && t.offering_id == offering_id
                    && t.status == TransactionStatus::Paid
            })
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        new_status: TransactionStatus,
        expected: TransactionStatus,
    ) -> StoreResult<Transaction> {
        let mut map = self.inner.lock().await;
        let tx = map
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {id}")))?;
        if tx.status != expected {
            return Err(StoreError::Conflict(format!(
                "transaction {id} is {}, expected {expected}",
                tx.status
            )));
        }
        tx.status = new_status;
        tx.updated_at = Utc::now();
        Ok(tx.clone())
    }

    async fn delete_open(&self, id: Uuid) -> StoreResult<()> {
        let mut map = self.inner.lock().await;
        match map.get(&id) {
            None => Err(StoreError::NotFound(format!("transaction {id}"))),
            Some(tx) if tx.status != TransactionStatus::Open => Err(StoreError::Conflict(
                format!("transaction {id} is {}, expected open", tx.status),
            )),
            Some(_) => {
                map.remove(&id);
                Ok(())
            }
        }
    }

    async fn force_status(
        &self,
        id: Uuid,
        new_status: TransactionStatus,
    ) -> StoreResult<Transaction> {
        let mut map = self.inner.lock().await;
        let tx = map
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {id}")))?;
        tx.status = new_status;
        tx.updated_at = Utc::now();
        Ok(tx.clone())
    }

    async fn purge(&self, id: Uuid) -> StoreResult<()> {
        self.inner
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("transaction {id}")))
    }
}

#[derive(Clone, Default)]
pub struct MemoryCatalog {
    offerings: Arc<Mutex<HashMap<Uuid, Offering>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, offering: Offering) {
        self.offerings.lock().await.insert(offering.id, offering);
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn offering(&self, id: Uuid) -> StoreResult<Option<Offering>> {
        Ok(self.offerings.lock().await.get(&id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct MemoryPromoCodes {
    codes: Arc<Mutex<HashMap<String, PromoCode>>>,
}

impl MemoryPromoCodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, promo: PromoCode) {
        self.codes.lock().await.insert(promo.code.clone(), promo);
    }
}

#[async_trait]
impl PromoCodes for MemoryPromoCodes {
    async fn find(&self, code: &str) -> StoreResult<Option<PromoCode>> {
        Ok(self.codes.lock().await.get(code).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn offering() -> Offering {
        Offering {
            id: Uuid::new_v4(),
            kind: "batch".to_string(),
            base_price: BigDecimal::from(500_000),
            discount: None,
            active: true,
            valid_from: None,
            valid_until: None,
            promo_allowed: true,
        }
    }

    fn transaction(buyer: Uuid, offering: &Offering, code: &str) -> Transaction {
        Transaction::new(code.to_string(), buyer, offering, None)
    }

    #[tokio::test]
    async fn create_rejects_second_open_for_same_pair() {
        let store = MemoryTransactionStore::new();
        let buyer = Uuid::new_v4();
        let o = offering();
        store.create(&transaction(buyer, &o, "TRX-A")).await.unwrap();
        let err = store.create(&transaction(buyer, &o, "TRX-B")).await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_code() {
        let store = MemoryTransactionStore::new();
        let o = offering();
        store
            .create(&transaction(Uuid::new_v4(), &o, "TRX-A"))
            .await
            .unwrap();
        let err = store.create(&transaction(Uuid::new_v4(), &o, "TRX-A")).await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn update_status_is_conditional() {
        let store = MemoryTransactionStore::new();
        let o = offering();
        let tx = store
            .create(&transaction(Uuid::new_v4(), &o, "TRX-A"))
            .await
            .unwrap();

        let paid = store
            .update_status(tx.id, TransactionStatus::Paid, TransactionStatus::Open)
            .await
            .unwrap();
        assert_eq!(paid.status, TransactionStatus::Paid);

        // Second identical transition loses the expected-status check.
        let err = store
            .update_status(tx.id, TransactionStatus::Paid, TransactionStatus::Open)
            .await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn replace_open_refuses_terminal_records() {
        let store = MemoryTransactionStore::new();
        let buyer = Uuid::new_v4();
        let o = offering();
        let tx = store.create(&transaction(buyer, &o, "TRX-A")).await.unwrap();
        store
            .update_status(tx.id, TransactionStatus::Paid, TransactionStatus::Open)
            .await
            .unwrap();

        let err = store
            .replace_open(tx.id, &transaction(buyer, &o, "TRX-B"))
            .await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
        // The paid record is untouched.
        assert_eq!(
            store.get(tx.id).await.unwrap().unwrap().status,
            TransactionStatus::Paid
        );
    }

    #[tokio::test]
    async fn replace_open_reports_conflict_when_record_vanished() {
        let store = MemoryTransactionStore::new();
        let buyer = Uuid::new_v4();
        let o = offering();
        let tx = store.create(&transaction(buyer, &o, "TRX-A")).await.unwrap();
        store.purge(tx.id).await.unwrap();

        // A concurrent replace or purge got there first. Conflict (not
        // NotFound) keeps the retry contract of the checkout path intact.
        let err = store
            .replace_open(tx.id, &transaction(buyer, &o, "TRX-B"))
            .await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn delete_open_refuses_paid() {
        let store = MemoryTransactionStore::new();
        let o = offering();
        let tx = store
            .create(&transaction(Uuid::new_v4(), &o, "TRX-A"))
            .await
            .unwrap();
        store
            .update_status(tx.id, TransactionStatus::Paid, TransactionStatus::Open)
            .await
            .unwrap();
        assert!(matches!(
            store.delete_open(tx.id).await,
            Err(StoreError::Conflict(_))
        ));
        // purge is the operator override and ignores status.
        store.purge(tx.id).await.unwrap();
        assert!(store.get(tx.id).await.unwrap().is_none());
    }
}
