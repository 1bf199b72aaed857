//! The transaction orchestrator: creates or replaces purchase transactions,
//! enforces the already-purchased and single-open invariants, and asks the
//! gateway for payment sessions.

use std::sync::Arc;

use rand::distributions::{Alphanumeric, DistString};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{pricing, Offering, PriceBreakdown, Transaction, TransactionStatus};
use crate::ports::{Catalog, GatewayError, PaymentGateway, PaymentSession, StoreError, TransactionStore};
use crate::services::promo::{PromoRejection, PromoValidator};

/// Attempts at generating a collision-free transaction code before giving up.
const CODE_ATTEMPTS: usize = 5;

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("offering {0} not found or not purchasable")]
    OfferingNotFound(Uuid),

    /// Hard business invariant: at most one PAID transaction per
    /// (buyer, offering). Carries the existing transaction so the caller
    /// can redirect to it.
    #[error("offering already purchased (transaction {transaction_code})")]
    AlreadyPurchased {
        transaction_id: Uuid,
        transaction_code: String,
    },

    /// Not a failure but a disambiguation signal: the caller decides whether
    /// to resume the referenced transaction or retry with `force_new`.
    #[error("an open transaction already exists ({transaction_code})")]
    OpenTransactionExists {
        transaction_id: Uuid,
        transaction_code: String,
    },

    #[error("promo code rejected: {0}")]
    PromoInvalid(PromoRejection),

    #[error("offering does not accept promo codes")]
    PromoNotAllowed,

    /// A concurrent writer won a storage race and a single re-read retry did
    /// not resolve it.
    #[error("conflicting concurrent checkout, retry the request")]
    Conflict,

    #[error("transaction {0} not found")]
    NotFound(Uuid),

    #[error("transaction {id} is {status}, expected open")]
    InvalidState { id: Uuid, status: TransactionStatus },

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CheckoutError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => CheckoutError::Conflict,
            other => CheckoutError::Store(other),
        }
    }
}

impl From<GatewayError> for CheckoutError {
    fn from(e: GatewayError) -> Self {
        CheckoutError::GatewayUnavailable(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub buyer_id: Uuid,
    pub offering_id: Uuid,
    pub promo_code: Option<String>,
    /// When true, an existing OPEN transaction for the pair is discarded and
    /// replaced instead of being reported back.
    pub force_new: bool,
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn TransactionStore>,
    catalog: Arc<dyn Catalog>,
    promos: PromoValidator,
    gateway: Arc<dyn PaymentGateway>,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        catalog: Arc<dyn Catalog>,
        promos: PromoValidator,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            store,
            catalog,
            promos,
            gateway,
        }
    }

    /// Creates (or, with `force_new`, replaces) the OPEN transaction for a
    /// (buyer, offering) pair. A storage `Conflict` gets one automatic
    /// retry of the whole flow: the re-read then observes whatever the
    /// concurrent winner wrote and reports it properly.
    pub async fn initiate_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<Transaction, CheckoutError> {
        match self.try_checkout(&request).await {
            Err(CheckoutError::Conflict) => {
                tracing::warn!(
                    buyer_id = %request.buyer_id,
                    offering_id = %request.offering_id,
                    "checkout lost a storage race, retrying once"
                );
                self.try_checkout(&request).await
            }
            other => other,
        }
    }

    async fn try_checkout(&self, request: &CheckoutRequest) -> Result<Transaction, CheckoutError> {
        let offering = self.load_offering(request.offering_id).await?;

        if let Some(paid) = self
            .store
            .find_paid(request.buyer_id, request.offering_id)
            .await?
        {
            return Err(CheckoutError::AlreadyPurchased {
                transaction_id: paid.id,
                transaction_code: paid.code,
            });
        }

        let existing_open = self
            .store
            .find_open(request.buyer_id, request.offering_id)
            .await?;
        let replace_id = match existing_open {
            Some(open) if !request.force_new => {
                return Err(CheckoutError::OpenTransactionExists {
                    transaction_id: open.id,
                    transaction_code: open.code,
                });
            }
            Some(open) => Some(open.id),
            None => None,
        };

        let promo = match &request.promo_code {
            None => None,
            Some(raw) => {
                if !offering.promo_allowed {
                    return Err(CheckoutError::PromoNotAllowed);
                }
                match self.promos.validate(raw).await? {
                    Ok(promo) => Some(promo),
                    Err(rejection) => return Err(CheckoutError::PromoInvalid(rejection)),
                }
            }
        };

        let code = self.generate_code().await?;
        let tx = Transaction::new(code, request.buyer_id, &offering, promo.as_ref());

        let created = match replace_id {
            // Delete-then-create runs inside one storage transaction; if a
            // concurrent callback already resolved the old record, the store
            // reports Conflict and nothing is written.
            Some(old_id) => self.store.replace_open(old_id, &tx).await?,
            None => self.store.create(&tx).await?,
        };

        tracing::info!(
            transaction_id = %created.id,
            transaction_code = %created.code,
            buyer_id = %created.buyer_id,
            offering_id = %created.offering_id,
            final_price = %created.final_price,
            replaced = replace_id.is_some(),
            "checkout transaction created"
        );
        Ok(created)
    }

    /// Asks the gateway for a session token scoped to an OPEN transaction.
    /// Safe to call again after the buyer navigated away: the same
    /// transaction gets a fresh token, never a second record.
    pub async fn issue_payment_session(
        &self,
        transaction_id: Uuid,
    ) -> Result<PaymentSession, CheckoutError> {
        let tx = self
            .store
            .get(transaction_id)
            .await?
            .ok_or(CheckoutError::NotFound(transaction_id))?;

        if tx.status != TransactionStatus::Open {
            return Err(CheckoutError::InvalidState {
                id: tx.id,
                status: tx.status,
            });
        }

        let session = self.gateway.create_session(&tx).await?;
        tracing::info!(
            transaction_id = %tx.id,
            transaction_code = %tx.code,
            "payment session issued"
        );
        Ok(session)
    }

    /// Display-time price breakdown, computed by the same calculator used at
    /// creation time so previews always match what gets persisted.
    pub async fn preview_price(
        &self,
        offering_id: Uuid,
        promo_code: Option<&str>,
    ) -> Result<PriceBreakdown, CheckoutError> {
        let offering = self.load_offering(offering_id).await?;
        let promo = match promo_code {
            None => None,
            Some(raw) => {
                if !offering.promo_allowed {
                    return Err(CheckoutError::PromoNotAllowed);
                }
                match self.promos.validate(raw).await? {
                    Ok(promo) => Some(promo),
                    Err(rejection) => return Err(CheckoutError::PromoInvalid(rejection)),
                }
            }
        };
        Ok(pricing::compute(
            &offering.base_price,
            offering.discount.as_ref(),
            promo.as_ref().map(|p| &p.discount),
        ))
    }

    async fn load_offering(&self, offering_id: Uuid) -> Result<Offering, CheckoutError> {
        let offering = self
            .catalog
            .offering(offering_id)
            .await?
            .ok_or(CheckoutError::OfferingNotFound(offering_id))?;
        if !offering.purchasable_at(chrono::Utc::now()) {
            return Err(CheckoutError::OfferingNotFound(offering_id));
        }
        Ok(offering)
    }

    /// Generates a short gateway-facing code, re-rolling on collision
    /// instead of failing the whole checkout.
    async fn generate_code(&self) -> Result<String, CheckoutError> {
        for _ in 0..CODE_ATTEMPTS {
            let code = generate_candidate();
            if self.store.get_by_code(&code).await?.is_none() {
                return Ok(code);
            }
        }
        Err(CheckoutError::Conflict)
    }
}

fn generate_candidate() -> String {
    let suffix = Alphanumeric
        .sample_string(&mut rand::thread_rng(), 8)
        .to_uppercase();
    format!("TRX-{suffix}")
}
