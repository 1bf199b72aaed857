pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod services;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::ports::{Catalog, PaymentGateway, PromoCodes, TransactionStore};
use crate::services::{CheckoutService, PromoValidator, Reconciler};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TransactionStore>,
    pub checkout: CheckoutService,
    pub reconciler: Reconciler,
    pub webhook_secret: String,
    pub admin_token: String,
    /// Present when backed by Postgres; used by the health report.
    pub db: Option<sqlx::PgPool>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        catalog: Arc<dyn Catalog>,
        promo_codes: Arc<dyn PromoCodes>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: String,
        admin_token: String,
        db: Option<sqlx::PgPool>,
    ) -> Self {
        let promos = PromoValidator::new(promo_codes);
        let checkout = CheckoutService::new(store.clone(), catalog, promos, gateway);
        let reconciler = Reconciler::new(store.clone());
        Self {
            store,
            checkout,
            reconciler,
            webhook_secret,
            admin_token,
            db,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/checkout", post(handlers::checkout::initiate))
        .route("/checkout/preview", get(handlers::checkout::preview))
        .route("/transactions/:id", get(handlers::checkout::get_transaction))
        .route("/transactions/code/:code", get(handlers::checkout::get_by_code))
        .route("/transactions/:id/session", post(handlers::checkout::issue_session))
        .route("/payments/callback", post(handlers::webhook::callback))
        .route("/admin/transactions/:id/mark-paid", post(handlers::admin::mark_paid))
        .route("/admin/transactions/:id", delete(handlers::admin::purge))
        .with_state(state)
}
