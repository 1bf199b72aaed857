//! End-to-end checkout flows over the HTTP surface, backed by the in-memory
//! adapters and a stub gateway.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use coursepay::adapters::memory::{MemoryCatalog, MemoryPromoCodes, MemoryTransactionStore};
use coursepay::domain::{Discount, Offering, PromoCode, Transaction, TransactionStatus};
use coursepay::handlers::webhook::sign_body;
use coursepay::ports::{GatewayError, PaymentGateway, PaymentSession, TransactionStore};
use coursepay::{create_app, AppState};

const WEBHOOK_SECRET: &str = "test-webhook-secret";
const ADMIN_TOKEN: &str = "test-admin-token";

/// Gateway stub: mints a distinct token per call, like the real gateway
/// re-issuing a session for the same order code.
struct StubGateway {
    calls: AtomicU64,
}

impl StubGateway {
    fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_session(&self, tx: &Transaction) -> Result<PaymentSession, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentSession {
            transaction_id: tx.id,
            transaction_code: tx.code.clone(),
            token: format!("stub-token-{n}"),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

struct TestHarness {
    app: Router,
    store: MemoryTransactionStore,
    catalog: MemoryCatalog,
    promos: MemoryPromoCodes,
}

async fn harness() -> TestHarness {
    let store = MemoryTransactionStore::new();
    let catalog = MemoryCatalog::new();
    let promos = MemoryPromoCodes::new();
    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(catalog.clone()),
        Arc::new(promos.clone()),
        Arc::new(StubGateway::new()),
        WEBHOOK_SECRET.to_string(),
        ADMIN_TOKEN.to_string(),
        None,
    );
    TestHarness {
        app: create_app(state),
        store,
        catalog,
        promos,
    }
}

fn offering_10pct() -> Offering {
    Offering {
        id: Uuid::new_v4(),
        kind: "batch".to_string(),
        base_price: BigDecimal::from(500_000),
        discount: Some(Discount::Percentage(BigDecimal::from(10))),
        active: true,
        valid_from: None,
        valid_until: None,
        promo_allowed: true,
    }
}

fn promo_hemat50() -> PromoCode {
    PromoCode {
        code: "HEMAT50".to_string(),
        discount: Discount::Fixed(BigDecimal::from(50_000)),
        active: true,
        valid_from: None,
        valid_until: None,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Money fields serialize per BigDecimal's serde; compare numerically.
fn dec(v: &Value) -> BigDecimal {
    match v {
        Value::String(s) => s.parse().unwrap(),
        Value::Number(n) => n.to_string().parse().unwrap(),
        other => panic!("not a decimal field: {other:?}"),
    }
}

async fn checkout(
    app: &Router,
    buyer: Uuid,
    offering: Uuid,
    promo: Option<&str>,
    force_new: bool,
) -> (StatusCode, Value) {
    send(
        app,
        post_json(
            "/checkout",
            json!({
                "buyer_id": buyer,
                "offering_id": offering,
                "promo_code": promo,
                "force_new": force_new,
            }),
        ),
    )
    .await
}

#[tokio::test]
async fn preview_applies_offering_discount() {
    let h = harness().await;
    let offering = offering_10pct();
    let id = offering.id;
    h.catalog.insert(offering).await;

    let (status, body) = send(&h.app, get(&format!("/checkout/preview?offering_id={id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec(&body["final_price"]), BigDecimal::from(450_000));
    assert_eq!(dec(&body["offering_discount"]), BigDecimal::from(50_000));
}

#[tokio::test]
async fn preview_stacks_promo_against_original_base() {
    let h = harness().await;
    let offering = offering_10pct();
    let id = offering.id;
    h.catalog.insert(offering).await;
    h.promos.insert(promo_hemat50()).await;

    let (status, body) = send(
        &h.app,
        get(&format!("/checkout/preview?offering_id={id}&promo_code=hemat50")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // 500,000 - 50,000 (10%) - 50,000 (promo) = 400,000
    assert_eq!(dec(&body["final_price"]), BigDecimal::from(400_000));
}

#[tokio::test]
async fn checkout_persists_the_previewed_price() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;
    h.promos.insert(promo_hemat50()).await;

    let (status, body) = checkout(&h.app, Uuid::new_v4(), offering_id, Some("HEMAT50"), false).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "open");
    assert_eq!(body["promo_code"], "HEMAT50");
    assert_eq!(body["offering_kind"], "batch");
    assert_eq!(dec(&body["final_price"]), BigDecimal::from(400_000));
    assert!(body["code"].as_str().unwrap().starts_with("TRX-"));
}

#[tokio::test]
async fn missing_offering_is_typed_not_found() {
    let h = harness().await;
    let (status, body) = checkout(&h.app, Uuid::new_v4(), Uuid::new_v4(), None, false).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "offering_not_found");
}

#[tokio::test]
async fn inactive_offering_is_not_purchasable() {
    let h = harness().await;
    let mut offering = offering_10pct();
    offering.active = false;
    let id = offering.id;
    h.catalog.insert(offering).await;

    let (status, body) = checkout(&h.app, Uuid::new_v4(), id, None, false).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "offering_not_found");
}

#[tokio::test]
async fn second_checkout_reports_the_existing_open_transaction() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;
    let buyer = Uuid::new_v4();

    let (_, first) = checkout(&h.app, buyer, offering_id, None, false).await;
    let first_code = first["code"].as_str().unwrap().to_string();

    let (status, body) = checkout(&h.app, buyer, offering_id, None, false).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "open_transaction_exists");
    assert_eq!(body["transaction_code"], first_code.as_str());
    // Still exactly one record: the caller resumes, nothing was created.
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn force_new_replaces_the_open_transaction() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;
    let buyer = Uuid::new_v4();

    let (_, first) = checkout(&h.app, buyer, offering_id, None, false).await;
    let first_id: Uuid = serde_json::from_value(first["id"].clone()).unwrap();
    let first_code = first["code"].as_str().unwrap().to_string();

    let (status, body) = checkout(&h.app, buyer, offering_id, None, true).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(body["code"].as_str().unwrap(), first_code.as_str());

    // The discarded transaction is gone, only the new one remains open.
    assert!(h.store.get(first_id).await.unwrap().is_none());
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn paid_offering_cannot_be_purchased_again() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;
    let buyer = Uuid::new_v4();

    let (_, first) = checkout(&h.app, buyer, offering_id, None, false).await;
    let id: Uuid = serde_json::from_value(first["id"].clone()).unwrap();
    h.store
        .update_status(id, TransactionStatus::Paid, TransactionStatus::Open)
        .await
        .unwrap();

    for force_new in [false, true] {
        let (status, body) = checkout(&h.app, buyer, offering_id, None, force_new).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already_purchased");
        assert_eq!(body["transaction_id"], json!(id));
    }
}

#[tokio::test]
async fn promo_on_disallowing_offering_is_rejected() {
    let h = harness().await;
    let mut offering = offering_10pct();
    offering.promo_allowed = false;
    let id = offering.id;
    h.catalog.insert(offering).await;
    h.promos.insert(promo_hemat50()).await;

    let (status, body) = checkout(&h.app, Uuid::new_v4(), id, Some("HEMAT50"), false).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "promo_not_allowed");
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn unknown_promo_is_rejected() {
    let h = harness().await;
    let offering = offering_10pct();
    let id = offering.id;
    h.catalog.insert(offering).await;

    let (status, body) = checkout(&h.app, Uuid::new_v4(), id, Some("NOPE"), false).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "promo_invalid");
}

#[tokio::test]
async fn session_reissue_returns_fresh_token_for_same_transaction() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;

    let (_, tx) = checkout(&h.app, Uuid::new_v4(), offering_id, None, false).await;
    let id = tx["id"].as_str().unwrap();

    let (status, first) = send(
        &h.app,
        post_json(&format!("/transactions/{id}/session"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, second) = send(
        &h.app,
        post_json(&format!("/transactions/{id}/session"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_ne!(first["token"], second["token"]);
    assert_eq!(first["transaction_code"], second["transaction_code"]);
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn session_for_paid_transaction_is_invalid_state() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;

    let (_, tx) = checkout(&h.app, Uuid::new_v4(), offering_id, None, false).await;
    let id: Uuid = serde_json::from_value(tx["id"].clone()).unwrap();
    h.store
        .update_status(id, TransactionStatus::Paid, TransactionStatus::Open)
        .await
        .unwrap();

    let (status, body) = send(
        &h.app,
        post_json(&format!("/transactions/{id}/session"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");
}

fn signed_callback(code: &str, gateway_status: &str) -> Request<Body> {
    let body = json!({
        "order_id": code,
        "transaction_status": gateway_status,
        "gateway_reference": "gw-ref-1",
    })
    .to_string();
    let signature = sign_body(WEBHOOK_SECRET, body.as_bytes());
    Request::builder()
        .method("POST")
        .uri("/payments/callback")
        .header("content-type", "application/json")
        .header("x-callback-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn redelivered_success_callback_is_absorbed() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;

    let (_, tx) = checkout(&h.app, Uuid::new_v4(), offering_id, None, false).await;
    let code = tx["code"].as_str().unwrap().to_string();

    let (status, body) = send(&h.app, signed_callback(&code, "settlement")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paid");

    // Gateway redelivers the same message later; no error, still paid.
    let (status, body) = send(&h.app, signed_callback(&code, "settlement")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paid");
}

#[tokio::test]
async fn unsigned_callback_is_rejected() {
    let h = harness().await;
    let body = json!({"order_id": "TRX-X", "transaction_status": "settlement"}).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/payments/callback")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn pending_callback_leaves_transaction_open() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;

    let (_, tx) = checkout(&h.app, Uuid::new_v4(), offering_id, None, false).await;
    let code = tx["code"].as_str().unwrap().to_string();

    let (status, body) = send(&h.app, signed_callback(&code, "pending")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "open");
}

#[tokio::test]
async fn failure_callback_marks_transaction_failed() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;

    let (_, tx) = checkout(&h.app, Uuid::new_v4(), offering_id, None, false).await;
    let code = tx["code"].as_str().unwrap().to_string();

    let (status, body) = send(&h.app, signed_callback(&code, "expire")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
}

#[tokio::test]
async fn poll_endpoints_return_the_transaction() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;

    let (_, tx) = checkout(&h.app, Uuid::new_v4(), offering_id, None, false).await;
    let id = tx["id"].as_str().unwrap();
    let code = tx["code"].as_str().unwrap();

    let (status, by_id) = send(&h.app, get(&format!("/transactions/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, by_code) = send(&h.app, get(&format!("/transactions/code/{code}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_id["id"], by_code["id"]);
}

#[tokio::test]
async fn admin_mark_paid_requires_token_and_audits_state() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;

    let (_, tx) = checkout(&h.app, Uuid::new_v4(), offering_id, None, false).await;
    let id = tx["id"].as_str().unwrap();

    let unauthorized = post_json(&format!("/admin/transactions/{id}/mark-paid"), json!({}));
    let (status, _) = send(&h.app, unauthorized).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/admin/transactions/{id}/mark-paid"))
        .header("content-type", "application/json")
        .header("x-admin-token", ADMIN_TOKEN)
        .header("x-admin-actor", "ops-rina")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paid");
}

#[tokio::test]
async fn admin_purge_deletes_regardless_of_status() {
    let h = harness().await;
    let offering = offering_10pct();
    let offering_id = offering.id;
    h.catalog.insert(offering).await;

    let (_, tx) = checkout(&h.app, Uuid::new_v4(), offering_id, None, false).await;
    let id: Uuid = serde_json::from_value(tx["id"].clone()).unwrap();
    h.store
        .update_status(id, TransactionStatus::Failed, TransactionStatus::Open)
        .await
        .unwrap();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/admin/transactions/{id}"))
        .header("x-admin-token", ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(h.store.get(id).await.unwrap().is_none());
}

#[tokio::test]
async fn health_reports_in_memory_backend() {
    let h = harness().await;
    let (status, body) = send(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["db"], "in-memory");
}
