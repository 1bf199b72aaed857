//! HTTP client for the external payment gateway, plus the callback payload
//! contract. This module is the only place aware of gateway-specific shapes
//! and status codes; everything else consumes the three generic outcomes.

use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::Transaction;
use crate::ports::{GatewayError, GatewayOutcome, PaymentGateway, PaymentSession};

/// Callback/webhook body as delivered by the gateway. `order_id` carries the
/// transaction's human-readable code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub order_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub gateway_reference: Option<String>,
}

/// Collapses gateway-specific status strings into the generic outcomes the
/// reconciler consumes. Unknown statuses return `None` and must be rejected
/// at the edge, never guessed at.
pub fn translate_status(status: &str) -> Option<GatewayOutcome> {
    match status {
        "settlement" | "capture" | "success" => Some(GatewayOutcome::Success),
        "pending" | "authorize" => Some(GatewayOutcome::Pending),
        "deny" | "cancel" | "expire" | "failure" => Some(GatewayOutcome::Error),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    transaction_code: &'a str,
    amount: String,
    buyer_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// HTTP client for the payment gateway's session endpoint. Re-invoking
/// `create_session` for the same still-open transaction is always safe: the
/// gateway treats a known order code as a continuation, not a new charge.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    server_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, server_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(60), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        HttpPaymentGateway {
            client,
            base_url,
            server_key,
            circuit_breaker,
        }
    }

    /// Current circuit breaker state, exposed for health reporting.
    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_session(&self, tx: &Transaction) -> Result<PaymentSession, GatewayError> {
        let url = format!("{}/v1/sessions", self.base_url.trim_end_matches('/'));
        let body = SessionRequest {
            transaction_code: &tx.code,
            amount: tx.final_price.to_string(),
            buyer_id: tx.buyer_id.to_string(),
        };

        let client = self.client.clone();
        let server_key = self.server_key.clone();
        let request = client
            .post(&url)
            .header("X-Server-Key", server_key)
            .json(&body);

        let result = self
            .circuit_breaker
            .call(async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

                let status = response.status();
                if status.is_server_error() {
                    return Err(GatewayError::Unavailable(format!(
                        "gateway returned {status}"
                    )));
                }
                if !status.is_success() {
                    return Err(GatewayError::InvalidResponse(format!(
                        "gateway returned {status}"
                    )));
                }

                response
                    .json::<SessionResponse>()
                    .await
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
            })
            .await;

        match result {
            Ok(session) => Ok(PaymentSession {
                transaction_id: tx.id,
                transaction_code: tx.code.clone(),
                token: session.token,
                expires_at: session.expires_at,
            }),
            Err(FailsafeError::Rejected) => Err(GatewayError::Unavailable(
                "payment gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}
