//! The payment service's network boundary.
//!
//! `PaymentEndpoint` is the server half: it decodes a JSON `PaymentRequest`,
//! runs the ledger's create-then-resolve path and encodes a `PaymentReply`.
//! `LocalPaymentClient` is the order service's half and talks to an endpoint
//! through the same JSON bytes a remote call would carry.

use crate::application::payment_ledger::{Admission, PaymentLedger};
use crate::domain::payment::{NewPayment, PaymentId, PaymentReply, PaymentRequest};
use crate::domain::ports::PaymentClient;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct PaymentEndpoint {
    ledger: Arc<PaymentLedger>,
}

impl PaymentEndpoint {
    pub fn new(ledger: Arc<PaymentLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &PaymentLedger {
        &self.ledger
    }

    /// Creates the payment and, when it is new, resolves it through the gateway.
    pub async fn process(&self, request: PaymentRequest) -> PaymentReply {
        let new = match NewPayment::try_from(request) {
            Ok(new) => new,
            Err(err) => return rejected(err),
        };

        match self.ledger.create(new).await {
            Ok(Admission::Duplicate(payment)) => PaymentReply::Duplicate { payment },
            Ok(Admission::Accepted(payment)) => match self.ledger.resolve(&payment.id).await {
                Ok(payment) => PaymentReply::Processed { payment },
                Err(AppError::AlreadyProcessed(_)) => match self.ledger.get_by_id(&payment.id).await {
                    Ok(payment) => PaymentReply::Duplicate { payment },
                    Err(err) => rejected(err),
                },
                Err(err) => rejected(err),
            },
            Err(err) => rejected(err),
        }
    }

    pub async fn status(&self, id: &PaymentId) -> PaymentReply {
        match self.ledger.get_by_id(id).await {
            Ok(payment) => PaymentReply::Processed { payment },
            Err(err) => rejected(err),
        }
    }

    /// Handles an encoded payment request. Undecodable bodies get a `rejected` reply.
    pub async fn handle(&self, body: &[u8]) -> Result<Vec<u8>> {
        let reply = match serde_json::from_slice::<PaymentRequest>(body) {
            Ok(request) => self.process(request).await,
            Err(err) => PaymentReply::Rejected {
                error: format!("malformed payment request: {err}"),
            },
        };
        Ok(serde_json::to_vec(&reply)?)
    }

    pub async fn handle_status(&self, id: &PaymentId) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.status(id).await)?)
    }
}

fn rejected(err: AppError) -> PaymentReply {
    warn!(error = %err, "payment request rejected");
    PaymentReply::Rejected {
        error: err.to_string(),
    }
}

/// In-process client for a `PaymentEndpoint`, with optional simulated network latency.
///
/// Once a request has crossed the simulated wire, the endpoint handles it on its
/// own task. Dropping the caller's future (e.g. on a client-side timeout) does not
/// cancel the payment service mid-request.
#[derive(Clone)]
pub struct LocalPaymentClient {
    endpoint: PaymentEndpoint,
    latency: Duration,
}

impl LocalPaymentClient {
    pub fn new(endpoint: PaymentEndpoint) -> Self {
        Self {
            endpoint,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn wire_delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl PaymentClient for LocalPaymentClient {
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentReply> {
        let body = serde_json::to_vec(&request)?;
        self.wire_delay().await;
        let endpoint = self.endpoint.clone();
        let reply = tokio::spawn(async move { endpoint.handle(&body).await })
            .await
            .map_err(|err| AppError::Transport(format!("payment endpoint task failed: {err}")))??;
        Ok(serde_json::from_slice(&reply)?)
    }

    async fn payment_status(&self, id: &PaymentId) -> Result<PaymentReply> {
        self.wire_delay().await;
        let endpoint = self.endpoint.clone();
        let id = id.clone();
        let reply = tokio::spawn(async move { endpoint.handle_status(&id).await })
            .await
            .map_err(|err| AppError::Transport(format!("payment endpoint task failed: {err}")))??;
        Ok(serde_json::from_slice(&reply)?)
    }
}

/// A payment service that cannot be reached.
#[derive(Debug, Clone, Default)]
pub struct OfflinePaymentClient;

#[async_trait]
impl PaymentClient for OfflinePaymentClient {
    async fn process_payment(&self, _request: PaymentRequest) -> Result<PaymentReply> {
        Err(AppError::Transport("payment service unreachable".to_string()))
    }

    async fn payment_status(&self, _id: &PaymentId) -> Result<PaymentReply> {
        Err(AppError::Transport("payment service unreachable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::idempotency::IdempotencyKey;
    use crate::domain::money::Currency;
    use crate::domain::order::OrderId;
    use crate::domain::payment::{PaymentMethod, PaymentStatus};
    use crate::infrastructure::gateway::{DeclineRule, GatewayConfig, SimulatedGateway};
    use crate::infrastructure::in_memory::InMemoryPaymentStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn endpoint() -> PaymentEndpoint {
        let gateway = SimulatedGateway::new(GatewayConfig {
            delay: Duration::ZERO,
            decline: DeclineRule::default(),
        });
        PaymentEndpoint::new(Arc::new(PaymentLedger::new(
            Box::new(InMemoryPaymentStore::new()),
            Box::new(gateway),
        )))
    }

    fn request(key: &str, amount: Decimal) -> PaymentRequest {
        PaymentRequest {
            order_id: OrderId::new("ord_1"),
            amount,
            currency: Currency::Gbp,
            method: PaymentMethod::BankTransfer,
            customer_id: "cust_1".to_string(),
            idempotency_key: IdempotencyKey::new(key),
        }
    }

    #[tokio::test]
    async fn test_process_then_replay() {
        let endpoint = endpoint();

        let PaymentReply::Processed { payment: first } = endpoint.process(request("k", dec!(20))).await
        else {
            panic!("expected processed reply");
        };
        assert_eq!(first.status, PaymentStatus::Completed);

        let PaymentReply::Duplicate { payment: again } = endpoint.process(request("k", dec!(20))).await
        else {
            panic!("expected duplicate reply");
        };
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let endpoint = endpoint();
        let reply = endpoint.process(request("k", dec!(-1))).await;
        assert!(matches!(reply, PaymentReply::Rejected { .. }));
        assert!(endpoint.ledger().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handle_malformed_body() {
        let endpoint = endpoint();
        let bytes = endpoint.handle(b"{not json").await.unwrap();
        let reply: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(reply["outcome"], "rejected");
        assert!(
            reply["error"]
                .as_str()
                .unwrap()
                .starts_with("malformed payment request")
        );
    }

    #[tokio::test]
    async fn test_local_client_round_trip() {
        let endpoint = endpoint();
        let client = LocalPaymentClient::new(endpoint.clone());

        let reply = client.process_payment(request("k", dec!(666))).await.unwrap();
        let PaymentReply::Processed { payment } = reply else {
            panic!("expected processed reply");
        };
        assert_eq!(payment.status, PaymentStatus::Failed);

        let status = client.payment_status(&payment.id).await.unwrap();
        assert_eq!(status, PaymentReply::Processed { payment });

        let missing = client
            .payment_status(&PaymentId::new("pay_missing"))
            .await
            .unwrap();
        assert!(matches!(missing, PaymentReply::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_offline_client_is_a_transport_failure() {
        let err = OfflinePaymentClient
            .process_payment(request("k", dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
    }
}
