use crate::domain::idempotency::IdempotencyKey;
use crate::domain::order::OrderId;
use crate::domain::payment::{NewPayment, Payment, PaymentId, PaymentStats, PaymentStatus};
use crate::domain::ports::{PaymentGatewayBox, PaymentStoreBox};
use crate::error::{AppError, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub const DECLINE_MESSAGE: &str = "Payment declined by gateway";

/// Result of admitting a candidate payment into the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// A new row was committed under the candidate's key.
    Accepted(Payment),
    /// A row already exists under the candidate's key; this is that row.
    Duplicate(Payment),
}

impl Admission {
    pub fn payment(&self) -> &Payment {
        match self {
            Admission::Accepted(payment) | Admission::Duplicate(payment) => payment,
        }
    }

    pub fn into_payment(self) -> Payment {
        match self {
            Admission::Accepted(payment) | Admission::Duplicate(payment) => payment,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Admission::Duplicate(_))
    }
}

/// The payment processor's authoritative ledger.
///
/// Owns the one-row-per-idempotency-key invariant. The store's unique key index
/// is the source of truth; the lookup before insert only saves a write.
pub struct PaymentLedger {
    store: PaymentStoreBox,
    gateway: PaymentGatewayBox,
}

impl PaymentLedger {
    pub fn new(store: PaymentStoreBox, gateway: PaymentGatewayBox) -> Self {
        Self { store, gateway }
    }

    /// Admits a candidate payment, or returns the row already committed under its key.
    #[instrument(skip_all, fields(order_id = %new.order_id, idempotency_key = %new.idempotency_key))]
    pub async fn create(&self, new: NewPayment) -> Result<Admission> {
        new.validate()?;

        if let Some(existing) = self.store.get_by_idempotency_key(&new.idempotency_key).await? {
            debug!(payment_id = %existing.id, "idempotency key already committed");
            return Ok(Admission::Duplicate(existing));
        }

        let key = new.idempotency_key.clone();
        let payment = Payment::accept(new, Utc::now());
        match self.store.insert(payment.clone()).await {
            Ok(()) => {
                info!(payment_id = %payment.id, amount = %payment.amount, "payment accepted");
                Ok(Admission::Accepted(payment))
            }
            Err(AppError::DuplicateIdempotencyKey(_)) => {
                // Lost the race after the lookup; the winner's row is committed.
                let winner = self.store.get_by_idempotency_key(&key).await?.ok_or_else(|| {
                    AppError::Persistence(format!("duplicate key {key} has no committed row"))
                })?;
                debug!(payment_id = %winner.id, "concurrent create resolved to existing row");
                Ok(Admission::Duplicate(winner))
            }
            Err(err) => Err(err),
        }
    }

    /// Drives a `pending` payment through the gateway to a terminal status.
    #[instrument(skip(self), fields(payment_id = %id))]
    pub async fn resolve(&self, id: &PaymentId) -> Result<Payment> {
        let mut payment = self.get_by_id(id).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(AppError::AlreadyProcessed(id.to_string()));
        }

        payment.status = PaymentStatus::Processing;
        if !self
            .store
            .update_if(PaymentStatus::Pending, payment.clone())
            .await?
        {
            return Err(AppError::AlreadyProcessed(id.to_string()));
        }

        let accepted = self
            .gateway
            .decide(payment.amount.value(), payment.method)
            .await;
        let now = Utc::now();
        if accepted {
            payment.complete(format!("txn_{}", Uuid::new_v4().simple()), now);
        } else {
            payment.fail(DECLINE_MESSAGE, now);
        }

        if !self
            .store
            .update_if(PaymentStatus::Processing, payment.clone())
            .await?
        {
            return Err(AppError::AlreadyProcessed(id.to_string()));
        }

        if accepted {
            info!(status = %payment.status, "payment resolved");
        } else {
            warn!(status = %payment.status, reason = DECLINE_MESSAGE, "payment resolved");
        }
        Ok(payment)
    }

    pub async fn get_by_id(&self, id: &PaymentId) -> Result<Payment> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("payment", id))
    }

    pub async fn get_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Payment> {
        self.store
            .get_by_idempotency_key(key)
            .await?
            .ok_or_else(|| AppError::not_found("payment", key))
    }

    pub async fn get_by_order(&self, order_id: &OrderId) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .store
            .all()
            .await?
            .into_iter()
            .filter(|payment| &payment.order_id == order_id)
            .collect();
        newest_first(&mut payments);
        Ok(payments)
    }

    pub async fn get_by_customer(&self, customer_id: &str) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .store
            .all()
            .await?
            .into_iter()
            .filter(|payment| payment.customer_id == customer_id)
            .collect();
        newest_first(&mut payments);
        Ok(payments)
    }

    pub async fn list(&self) -> Result<Vec<Payment>> {
        let mut payments = self.store.all().await?;
        newest_first(&mut payments);
        Ok(payments)
    }

    pub async fn statistics(&self) -> Result<PaymentStats> {
        let payments = self.store.all().await?;
        Ok(PaymentStats::from_payments(&payments))
    }
}

fn newest_first(payments: &mut [Payment]) {
    payments.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::{Amount, Currency};
    use crate::domain::payment::PaymentMethod;
    use crate::domain::ports::{PaymentGateway, PaymentStore};
    use crate::infrastructure::gateway::{DeclineRule, GatewayConfig, SimulatedGateway};
    use crate::infrastructure::in_memory::InMemoryPaymentStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn instant_gateway() -> PaymentGatewayBox {
        Box::new(SimulatedGateway::new(GatewayConfig {
            delay: std::time::Duration::ZERO,
            decline: DeclineRule::default(),
        }))
    }

    fn ledger(store: InMemoryPaymentStore) -> PaymentLedger {
        PaymentLedger::new(Box::new(store), instant_gateway())
    }

    fn candidate(key: &str, amount: Decimal) -> NewPayment {
        NewPayment {
            order_id: OrderId::new("ord_1"),
            amount: Amount::new(amount).unwrap(),
            currency: Currency::Usd,
            method: PaymentMethod::CreditCard,
            customer_id: "cust_1".to_string(),
            idempotency_key: IdempotencyKey::new(key),
        }
    }

    #[tokio::test]
    async fn test_create_then_duplicate_returns_same_row() {
        let ledger = ledger(InMemoryPaymentStore::new());

        let first = ledger.create(candidate("k1", dec!(10.0))).await.unwrap();
        assert!(!first.is_duplicate());
        assert_eq!(first.payment().status, PaymentStatus::Pending);

        // Different amount under the same key still yields the committed row.
        let second = ledger.create(candidate("k1", dec!(99.0))).await.unwrap();
        assert!(second.is_duplicate());
        assert_eq!(second.payment().id, first.payment().id);
        assert_eq!(second.payment().amount.value(), dec!(10.0));
        assert_eq!(ledger.list().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_commit_one_row() {
        let store = InMemoryPaymentStore::new();
        let ledger = Arc::new(ledger(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.create(candidate("shared", dec!(25.0))).await
            }));
        }

        let mut ids = Vec::new();
        let mut accepted = 0;
        for handle in handles {
            let admission = handle.await.unwrap().unwrap();
            if !admission.is_duplicate() {
                accepted += 1;
            }
            ids.push(admission.into_payment().id);
        }

        assert_eq!(accepted, 1);
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    /// Hides the first lookup so the insert runs into the unique index.
    struct RacingStore {
        inner: InMemoryPaymentStore,
        hide_next_lookup: AtomicBool,
    }

    #[async_trait]
    impl PaymentStore for RacingStore {
        async fn insert(&self, payment: Payment) -> Result<()> {
            self.inner.insert(payment).await
        }
        async fn get(&self, id: &PaymentId) -> Result<Option<Payment>> {
            self.inner.get(id).await
        }
        async fn get_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<Payment>> {
            if self.hide_next_lookup.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.get_by_idempotency_key(key).await
        }
        async fn update_if(&self, expected: PaymentStatus, payment: Payment) -> Result<bool> {
            self.inner.update_if(expected, payment).await
        }
        async fn all(&self) -> Result<Vec<Payment>> {
            self.inner.all().await
        }
    }

    #[tokio::test]
    async fn test_storage_duplicate_translates_to_existing_row() {
        let inner = InMemoryPaymentStore::new();
        let winner = Payment::accept(candidate("raced", dec!(5.0)), Utc::now());
        inner.insert(winner.clone()).await.unwrap();

        let store = RacingStore {
            inner: inner.clone(),
            hide_next_lookup: AtomicBool::new(true),
        };
        let ledger = PaymentLedger::new(Box::new(store), instant_gateway());

        let admission = ledger.create(candidate("raced", dec!(5.0))).await.unwrap();
        assert_eq!(admission, Admission::Duplicate(winner));
        assert_eq!(inner.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_completes_and_declines() {
        let ledger = ledger(InMemoryPaymentStore::new());

        let ok = ledger.create(candidate("ok", dec!(30.97))).await.unwrap();
        let ok = ledger.resolve(&ok.payment().id).await.unwrap();
        assert_eq!(ok.status, PaymentStatus::Completed);
        assert!(ok.transaction_id.as_deref().unwrap().starts_with("txn_"));
        assert!(ok.processed_at.is_some() && ok.failed_at.is_none());

        let bad = ledger.create(candidate("bad", dec!(666))).await.unwrap();
        let bad = ledger.resolve(&bad.payment().id).await.unwrap();
        assert_eq!(bad.status, PaymentStatus::Failed);
        assert_eq!(bad.error_message.as_deref(), Some(DECLINE_MESSAGE));
        assert!(bad.transaction_id.is_none());
    }

    #[tokio::test]
    async fn test_resolve_terminal_payment_is_rejected_without_mutation() {
        let ledger = ledger(InMemoryPaymentStore::new());
        let admission = ledger.create(candidate("once", dec!(12.0))).await.unwrap();
        let resolved = ledger.resolve(&admission.payment().id).await.unwrap();

        let again = ledger.resolve(&resolved.id).await;
        assert!(matches!(again, Err(AppError::AlreadyProcessed(_))));
        assert_eq!(ledger.get_by_id(&resolved.id).await.unwrap(), resolved);
    }

    struct CountingGateway(Arc<std::sync::atomic::AtomicUsize>);

    #[async_trait]
    impl PaymentGateway for CountingGateway {
        async fn decide(&self, _amount: Decimal, _method: PaymentMethod) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            true
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolve_charges_once() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let ledger = Arc::new(PaymentLedger::new(
            Box::new(InMemoryPaymentStore::new()),
            Box::new(CountingGateway(calls.clone())),
        ));
        let id = ledger
            .create(candidate("race", dec!(8.0)))
            .await
            .unwrap()
            .into_payment()
            .id;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move { ledger.resolve(&id).await }));
        }
        let mut resolved = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => resolved += 1,
                Err(err) => assert!(matches!(err, AppError::AlreadyProcessed(_))),
            }
        }

        assert_eq!(resolved, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lookups_signal_not_found() {
        let ledger = ledger(InMemoryPaymentStore::new());
        assert!(
            ledger
                .get_by_id(&PaymentId::new("pay_missing"))
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            ledger
                .get_by_idempotency_key(&IdempotencyKey::new("missing"))
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            ledger
                .resolve(&PaymentId::new("pay_missing"))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_invalid_candidate_is_rejected_before_write() {
        let store = InMemoryPaymentStore::new();
        let ledger = ledger(store.clone());
        let mut bad = candidate("k", dec!(1.0));
        bad.customer_id.clear();

        assert!(matches!(
            ledger.create(bad).await,
            Err(AppError::Validation(_))
        ));
        assert!(store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_side_and_statistics() {
        let ledger = ledger(InMemoryPaymentStore::new());
        let a = ledger.create(candidate("a", dec!(10.0))).await.unwrap();
        ledger.resolve(&a.payment().id).await.unwrap();

        let mut other = candidate("b", dec!(666));
        other.customer_id = "cust_2".to_string();
        other.order_id = OrderId::new("ord_2");
        let b = ledger.create(other).await.unwrap();
        ledger.resolve(&b.payment().id).await.unwrap();

        ledger.create(candidate("c", dec!(3.0))).await.unwrap();

        assert_eq!(ledger.get_by_customer("cust_1").await.unwrap().len(), 2);
        assert_eq!(
            ledger
                .get_by_order(&OrderId::new("ord_2"))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            ledger
                .get_by_idempotency_key(&IdempotencyKey::new("a"))
                .await
                .unwrap()
                .status,
            PaymentStatus::Completed
        );

        let stats = ledger.statistics().await.unwrap();
        assert_eq!(stats.total_payments, 3);
        assert_eq!(stats.successful_payments, 1);
        assert_eq!(stats.failed_payments, 1);
        assert_eq!(stats.pending_payments, 1);
        assert_eq!(stats.total_amount_processed, dec!(10.0));
        assert_eq!(stats.unique_customers, 2);
    }
}
