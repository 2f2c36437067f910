use super::idempotency::IdempotencyKey;
use super::order::{Order, OrderId, OrderStatus};
use super::payment::{
    Payment, PaymentId, PaymentMethod, PaymentReply, PaymentRequest, PaymentStatus,
};
use super::product::Product;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Storage behind the payment ledger.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Commits a new row. Must fail with `DuplicateIdempotencyKey` if a row with the
    /// same idempotency key exists, atomically with respect to concurrent inserts.
    async fn insert(&self, payment: Payment) -> Result<()>;
    async fn get(&self, id: &PaymentId) -> Result<Option<Payment>>;
    async fn get_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<Payment>>;
    /// Replaces the stored row only while its status still equals `expected`.
    /// Returns `false` when the status moved on; `NotFound` when the row is absent.
    async fn update_if(&self, expected: PaymentStatus, payment: Payment) -> Result<bool>;
    async fn all(&self) -> Result<Vec<Payment>>;
}

/// The order service's store. Every write after `create` is a targeted partial update.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn create(&self, order: Order) -> Result<()>;
    async fn get_by_id(&self, id: &OrderId) -> Result<Order>;
    async fn get_all(&self) -> Result<Vec<Order>>;
    async fn get_by_customer(&self, customer_id: &str) -> Result<Vec<Order>>;
    async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<()>;
    async fn update_payment_reference(&self, id: &OrderId, payment_id: &PaymentId) -> Result<()>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, id: &str) -> Result<Option<Product>>;
    async fn available_products(&self) -> Result<Vec<Product>>;
}

/// Accept-or-decline decision of a payment network.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn decide(&self, amount: Decimal, method: PaymentMethod) -> bool;
}

/// The order service's view of the remote payment service.
#[async_trait]
pub trait PaymentClient: Send + Sync {
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentReply>;
    async fn payment_status(&self, id: &PaymentId) -> Result<PaymentReply>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_receipt(&self, order_id: &OrderId, customer_email: &str) -> Result<()>;
}

pub type PaymentStoreBox = Box<dyn PaymentStore>;
pub type OrderLedgerBox = Box<dyn OrderLedger>;
pub type CatalogBox = Box<dyn Catalog>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
pub type PaymentClientBox = Box<dyn PaymentClient>;
pub type NotifierRef = Arc<dyn Notifier>;
