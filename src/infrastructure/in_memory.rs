use crate::domain::idempotency::IdempotencyKey;
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{Catalog, OrderLedger, PaymentStore};
use crate::domain::product::Product;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct PaymentTable {
    rows: HashMap<PaymentId, Payment>,
    by_key: HashMap<IdempotencyKey, PaymentId>,
}

/// A thread-safe in-memory payment table with a unique idempotency-key index.
///
/// Check-and-insert runs under a single write lock, which plays the role of a
/// storage-level unique constraint. Clones share the same table.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    table: Arc<RwLock<PaymentTable>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: Payment) -> Result<()> {
        let mut table = self.table.write().await;
        if table.by_key.contains_key(&payment.idempotency_key) {
            return Err(AppError::DuplicateIdempotencyKey(
                payment.idempotency_key.to_string(),
            ));
        }
        if table.rows.contains_key(&payment.id) {
            return Err(AppError::Persistence(format!(
                "payment id already exists: {}",
                payment.id
            )));
        }
        table
            .by_key
            .insert(payment.idempotency_key.clone(), payment.id.clone());
        table.rows.insert(payment.id.clone(), payment);
        Ok(())
    }

    async fn get(&self, id: &PaymentId) -> Result<Option<Payment>> {
        let table = self.table.read().await;
        Ok(table.rows.get(id).cloned())
    }

    async fn get_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<Payment>> {
        let table = self.table.read().await;
        Ok(table
            .by_key
            .get(key)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn update_if(&self, expected: PaymentStatus, payment: Payment) -> Result<bool> {
        let mut table = self.table.write().await;
        let row = table
            .rows
            .get_mut(&payment.id)
            .ok_or_else(|| AppError::not_found("payment", &payment.id))?;
        if row.status != expected {
            return Ok(false);
        }
        *row = payment;
        Ok(true)
    }

    async fn all(&self) -> Result<Vec<Payment>> {
        let table = self.table.read().await;
        Ok(table.rows.values().cloned().collect())
    }
}

/// A thread-safe in-memory order ledger.
#[derive(Default, Clone)]
pub struct InMemoryOrderLedger {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn create(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(AppError::Persistence(format!(
                "order already exists: {}",
                order.id
            )));
        }
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn get_by_id(&self, id: &OrderId) -> Result<Order> {
        let orders = self.orders.read().await;
        orders
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found("order", id))
    }

    async fn get_all(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut all: Vec<Order> = orders.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn get_by_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> = orders
            .values()
            .filter(|order| order.customer_id == customer_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("order", id))?;
        if order.status.is_terminal() && !status.is_terminal() {
            return Err(AppError::Validation(format!(
                "order {id} is {} and cannot return to {status}",
                order.status
            )));
        }
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn update_payment_reference(&self, id: &OrderId, payment_id: &PaymentId) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("order", id))?;
        order.payment_id = Some(payment_id.clone());
        order.updated_at = Utc::now();
        Ok(())
    }
}

/// Read-only product catalog held in memory, keyed by product id.
#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    products: Arc<BTreeMap<String, Product>>,
}

impl InMemoryCatalog {
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect();
        Self {
            products: Arc::new(products),
        }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, id: &str) -> Result<Option<Product>> {
        Ok(self.products.get(id).cloned())
    }

    async fn available_products(&self) -> Result<Vec<Product>> {
        Ok(self
            .products
            .values()
            .filter(|product| product.available)
            .cloned()
            .collect())
    }
}
