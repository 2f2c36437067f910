use crate::domain::idempotency::IdempotencyKey;
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{OrderLedger, PaymentStore};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, ErrorKind, IteratorMode, Options, SingleThreaded,
    TransactionDB, TransactionDBOptions,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for payment rows, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family mapping idempotency key to payment id. Its keys are the unique index.
pub const CF_IDEMPOTENCY: &str = "idempotency";
/// Column Family for order rows, keyed by order id.
pub const CF_ORDERS: &str = "orders";

/// A persistent store over a RocksDB `TransactionDB`.
///
/// Idempotent inserts take an exclusive lock on the key's index row inside a
/// pessimistic transaction, so the one-payment-per-key rule holds across
/// concurrent writers and process restarts.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB<SingleThreaded>>,
}

impl RocksDBStore {
    /// Opens or creates a database at `path` with the payment, index and order column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_PAYMENTS, CF_IDEMPOTENCY, CF_ORDERS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = TransactionDB::open_cf_descriptors(&opts, &TransactionDBOptions::default(), path, cfs)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| AppError::Persistence(format!("column family not found: {name}")))
    }

    fn scan<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    fn payment_id_for(&self, key: &IdempotencyKey) -> Result<Option<PaymentId>> {
        let index = self.cf(CF_IDEMPOTENCY)?;
        Ok(self
            .db
            .get_cf(index, key.as_str())?
            .map(|id| PaymentId::new(String::from_utf8_lossy(&id).into_owned())))
    }

    fn try_insert(&self, payment: &Payment) -> Result<()> {
        let payments = self.cf(CF_PAYMENTS)?;
        let index = self.cf(CF_IDEMPOTENCY)?;
        let key = payment.idempotency_key.as_str();

        let txn = self.db.transaction();
        if txn.get_for_update_cf(index, key, true)?.is_some() {
            return Err(AppError::DuplicateIdempotencyKey(key.to_string()));
        }
        if txn
            .get_for_update_cf(payments, payment.id.as_str(), true)?
            .is_some()
        {
            return Err(AppError::Persistence(format!(
                "payment id already exists: {}",
                payment.id
            )));
        }
        txn.put_cf(payments, payment.id.as_str(), serde_json::to_vec(payment)?)?;
        txn.put_cf(index, key, payment.id.as_str())?;
        txn.commit()?;
        Ok(())
    }

    fn update_order(&self, id: &OrderId, apply: impl FnOnce(&mut Order) -> Result<()>) -> Result<()> {
        let orders = self.cf(CF_ORDERS)?;
        let txn = self.db.transaction();
        let bytes = txn
            .get_for_update_cf(orders, id.as_str(), true)?
            .ok_or_else(|| AppError::not_found("order", id))?;
        let mut order: Order = serde_json::from_slice(&bytes)?;
        apply(&mut order)?;
        order.updated_at = Utc::now();
        txn.put_cf(orders, id.as_str(), serde_json::to_vec(&order)?)?;
        txn.commit()?;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn insert(&self, payment: Payment) -> Result<()> {
        match self.try_insert(&payment) {
            Err(AppError::RocksDB(err))
                if matches!(err.kind(), ErrorKind::Busy | ErrorKind::TimedOut)
                    && self.payment_id_for(&payment.idempotency_key)?.is_some() =>
            {
                // Lost the lock to a writer that committed the same key.
                Err(AppError::DuplicateIdempotencyKey(
                    payment.idempotency_key.to_string(),
                ))
            }
            other => other,
        }
    }

    async fn get(&self, id: &PaymentId) -> Result<Option<Payment>> {
        let payments = self.cf(CF_PAYMENTS)?;
        match self.db.get_cf(payments, id.as_str())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<Payment>> {
        match self.payment_id_for(key)? {
            Some(id) => PaymentStore::get(self, &id).await,
            None => Ok(None),
        }
    }

    async fn update_if(&self, expected: PaymentStatus, payment: Payment) -> Result<bool> {
        let payments = self.cf(CF_PAYMENTS)?;
        let txn = self.db.transaction();
        let bytes = txn
            .get_for_update_cf(payments, payment.id.as_str(), true)?
            .ok_or_else(|| AppError::not_found("payment", &payment.id))?;
        let stored: Payment = serde_json::from_slice(&bytes)?;
        if stored.status != expected {
            return Ok(false);
        }
        txn.put_cf(payments, payment.id.as_str(), serde_json::to_vec(&payment)?)?;
        txn.commit()?;
        Ok(true)
    }

    async fn all(&self) -> Result<Vec<Payment>> {
        self.scan(CF_PAYMENTS)
    }
}

#[async_trait]
impl OrderLedger for RocksDBStore {
    async fn create(&self, order: Order) -> Result<()> {
        let orders = self.cf(CF_ORDERS)?;
        let txn = self.db.transaction();
        if txn.get_for_update_cf(orders, order.id.as_str(), true)?.is_some() {
            return Err(AppError::Persistence(format!(
                "order already exists: {}",
                order.id
            )));
        }
        txn.put_cf(orders, order.id.as_str(), serde_json::to_vec(&order)?)?;
        txn.commit()?;
        Ok(())
    }

    async fn get_by_id(&self, id: &OrderId) -> Result<Order> {
        let orders = self.cf(CF_ORDERS)?;
        let bytes = self
            .db
            .get_cf(orders, id.as_str())?
            .ok_or_else(|| AppError::not_found("order", id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_all(&self) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.scan(CF_ORDERS)?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn get_by_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .scan::<Order>(CF_ORDERS)?
            .into_iter()
            .filter(|order| order.customer_id == customer_id)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<()> {
        self.update_order(id, |order| {
            if order.status.is_terminal() && !status.is_terminal() {
                return Err(AppError::Validation(format!(
                    "order {id} is {} and cannot return to {status}",
                    order.status
                )));
            }
            order.status = status;
            Ok(())
        })
    }

    async fn update_payment_reference(&self, id: &OrderId, payment_id: &PaymentId) -> Result<()> {
        self.update_order(id, |order| {
            order.payment_id = Some(payment_id.clone());
            Ok(())
        })
    }
}
