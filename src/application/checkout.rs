use crate::domain::idempotency::IdempotencyKey;
use crate::domain::order::{Order, OrderId, OrderItem, OrderStatus};
use crate::domain::payment::{Payment, PaymentReply, PaymentRequest, PaymentStatus};
use crate::domain::ports::{CatalogBox, NotifierRef, OrderLedgerBox, PaymentClientBox};
use crate::domain::product::Product;
use crate::domain::request::{OrderDraft, OrderRequest};
use crate::error::AppError;
use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Upper bound on the whole payment exchange, status polling included.
    pub payment_timeout: Duration,
    pub status_poll_interval: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            payment_timeout: Duration::from_secs(5),
            status_poll_interval: Duration::from_millis(250),
        }
    }
}

/// Successful checkout: the order is `paid` and its payment `completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub order: Order,
    pub payment: Payment,
    /// The payment was adopted from an earlier attempt under the same key.
    pub replayed: bool,
}

#[derive(Error, Diagnostic, Debug)]
pub enum CheckoutError {
    #[error("invalid order request: {0}")]
    #[diagnostic(code(orderpay::checkout::validation))]
    Validation(String),

    #[error("invalid product: {product_id}")]
    #[diagnostic(code(orderpay::checkout::invalid_product))]
    InvalidProduct { product_id: String },

    #[error("product unavailable: {product_id}")]
    #[diagnostic(code(orderpay::checkout::product_unavailable))]
    ProductUnavailable { product_id: String },

    #[error("catalog lookup failed")]
    #[diagnostic(code(orderpay::checkout::catalog))]
    Catalog(#[source] AppError),

    #[error("failed to create order")]
    #[diagnostic(code(orderpay::checkout::order_create_failed))]
    OrderCreateFailed(#[source] AppError),

    #[error("payment service unavailable: {detail}")]
    #[diagnostic(
        code(orderpay::checkout::payment_unavailable),
        help("the order was marked failed; no charge was confirmed")
    )]
    PaymentServiceUnavailable { order: Box<Order>, detail: String },

    #[error("payment declined: {reason}")]
    #[diagnostic(code(orderpay::checkout::payment_declined))]
    PaymentDeclined {
        order: Box<Order>,
        payment: Box<Payment>,
        reason: String,
    },
}

impl CheckoutError {
    /// The order snapshot, for failures that happen after the order was created.
    pub fn order(&self) -> Option<&Order> {
        match self {
            CheckoutError::PaymentServiceUnavailable { order, .. }
            | CheckoutError::PaymentDeclined { order, .. } => Some(order.as_ref()),
            _ => None,
        }
    }

    pub fn order_status(&self) -> Option<OrderStatus> {
        self.order().map(|order| order.status)
    }
}

/// Drives order creation: build, persist pending, pay, settle, notify.
///
/// Every step moves forward. A failed payment exchange leaves the order `failed`,
/// never `pending`.
pub struct Orchestrator {
    orders: OrderLedgerBox,
    catalog: CatalogBox,
    payments: PaymentClientBox,
    notifier: NotifierRef,
    config: CheckoutConfig,
    notifications: Mutex<JoinSet<()>>,
}

impl Orchestrator {
    pub fn new(
        orders: OrderLedgerBox,
        catalog: CatalogBox,
        payments: PaymentClientBox,
        notifier: NotifierRef,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            orders,
            catalog,
            payments,
            notifier,
            config,
            notifications: Mutex::new(JoinSet::new()),
        }
    }

    /// Validates a raw draft, then runs the checkout.
    pub async fn place_draft(&self, draft: &OrderDraft) -> Result<OrderReceipt, CheckoutError> {
        let request = draft
            .validate()
            .map_err(|err| CheckoutError::Validation(reason(err)))?;
        self.place_order(request).await
    }

    #[instrument(skip_all, fields(customer_id = %request.customer_id, order_id = tracing::field::Empty))]
    pub async fn place_order(&self, request: OrderRequest) -> Result<OrderReceipt, CheckoutError> {
        let items = self.build_order(&request).await?;
        let order = Order::pending(&request, items)
            .map_err(|err| CheckoutError::Validation(reason(err)))?;
        tracing::Span::current().record("order_id", order.id.as_str());

        self.orders
            .create(order.clone())
            .await
            .map_err(CheckoutError::OrderCreateFailed)?;
        info!(total = %order.total_amount, currency = %order.currency, "order created");

        let key = IdempotencyKey::generate(&order.id);
        let payment_request = PaymentRequest {
            order_id: order.id.clone(),
            amount: order.total_amount,
            currency: order.currency,
            method: order.payment_method,
            customer_id: order.customer_id.clone(),
            idempotency_key: key,
        };

        let (payment, replayed) = match self.invoke_payment(payment_request).await {
            Ok(outcome) => outcome,
            Err(detail) => {
                warn!(%detail, "payment exchange failed");
                let order = self.settle(order, None, OrderStatus::Failed).await;
                return Err(CheckoutError::PaymentServiceUnavailable {
                    order: Box::new(order),
                    detail,
                });
            }
        };

        match payment.status {
            PaymentStatus::Completed => {
                let order = self
                    .settle(order, Some(&payment), OrderStatus::Paid)
                    .await;
                info!(payment_id = %payment.id, replayed, "order paid");
                self.notify(&order).await;
                Ok(OrderReceipt {
                    order,
                    payment,
                    replayed,
                })
            }
            _ => {
                let reason = payment
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "payment declined".to_string());
                let order = self
                    .settle(order, Some(&payment), OrderStatus::Failed)
                    .await;
                info!(payment_id = %payment.id, %reason, "order payment declined");
                Err(CheckoutError::PaymentDeclined {
                    order: Box::new(order),
                    payment: Box::new(payment),
                    reason,
                })
            }
        }
    }

    /// Prices every line from the catalog. Client-supplied prices are ignored.
    pub async fn build_order(&self, request: &OrderRequest) -> Result<Vec<OrderItem>, CheckoutError> {
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = self
                .catalog
                .product(&line.product_id)
                .await
                .map_err(CheckoutError::Catalog)?
                .ok_or_else(|| CheckoutError::InvalidProduct {
                    product_id: line.product_id.clone(),
                })?;
            if !product.available {
                return Err(CheckoutError::ProductUnavailable {
                    product_id: line.product_id.clone(),
                });
            }
            if let Some(claimed) = line.unit_price
                && claimed != product.price
            {
                debug!(product_id = %product.id, %claimed, price = %product.price, "client price ignored");
            }
            items.push(OrderItem::priced(&product, line.quantity, request.currency));
        }
        Ok(items)
    }

    /// Runs the payment exchange under the payment timeout. `Err` carries a
    /// human-readable detail for `PaymentServiceUnavailable`.
    async fn invoke_payment(&self, request: PaymentRequest) -> Result<(Payment, bool), String> {
        match tokio::time::timeout(self.config.payment_timeout, self.exchange(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(format!(
                "payment call timed out after {}ms",
                self.config.payment_timeout.as_millis()
            )),
        }
    }

    async fn exchange(&self, request: PaymentRequest) -> Result<(Payment, bool), String> {
        let reply = self
            .payments
            .process_payment(request)
            .await
            .map_err(|err| err.to_string())?;
        let (mut payment, replayed) = match reply {
            PaymentReply::Processed { payment } => (payment, false),
            PaymentReply::Duplicate { payment } => {
                debug!(payment_id = %payment.id, status = %payment.status, "adopting existing payment");
                (payment, true)
            }
            PaymentReply::Rejected { error } => return Err(format!("payment rejected: {error}")),
        };

        // A replayed payment may still be in flight on the first attempt.
        while !payment.status.is_terminal() {
            tokio::time::sleep(self.config.status_poll_interval).await;
            payment = match self
                .payments
                .payment_status(&payment.id)
                .await
                .map_err(|err| err.to_string())?
            {
                PaymentReply::Processed { payment } | PaymentReply::Duplicate { payment } => payment,
                PaymentReply::Rejected { error } => {
                    return Err(format!("payment status unavailable: {error}"));
                }
            };
        }
        Ok((payment, replayed))
    }

    /// Writes the terminal state with two independent partial updates. Write
    /// failures are logged; the returned snapshot reflects the intended state.
    async fn settle(
        &self,
        mut order: Order,
        payment: Option<&Payment>,
        status: OrderStatus,
    ) -> Order {
        if let Some(payment) = payment {
            if let Err(err) = self
                .orders
                .update_payment_reference(&order.id, &payment.id)
                .await
            {
                error!(order_id = %order.id, payment_id = %payment.id, error = %err, "failed to record payment reference");
            }
            order.payment_id = Some(payment.id.clone());
        }

        if let Err(err) = self.orders.update_status(&order.id, status).await {
            if status == OrderStatus::Paid {
                error!(order_id = %order.id, error = %err, "payment completed but order status update failed; needs reconciliation");
            } else {
                error!(order_id = %order.id, %status, error = %err, "failed to update order status");
            }
        }
        order.status = status;
        order.updated_at = chrono::Utc::now();
        order
    }

    /// Sends the receipt on a detached task. Failures are logged only.
    async fn notify(&self, order: &Order) {
        let notifier = self.notifier.clone();
        let order_id = order.id.clone();
        let email = order.customer_email.clone();

        let mut tasks = self.notifications.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(err) = notifier.send_receipt(&order_id, &email).await {
                warn!(%order_id, error = %err, "receipt notification failed");
            }
        });
    }

    /// Waits for every dispatched notification to finish.
    pub async fn drain_notifications(&self) {
        let mut tasks = std::mem::take(&mut *self.notifications.lock().await);
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "notification task aborted");
            }
        }
    }

    pub async fn order(&self, id: &OrderId) -> Result<Order, AppError> {
        self.orders.get_by_id(id).await
    }

    pub async fn orders(&self) -> Result<Vec<Order>, AppError> {
        self.orders.get_all().await
    }

    pub async fn customer_orders(&self, customer_id: &str) -> Result<Vec<Order>, AppError> {
        self.orders.get_by_customer(customer_id).await
    }

    pub async fn products(&self) -> Result<Vec<Product>, AppError> {
        self.catalog.available_products().await
    }
}

fn reason(err: AppError) -> String {
    match err {
        AppError::Validation(message) => message,
        other => other.to_string(),
    }
}
