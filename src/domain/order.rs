use super::money::Currency;
use super::payment::{PaymentId, PaymentMethod};
use super::product::Product;
use super::request::OrderRequest;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("ord_{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order lifecycle. The orchestration core only ever writes `Pending`, `Paid`
/// and `Failed`; `Confirmed` and `Cancelled` belong to downstream processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Confirmed,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        self != OrderStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line item priced at order time. Never repriced from the live catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

impl OrderItem {
    /// Prices `quantity` units from the authoritative product record.
    pub fn priced(product: &Product, quantity: u32, currency: Currency) -> Self {
        Self {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            quantity,
            unit_price: product.price,
            subtotal: currency.round(product.price * Decimal::from(quantity)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: String,
    pub customer_email: String,
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
    pub currency: Currency,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<PaymentId>,
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a fresh `pending` order from a validated request and server-priced items.
    pub fn pending(request: &OrderRequest, items: Vec<OrderItem>) -> Result<Self, AppError> {
        let now = Utc::now();
        let mut order = Self {
            id: OrderId::generate(),
            customer_id: request.customer_id.clone(),
            customer_email: request.customer_email.clone(),
            items,
            total_amount: Decimal::ZERO,
            currency: request.currency,
            status: OrderStatus::Pending,
            payment_id: None,
            payment_method: request.payment_method,
            shipping_address: request.shipping_address.clone(),
            created_at: now,
            updated_at: now,
        };
        order.calculate_total();

        if order.total_amount <= Decimal::ZERO {
            return Err(AppError::Validation("invalid order total".to_string()));
        }
        Ok(order)
    }

    /// Sets `total_amount` to the sum of the item subtotals.
    pub fn calculate_total(&mut self) {
        let total: Decimal = self.items.iter().map(|item| item.subtotal).sum();
        self.total_amount = self.currency.round(total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::LineItemRequest;
    use rand::Rng;
    use rust_decimal_macros::dec;

    fn product(id: &str, price: Decimal) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            price,
            available: true,
        }
    }

    fn request() -> OrderRequest {
        OrderRequest {
            customer_id: "cust_1".to_string(),
            customer_email: "alice@example.com".to_string(),
            items: vec![LineItemRequest {
                product_id: "p1".to_string(),
                quantity: 1,
                unit_price: None,
            }],
            currency: Currency::Usd,
            payment_method: PaymentMethod::CreditCard,
            shipping_address: "1 Main St".to_string(),
        }
    }

    #[test]
    fn test_two_line_items_total() {
        let items = vec![
            OrderItem::priced(&product("p1", dec!(12.99)), 2, Currency::Usd),
            OrderItem::priced(&product("p2", dec!(4.99)), 1, Currency::Usd),
        ];
        let order = Order::pending(&request(), items).unwrap();

        assert_eq!(order.items[0].subtotal, dec!(25.98));
        assert_eq!(order.total_amount, dec!(30.97));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.payment_id.is_none());
        assert!(order.id.as_str().starts_with("ord_"));
    }

    #[test]
    fn test_zero_total_is_rejected() {
        let items = vec![OrderItem::priced(&product("free", dec!(0)), 3, Currency::Usd)];
        assert!(matches!(
            Order::pending(&request(), items),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_total_matches_sum_of_subtotals_for_random_orders() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let items: Vec<OrderItem> = (0..rng.gen_range(1..6))
                .map(|i| {
                    let cents: i64 = rng.gen_range(1..100_000);
                    let quantity: u32 = rng.gen_range(1..20);
                    let price = Decimal::new(cents, 2);
                    OrderItem::priced(&product(&format!("p{i}"), price), quantity, Currency::Eur)
                })
                .collect();
            let order = Order::pending(&request(), items).unwrap();

            let sum: Decimal = order.items.iter().map(|item| item.subtotal).sum();
            assert_eq!(order.total_amount, sum);
            for item in &order.items {
                assert_eq!(item.subtotal, item.unit_price * Decimal::from(item.quantity));
            }
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }
}
