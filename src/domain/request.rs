//! Order-creation requests.
//!
//! `OrderDraft` is what arrives from the outside world, all strings and signed
//! numbers. `OrderDraft::validate` is the only way to obtain an `OrderRequest`,
//! which is what the orchestrator accepts.

use super::money::Currency;
use super::payment::PaymentMethod;
use crate::error::AppError;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineDraft {
    pub product_id: String,
    pub quantity: i64,
    /// Client-supplied price. Carried for diagnostics only, never used for pricing.
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderDraft {
    /// Caller's reference for this request (e.g. the batch row group).
    pub reference: String,
    pub customer_id: String,
    pub customer_email: String,
    pub currency: String,
    pub payment_method: String,
    pub shipping_address: String,
    pub items: Vec<LineDraft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineItemRequest {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub customer_id: String,
    pub customer_email: String,
    pub items: Vec<LineItemRequest>,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
}

impl OrderDraft {
    /// Checks every field and reports all problems at once.
    pub fn validate(&self) -> Result<OrderRequest, AppError> {
        let mut problems: Vec<String> = Vec::new();

        if self.customer_id.trim().is_empty() {
            problems.push("customer_id is required".to_string());
        }
        if !is_plausible_email(&self.customer_email) {
            problems.push(format!("invalid customer_email: {:?}", self.customer_email));
        }
        if self.shipping_address.trim().is_empty() {
            problems.push("shipping_address is required".to_string());
        }
        let currency = self
            .currency
            .parse::<Currency>()
            .map_err(|e| problems.push(reason(e)))
            .ok();
        let payment_method = self
            .payment_method
            .parse::<PaymentMethod>()
            .map_err(|e| problems.push(reason(e)))
            .ok();

        if self.items.is_empty() {
            problems.push("at least one item is required".to_string());
        }
        let mut items = Vec::with_capacity(self.items.len());
        for (index, line) in self.items.iter().enumerate() {
            if line.product_id.trim().is_empty() {
                problems.push(format!("items[{index}]: product_id is required"));
                continue;
            }
            match u32::try_from(line.quantity) {
                Ok(quantity) if quantity > 0 => items.push(LineItemRequest {
                    product_id: line.product_id.trim().to_string(),
                    quantity,
                    unit_price: line.unit_price,
                }),
                _ => problems.push(format!(
                    "items[{index}]: quantity must be greater than 0, got {}",
                    line.quantity
                )),
            }
        }

        match (currency, payment_method) {
            (Some(currency), Some(payment_method)) if problems.is_empty() => Ok(OrderRequest {
                customer_id: self.customer_id.trim().to_string(),
                customer_email: self.customer_email.trim().to_string(),
                items,
                currency,
                payment_method,
                shipping_address: self.shipping_address.trim().to_string(),
            }),
            _ => Err(AppError::Validation(problems.join("; "))),
        }
    }
}

fn reason(err: AppError) -> String {
    match err {
        AppError::Validation(message) => message,
        other => other.to_string(),
    }
}

fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
