use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Authoritative catalog record. Checkout prices every line item from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub available: bool,
}
