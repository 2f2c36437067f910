use crate::application::checkout::{CheckoutError, OrderReceipt};
use crate::error::{AppError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// Status shown for requests turned away before an order was created.
pub const REJECTED: &str = "rejected";

/// One output row per order request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutOutcome {
    pub request: String,
    pub order_id: Option<String>,
    pub status: String,
    pub total: Option<Decimal>,
    pub currency: Option<String>,
    pub payment_id: Option<String>,
    pub reason: Option<String>,
}

impl CheckoutOutcome {
    pub fn from_result(request: &str, result: &std::result::Result<OrderReceipt, CheckoutError>) -> Self {
        match result {
            Ok(receipt) => Self {
                request: request.to_string(),
                order_id: Some(receipt.order.id.to_string()),
                status: receipt.order.status.to_string(),
                total: Some(receipt.order.total_amount),
                currency: Some(receipt.order.currency.to_string()),
                payment_id: Some(receipt.payment.id.to_string()),
                reason: None,
            },
            Err(err) => match err.order() {
                Some(order) => Self {
                    request: request.to_string(),
                    order_id: Some(order.id.to_string()),
                    status: order.status.to_string(),
                    total: Some(order.total_amount),
                    currency: Some(order.currency.to_string()),
                    payment_id: order.payment_id.as_ref().map(ToString::to_string),
                    reason: Some(err.to_string()),
                },
                None => Self::rejected(request, err.to_string()),
            },
        }
    }

    /// A row for input that could not be read at all.
    pub fn unreadable(request: &str, err: &AppError) -> Self {
        Self::rejected(request, err.to_string())
    }

    fn rejected(request: &str, reason: String) -> Self {
        Self {
            request: request.to_string(),
            order_id: None,
            status: REJECTED.to_string(),
            total: None,
            currency: None,
            payment_id: None,
            reason: Some(reason),
        }
    }
}

pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_outcomes(&mut self, outcomes: impl IntoIterator<Item = CheckoutOutcome>) -> Result<()> {
        for outcome in outcomes {
            self.writer.serialize(outcome)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
