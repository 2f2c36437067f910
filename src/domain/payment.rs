use super::idempotency::IdempotencyKey;
use super::money::{Amount, Currency};
use super::order::OrderId;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("pay_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    ApplePay,
    Paypal,
    BankTransfer,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
        PaymentMethod::ApplePay,
        PaymentMethod::Paypal,
        PaymentMethod::BankTransfer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::ApplePay => "apple_pay",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let method = s.trim();
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(method))
            .ok_or_else(|| AppError::Validation(format!("unsupported payment method: {method:?}")))
    }
}

/// A payment candidate as submitted by a caller, before the ledger accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub amount: Amount,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub customer_id: String,
    pub idempotency_key: IdempotencyKey,
}

impl NewPayment {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut problems = Vec::new();
        if self.order_id.as_str().trim().is_empty() {
            problems.push("order_id is required");
        }
        if self.customer_id.trim().is_empty() {
            problems.push("customer_id is required");
        }
        if self.idempotency_key.is_blank() {
            problems.push("idempotency_key is required");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(problems.join("; ")))
        }
    }
}

/// A committed payment row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Amount,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub customer_id: String,
    pub idempotency_key: IdempotencyKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Admits a candidate into the ledger: assigns the id and starts it `pending`.
    pub fn accept(new: NewPayment, now: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::generate(),
            order_id: new.order_id,
            amount: new.amount,
            currency: new.currency,
            status: PaymentStatus::Pending,
            method: new.method,
            customer_id: new.customer_id,
            idempotency_key: new.idempotency_key,
            transaction_id: None,
            error_message: None,
            created_at: now,
            processed_at: None,
            failed_at: None,
        }
    }

    pub fn complete(&mut self, transaction_id: String, now: DateTime<Utc>) {
        self.status = PaymentStatus::Completed;
        self.transaction_id = Some(transaction_id);
        self.processed_at = Some(now);
    }

    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = PaymentStatus::Failed;
        self.error_message = Some(reason.into());
        self.failed_at = Some(now);
    }
}

/// Aggregate view over the ledger. Not used for correctness decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentStats {
    pub total_payments: u64,
    pub successful_payments: u64,
    pub failed_payments: u64,
    pub pending_payments: u64,
    pub processing_payments: u64,
    pub total_amount_processed: Decimal,
    pub average_payment_amount: Decimal,
    pub unique_customers: u64,
}

impl PaymentStats {
    pub fn from_payments<'a>(payments: impl IntoIterator<Item = &'a Payment>) -> Self {
        let mut stats = Self::default();
        let mut customers = HashSet::new();

        for payment in payments {
            stats.total_payments += 1;
            customers.insert(payment.customer_id.as_str());
            match payment.status {
                PaymentStatus::Pending => stats.pending_payments += 1,
                PaymentStatus::Processing => stats.processing_payments += 1,
                PaymentStatus::Failed => stats.failed_payments += 1,
                PaymentStatus::Completed => {
                    stats.successful_payments += 1;
                    stats.total_amount_processed += payment.amount.value();
                }
            }
        }

        if stats.successful_payments > 0 {
            stats.average_payment_amount = (stats.total_amount_processed
                / Decimal::from(stats.successful_payments))
            .round_dp(2);
        }
        stats.unique_customers = customers.len() as u64;
        stats
    }
}

/// Payment invocation as it crosses the wire from the order service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub customer_id: String,
    pub idempotency_key: IdempotencyKey,
}

impl TryFrom<PaymentRequest> for NewPayment {
    type Error = AppError;

    fn try_from(request: PaymentRequest) -> Result<Self, Self::Error> {
        let new = NewPayment {
            order_id: request.order_id,
            amount: Amount::new(request.amount)?,
            currency: request.currency,
            method: request.method,
            customer_id: request.customer_id,
            idempotency_key: request.idempotency_key,
        };
        new.validate()?;
        Ok(new)
    }
}

/// Reply shape of the payment service.
///
/// `Duplicate` is a success shape: it carries the payment already committed under
/// the request's idempotency key. Only `Rejected` is a hard failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentReply {
    Processed { payment: Payment },
    Duplicate { payment: Payment },
    Rejected { error: String },
}
