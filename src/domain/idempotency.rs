use super::order::OrderId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Token under which the payment ledger admits at most one payment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

/// Random component distinguishing one order-creation attempt from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptNonce(Uuid);

impl AttemptNonce {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives the key for `order_id` under a given attempt nonce.
    ///
    /// The same `(order_id, nonce)` pair always yields the same key, so retries of
    /// one attempt reuse it; the random nonce keeps keys from colliding across
    /// processes even if order ids were ever reused.
    pub fn derive(order_id: &OrderId, nonce: &AttemptNonce) -> Self {
        Self(format!("idem_{}_{}", order_id, nonce.0.simple()))
    }

    /// Mints a key for a fresh attempt.
    pub fn generate(order_id: &OrderId) -> Self {
        Self::derive(order_id, &AttemptNonce::random())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}
