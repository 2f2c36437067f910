//! Application layer: the payment ledger service and the checkout orchestrator.
//!
//! Both are written against the ports in `domain::ports` and own their adapters
//! as boxed trait objects.

pub mod checkout;
pub mod payment_ledger;
