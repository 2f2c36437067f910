//! Entities, value objects and the ports the application layer is written against.

pub mod idempotency;
pub mod money;
pub mod order;
pub mod payment;
pub mod ports;
pub mod product;
pub mod request;
