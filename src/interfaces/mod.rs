pub mod csv;
pub mod payment_api;
