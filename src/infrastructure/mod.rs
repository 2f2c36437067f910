//! Adapters behind the domain ports: storage, the simulated gateway and the notifier.

pub mod gateway;
pub mod in_memory;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
