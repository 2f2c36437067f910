use crate::domain::order::OrderId;
use crate::domain::ports::Notifier;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Receipt sink that records the dispatch in the log.
///
/// The payload is the order reference and contact address only; a real
/// collaborator fetches the order and payment detail itself.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_receipt(&self, order_id: &OrderId, customer_email: &str) -> Result<()> {
        info!(%order_id, customer_email, "receipt dispatched");
        Ok(())
    }
}
