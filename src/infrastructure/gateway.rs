use crate::domain::payment::PaymentMethod;
use crate::domain::ports::PaymentGateway;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tracing::debug;

/// Amounts the simulated network refuses.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclineRule {
    /// Exact amounts that are always declined (test sentinels).
    pub sentinels: Vec<Decimal>,
    /// Amounts strictly above this are declined.
    pub ceiling: Option<Decimal>,
}

impl Default for DeclineRule {
    fn default() -> Self {
        Self {
            sentinels: vec![dec!(666)],
            ceiling: Some(dec!(10000)),
        }
    }
}

impl DeclineRule {
    pub fn declines(&self, amount: Decimal) -> bool {
        self.sentinels.contains(&amount) || self.ceiling.is_some_and(|ceiling| amount > ceiling)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub delay: Duration,
    pub decline: DeclineRule,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            decline: DeclineRule::default(),
        }
    }
}

/// Stand-in for an external payment network.
///
/// Sleeps for the configured processing delay, then applies the decline rule.
/// The outcome depends only on the amount.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway {
    config: GatewayConfig,
}

impl SimulatedGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn decide(&self, amount: Decimal, method: PaymentMethod) -> bool {
        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }
        let accepted = !self.config.decline.declines(amount);
        debug!(%amount, %method, accepted, "gateway decision");
        accepted
    }
}
