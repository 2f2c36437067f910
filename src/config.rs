use crate::application::checkout::CheckoutConfig;
use crate::error::{AppError, Result};
use crate::infrastructure::gateway::{DeclineRule, GatewayConfig};
use clap::Parser;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;

/// Runs a batch of orders through checkout and prints one outcome row per request.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Input orders CSV file
    #[arg(env = "ORDERPAY_ORDERS")]
    pub orders: PathBuf,

    /// Product catalog CSV file (id,name,price,available)
    #[arg(long, env = "ORDERPAY_CATALOG")]
    pub catalog: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "ORDERPAY_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Client-side bound on a payment call, status polling included
    #[arg(long, env = "ORDERPAY_PAYMENT_TIMEOUT_MS", default_value_t = 5000)]
    pub payment_timeout_ms: u64,

    /// Interval between status checks of an in-flight payment
    #[arg(long, env = "ORDERPAY_STATUS_POLL_MS", default_value_t = 250)]
    pub status_poll_ms: u64,

    /// Simulated gateway processing delay
    #[arg(long, env = "ORDERPAY_GATEWAY_DELAY_MS", default_value_t = 100)]
    pub gateway_delay_ms: u64,

    /// Amount the gateway always declines (repeatable)
    #[arg(
        long = "decline-amount",
        env = "ORDERPAY_DECLINE_AMOUNTS",
        value_delimiter = ',',
        default_values_t = [Decimal::from(666)]
    )]
    pub decline_amounts: Vec<Decimal>,

    /// Amounts above this are declined
    #[arg(long, env = "ORDERPAY_DECLINE_ABOVE", default_value_t = Decimal::from(10000))]
    pub decline_above: Decimal,

    /// Simulate a payment service outage
    #[arg(long, env = "ORDERPAY_PAYMENT_UNREACHABLE")]
    pub payment_unreachable: bool,

    /// Print payment ledger statistics as JSON on stderr
    #[arg(long, env = "ORDERPAY_STATS")]
    pub stats: bool,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.payment_timeout_ms == 0 {
            return Err(AppError::Validation(
                "payment timeout must be greater than 0".to_string(),
            ));
        }
        if self.status_poll_ms == 0 {
            return Err(AppError::Validation(
                "status poll interval must be greater than 0".to_string(),
            ));
        }
        if self.status_poll_ms >= self.payment_timeout_ms {
            return Err(AppError::Validation(format!(
                "status poll interval ({}ms) must be shorter than the payment timeout ({}ms)",
                self.status_poll_ms, self.payment_timeout_ms
            )));
        }
        if self.decline_above <= Decimal::ZERO {
            return Err(AppError::Validation(
                "decline ceiling must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn checkout(&self) -> CheckoutConfig {
        CheckoutConfig {
            payment_timeout: Duration::from_millis(self.payment_timeout_ms),
            status_poll_interval: Duration::from_millis(self.status_poll_ms),
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            delay: Duration::from_millis(self.gateway_delay_ms),
            decline: DeclineRule {
                sentinels: self.decline_amounts.clone(),
                ceiling: Some(self.decline_above),
            },
        }
    }
}
