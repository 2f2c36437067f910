#![allow(dead_code)]

use orderpay::application::checkout::{CheckoutConfig, Orchestrator};
use orderpay::application::payment_ledger::PaymentLedger;
use orderpay::domain::money::Currency;
use orderpay::domain::payment::PaymentMethod;
use orderpay::domain::ports::{NotifierRef, PaymentClientBox};
use orderpay::domain::product::Product;
use orderpay::domain::request::{LineItemRequest, OrderRequest};
use orderpay::infrastructure::gateway::{DeclineRule, GatewayConfig, SimulatedGateway};
use orderpay::infrastructure::in_memory::{InMemoryCatalog, InMemoryOrderLedger, InMemoryPaymentStore};
use orderpay::infrastructure::notifier::LogNotifier;
use orderpay::interfaces::payment_api::{LocalPaymentClient, PaymentEndpoint};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const ORDERS_HEADER: &str =
    "request,customer,email,currency,method,shipping_address,product,quantity,unit_price";

pub fn product(id: &str, price: Decimal, available: bool) -> Product {
    Product {
        id: id.to_string(),
        name: format!("Product {id}"),
        price,
        available,
    }
}

/// Same products as `tests/fixtures/catalog.csv`.
pub fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new([
        product("mug", dec!(12.99), true),
        product("poster", dec!(4.99), true),
        product("cursed", dec!(666), true),
        product("retired", dec!(19.99), false),
    ])
}

pub fn request(lines: &[(&str, u32)]) -> OrderRequest {
    OrderRequest {
        customer_id: "cust_1".to_string(),
        customer_email: "alice@example.com".to_string(),
        items: lines
            .iter()
            .map(|(product_id, quantity)| LineItemRequest {
                product_id: product_id.to_string(),
                quantity: *quantity,
                unit_price: None,
            })
            .collect(),
        currency: Currency::Usd,
        payment_method: PaymentMethod::CreditCard,
        shipping_address: "1 Main St".to_string(),
    }
}

pub fn instant_ledger(store: InMemoryPaymentStore) -> Arc<PaymentLedger> {
    let gateway = SimulatedGateway::new(GatewayConfig {
        delay: Duration::ZERO,
        decline: DeclineRule::default(),
    });
    Arc::new(PaymentLedger::new(Box::new(store), Box::new(gateway)))
}

pub fn orchestrator_with(
    orders: InMemoryOrderLedger,
    payments: PaymentClientBox,
    notifier: NotifierRef,
    config: CheckoutConfig,
) -> Orchestrator {
    Orchestrator::new(Box::new(orders), Box::new(catalog()), payments, notifier, config)
}

/// An order service wired to an in-process payment service.
pub struct Harness {
    pub orders: InMemoryOrderLedger,
    pub payments: InMemoryPaymentStore,
    pub ledger: Arc<PaymentLedger>,
    pub orchestrator: Orchestrator,
}

pub fn harness() -> Harness {
    harness_with_notifier(Arc::new(LogNotifier))
}

pub fn harness_with_notifier(notifier: NotifierRef) -> Harness {
    let orders = InMemoryOrderLedger::new();
    let payments = InMemoryPaymentStore::new();
    let ledger = instant_ledger(payments.clone());
    let client = LocalPaymentClient::new(PaymentEndpoint::new(ledger.clone()));
    let orchestrator = orchestrator_with(
        orders.clone(),
        Box::new(client),
        notifier,
        CheckoutConfig::default(),
    );
    Harness {
        orders,
        payments,
        ledger,
        orchestrator,
    }
}

pub fn write_orders_csv(path: &Path, rows: &[&str]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{ORDERS_HEADER}")?;
    for row in rows {
        writeln!(file, "{row}")?;
    }
    Ok(())
}
