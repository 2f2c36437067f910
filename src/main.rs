use clap::Parser;
use miette::{IntoDiagnostic, Result};
use orderpay::application::checkout::Orchestrator;
use orderpay::application::payment_ledger::PaymentLedger;
use orderpay::config::Config;
use orderpay::domain::ports::{OrderLedgerBox, PaymentClientBox, PaymentStoreBox};
use orderpay::infrastructure::gateway::SimulatedGateway;
use orderpay::infrastructure::in_memory::{InMemoryCatalog, InMemoryOrderLedger, InMemoryPaymentStore};
use orderpay::infrastructure::notifier::LogNotifier;
use orderpay::interfaces::csv::catalog_reader::CatalogReader;
use orderpay::interfaces::csv::order_reader::OrderReader;
use orderpay::interfaces::csv::outcome_writer::{CheckoutOutcome, OutcomeWriter};
use orderpay::interfaces::payment_api::{LocalPaymentClient, OfflinePaymentClient, PaymentEndpoint};
use orderpay::telemetry;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let config = Config::parse();
    config.validate().into_diagnostic()?;

    let catalog = load_catalog(&config.catalog)?;
    info!(products = catalog.len(), "catalog loaded");

    let (payment_store, order_ledger) = open_storage(config.db_path.as_deref())?;
    let ledger = Arc::new(PaymentLedger::new(
        payment_store,
        Box::new(SimulatedGateway::new(config.gateway())),
    ));
    let payments: PaymentClientBox = if config.payment_unreachable {
        Box::new(OfflinePaymentClient)
    } else {
        Box::new(LocalPaymentClient::new(PaymentEndpoint::new(ledger.clone())))
    };
    let orchestrator = Arc::new(Orchestrator::new(
        order_ledger,
        Box::new(catalog),
        payments,
        Arc::new(LogNotifier),
        config.checkout(),
    ));

    let file = File::open(&config.orders).into_diagnostic()?;
    let drafts = OrderReader::new(file).drafts();

    // One task per request; outcomes are collected in input order.
    let mut handles = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            match draft {
                Ok(draft) => {
                    let result = orchestrator.place_draft(&draft).await;
                    CheckoutOutcome::from_result(&draft.reference, &result)
                }
                Err(row) => {
                    warn!(reference = %row.reference, error = %row.error, "skipping unreadable order row");
                    CheckoutOutcome::unreadable(&row.reference, &row.error)
                }
            }
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.await.into_diagnostic()?);
    }
    orchestrator.drain_notifications().await;

    let stdout = io::stdout();
    OutcomeWriter::new(stdout.lock())
        .write_outcomes(outcomes)
        .into_diagnostic()?;

    if config.stats {
        let stats = ledger.statistics().await.into_diagnostic()?;
        eprintln!("{}", serde_json::to_string_pretty(&stats).into_diagnostic()?);
    }

    Ok(())
}

fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    let file = File::open(path).into_diagnostic()?;
    let products = CatalogReader::new(file)
        .products()
        .collect::<orderpay::error::Result<Vec<_>>>()
        .into_diagnostic()?;
    Ok(InMemoryCatalog::new(products))
}

fn in_memory_storage() -> (PaymentStoreBox, OrderLedgerBox) {
    (
        Box::new(InMemoryPaymentStore::new()),
        Box::new(InMemoryOrderLedger::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_storage(db_path: Option<&Path>) -> Result<(PaymentStoreBox, OrderLedgerBox)> {
    use orderpay::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            info!(path = %path.display(), "using RocksDB storage");
            Ok((Box::new(store.clone()), Box::new(store)))
        }
        None => Ok(in_memory_storage()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_storage(db_path: Option<&Path>) -> Result<(PaymentStoreBox, OrderLedgerBox)> {
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }
    Ok(in_memory_storage())
}
