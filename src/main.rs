use clap::Parser;
use miette::{IntoDiagnostic, Result};
use paydispatch::application::connection::BrokerConnection;
use paydispatch::application::consumer::Consumer;
use paydispatch::application::orders::OrderService;
use paydispatch::application::payment::PaymentProcessor;
use paydispatch::application::publisher::Publisher;
use paydispatch::application::shutdown::{ShutdownCoordinator, termination_signal};
use paydispatch::config::{
    DEFAULT_MAX_RETRIES, DEFAULT_PREFETCH, DEFAULT_QUEUE_NAME, DispatchConfig,
};
use paydispatch::domain::ports::Connector;
use paydispatch::error::DispatchError;
#[cfg(feature = "broker-amqp")]
use paydispatch::infrastructure::amqp::AmqpConnector;
use paydispatch::infrastructure::gateway::{DEFAULT_APPROVAL_RATE, SimulatedGateway};
use paydispatch::infrastructure::in_memory::{InMemoryOrderStore, InMemoryPaymentStore};
use paydispatch::infrastructure::memory_broker::InMemoryBroker;
use paydispatch::interfaces::csv::order_reader::OrderReader;
use paydispatch::interfaces::csv::status_writer::StatusWriter;
use std::fs::File;
use std::io;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MEMORY_URL: &str = "memory://local";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input orders CSV file (customer_id,total,items)
    input: PathBuf,

    /// RabbitMQ URL (optional). Requires the `broker-amqp` feature; otherwise
    /// an in-process broker is used.
    #[arg(long, env = "RABBITMQ_URL")]
    amqp_url: Option<String>,

    /// Unacknowledged deliveries per consumer, also the worker concurrency.
    #[arg(long, env = "PREFETCH_COUNT", default_value_t = DEFAULT_PREFETCH)]
    prefetch: u16,

    /// Deliveries per task before it is dead-lettered.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    #[arg(long, env = "QUEUE_NAME", default_value = DEFAULT_QUEUE_NAME)]
    queue_name: String,

    /// Share of charges the simulated gateway approves.
    #[arg(long, default_value_t = DEFAULT_APPROVAL_RATE)]
    approval_rate: f64,

    /// Simulated gateway latency in milliseconds, as LO..HI.
    #[arg(long, default_value = "100..500", value_parser = parse_latency)]
    latency_ms: RangeInclusive<Duration>,

    /// The k-th retry waits k^2 of these.
    #[arg(long, default_value_t = 1000)]
    backoff_unit_ms: u64,

    #[arg(long, default_value_t = 30)]
    shutdown_grace_secs: u64,

    /// Log filter, e.g. `debug` or `paydispatch=trace`. Defaults to RUST_LOG, then `info`.
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_latency(value: &str) -> std::result::Result<RangeInclusive<Duration>, String> {
    let parse = |ms: &str| {
        ms.trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| format!("invalid latency '{ms}': {e}"))
    };
    let (lo, hi) = match value.split_once("..") {
        Some((lo, hi)) => (parse(lo)?, parse(hi.trim_start_matches('='))?),
        None => {
            let fixed = parse(value)?;
            (fixed, fixed)
        }
    };
    if lo > hi {
        return Err(format!("latency range '{value}' is empty"));
    }
    Ok(lo..=hi)
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).into_diagnostic()?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

#[cfg(feature = "broker-amqp")]
fn select_connector(amqp_url: Option<String>) -> (Box<dyn Connector>, String) {
    match amqp_url {
        Some(url) => (Box::new(AmqpConnector), url),
        None => (Box::new(InMemoryBroker::new()), MEMORY_URL.to_string()),
    }
}

#[cfg(not(feature = "broker-amqp"))]
fn select_connector(amqp_url: Option<String>) -> (Box<dyn Connector>, String) {
    if amqp_url.is_some() {
        eprintln!(
            "WARNING: Broker requested via --amqp-url, but 'broker-amqp' feature is not enabled. Falling back to In-Memory broker."
        );
    }
    (Box::new(InMemoryBroker::new()), MEMORY_URL.to_string())
}

/// Resolves once every enqueued order has reached a terminal status. Orders
/// that never made it onto the queue are `stranded` and stay pending; orders
/// whose task was dead-lettered stay `processing`.
async fn wait_until_resolved(
    service: &OrderService,
    stranded: usize,
    dead_lettered: &AtomicUsize,
) -> std::result::Result<(), DispatchError> {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        let summary = service.summary().await?;
        let dead = dead_lettered.load(Ordering::SeqCst);
        if summary.unresolved() <= stranded + dead {
            info!(
                completed = summary.completed,
                failed = summary.failed,
                stranded,
                dead_lettered = dead,
                "All queued orders resolved"
            );
            return Ok(());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    let config = DispatchConfig::new(cli.queue_name)
        .with_prefetch(cli.prefetch)
        .with_max_retries(cli.max_retries)
        .with_backoff_unit(Duration::from_millis(cli.backoff_unit_ms))
        .with_shutdown_grace(Duration::from_secs(cli.shutdown_grace_secs));
    let gateway = SimulatedGateway::new(cli.approval_rate, cli.latency_ms).into_diagnostic()?;

    let (connector, url) = select_connector(cli.amqp_url);
    let connection = BrokerConnection::open(connector.as_ref(), &url, config)
        .await
        .into_diagnostic()?;

    let orders = InMemoryOrderStore::new();
    let publisher = Arc::new(Publisher::new(&connection));
    let service = OrderService::new(Arc::new(orders.clone()), publisher.clone());
    let processor = PaymentProcessor::new(
        Arc::new(orders),
        Arc::new(InMemoryPaymentStore::new()),
        Arc::new(gateway),
    );

    let consumer = Consumer::new(&connection, publisher, Arc::new(processor));
    let in_flight = consumer.in_flight();
    let dead_lettered = consumer.dead_lettered();
    let cancel = CancellationToken::new();
    let mut consumer_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { consumer.run(cancel).await }
    });

    // Submit orders
    let file = File::open(&cli.input).into_diagnostic()?;
    let mut stranded = 0;
    for row in OrderReader::new(file).orders() {
        match row {
            Ok(row) => {
                let items = row.item_list();
                match service.submit(row.customer_id, items, row.total).await {
                    Ok(submitted) if !submitted.enqueued => stranded += 1,
                    Ok(_) => {}
                    Err(e) => eprintln!("Error submitting order: {}", e),
                }
            }
            Err(e) => {
                eprintln!("Error reading order: {}", e);
            }
        }
    }

    let finished = tokio::select! {
        waited = wait_until_resolved(&service, stranded, &dead_lettered) => {
            if let Err(e) = waited {
                warn!(error = %e, "Stopped waiting for orders");
            }
            None
        }
        _ = termination_signal() => None,
        joined = &mut consumer_task => Some(joined),
    };

    ShutdownCoordinator::from_config(connection.config())
        .shutdown(&cancel, &in_flight)
        .await;
    let consumer_result = match finished {
        Some(joined) => joined,
        None => consumer_task.await,
    }
    .into_diagnostic()?;

    // Output final state
    let mut final_orders = service.list(Some(usize::MAX)).await.into_diagnostic()?;
    final_orders.reverse();
    let stdout = io::stdout();
    let mut writer = StatusWriter::new(stdout.lock());
    writer.write_orders(&final_orders).into_diagnostic()?;

    if let Err(e) = connection.close().await {
        warn!(error = %e, "Failed to close broker connection");
    }
    consumer_result.into_diagnostic()
}
