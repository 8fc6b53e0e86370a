use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use prometheus::Registry;
use rfc_exporter::{
    collector::Collector,
    config::read_config_file,
    connector::{Connector, GatewayConnector},
    discovery::{discover_servers, resolve_credentials},
    exporter::Exporter,
    server::{HttpConfig, spawn_http_server},
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Validate the config file and exit
    #[arg(long)]
    check: bool,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("rfc_exporter", LevelFilter::DEBUG),
        ("exporter", LevelFilter::DEBUG),
        ("tower_http", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config = read_config_file(&args.file)?;
    if args.check {
        info!(
            systems = config.systems.len(),
            metrics = config.table_metrics.len(),
            "config is valid"
        );
        return Ok(());
    }

    let connector: Arc<dyn Connector> = Arc::new(GatewayConnector::new(&config.gateway)?);

    resolve_credentials(&mut config.systems);
    discover_servers(connector.as_ref(), &mut config.systems).await;

    let mut collector = Collector::new(config.table_metrics, config.systems, connector);
    if let Some(max_in_flight) = config.exporter.max_in_flight {
        collector = collector.with_max_in_flight(max_in_flight);
    }
    if let Some(timeout) = config.exporter.scrape_timeout() {
        collector = collector.with_scrape_timeout(timeout);
    }

    let exporter = Exporter::new(collector);
    for desc in exporter.describe().await {
        info!(
            metric = %desc.fq_name,
            labels = ?desc.variable_labels,
            "exposing metric family"
        );
    }

    let registry = Registry::new();
    registry.register(Box::new(exporter))?;

    let addr = spawn_http_server(
        HttpConfig {
            bind_addr: SocketAddr::new(config.exporter.address, config.exporter.port),
            auth_token: config.exporter.auth_token,
        },
        registry,
    )
    .await?;
    info!("serving metrics on http://{addr}/metrics");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    Ok(())
}
