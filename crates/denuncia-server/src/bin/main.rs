//! denuncia-server binary: HTTP resolver

use std::path::PathBuf;

use clap::Parser;
use denuncia_core::{LedgerReader, ResolverConfig};
use denuncia_ledger::LedgerRpcClient;
use denuncia_server::ServerBuilder;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "denuncia-server")]
#[command(about = "Serve record resolution and decryption over HTTP")]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "3000")]
    port: u16,

    /// Ledger JSON-RPC URL (overrides config)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Record index contract; `/records` is disabled without one
    #[arg(long)]
    contract: Option<String>,

    /// Expose Prometheus metrics on /metrics
    #[arg(long)]
    metrics: bool,
}

async fn serve<L: LedgerReader + 'static>(
    builder: ServerBuilder<L>,
    args: &Args,
) -> anyhow::Result<()> {
    let mut builder = builder.port(args.port);
    if args.metrics {
        builder = builder.metrics(denuncia_server::metrics::init_prometheus_recorder()?);
    }
    let server = builder.build()?;

    tracing::info!("Server ready on port {}", args.port);
    server.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("denuncia=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ResolverConfig::load(path)?,
        None => ResolverConfig::default(),
    };
    if let Some(url) = &args.rpc_url {
        config.ledger.rpc_url = url.clone();
    }
    if let Some(address) = &args.contract {
        config.ledger.contract_address = address.clone();
    }

    let builder = ServerBuilder::new(config.clone());
    if config.ledger.contract_address.is_empty() {
        tracing::info!("No contract configured, serving content routes only");
        serve(builder, &args).await
    } else {
        let ledger = LedgerRpcClient::connect(&config.ledger).await?;
        serve(builder.ledger(ledger), &args).await
    }
}
