//! sz-playground
//!
//! Serves the in-memory service over gRPC so the quick-start commands can run
//! without a real engine.

use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sz_quickstart::transport::{serve_with_shutdown, SzServices};
use sz_quickstart::InMemorySenzing;

#[derive(Parser)]
#[command(name = "sz-playground")]
#[command(about = "In-memory Senzing-compatible gRPC service", long_about = None)]
#[command(version)]
struct Cli {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8261)]
    port: u16,

    /// Listen on all interfaces instead of loopback only.
    #[arg(long)]
    public: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sz_quickstart=info,sz_playground=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let ip = if cli.public { Ipv4Addr::UNSPECIFIED } else { Ipv4Addr::LOCALHOST };
    let addr = SocketAddr::from((ip, cli.port));

    let service = InMemorySenzing::new();
    let services = SzServices::from_factory(&service).await?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), %addr, "sz-playground starting; press Ctrl+C to stop");
    serve_with_shutdown(services, addr, async {
        let _ = signal::ctrl_c().await;
    })
    .await?;

    tracing::info!("shut down");
    Ok(())
}
