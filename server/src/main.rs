use anyhow::Result;
use axum::Router;
use clap::Parser;
use recsys_core::fuzzy::DEFAULT_CUTOFF;
use recsys_server::{build_app, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Artifact directory written by `packer pack`
    #[arg(long, default_value = "./artifacts")]
    artifacts: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Minimum title similarity for a fuzzy match, in [0, 1]
    #[arg(long, default_value_t = DEFAULT_CUTOFF)]
    cutoff: f64,
    /// Recommendations returned when the request does not set `k`
    #[arg(long, default_value_t = 5)]
    top_n: usize,
    /// Upper bound on `k`
    #[arg(long, default_value_t = 100)]
    max_top_n: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = ServerConfig { artifacts: args.artifacts, cutoff: args.cutoff, default_top_n: args.top_n, max_top_n: args.max_top_n };
    let app: Router = build_app(config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
