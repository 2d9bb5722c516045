use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use memleak_demo::{leaker, routes, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    ops_support::logging::init(
        args.log_format,
        &ops_support::logging::default_filter("memleak_demo"),
    );

    // Holding the handle keeps the buffer alive once growth stops.
    let (stats, _leaker) = leaker::spawn(args.leak_config());

    let addr = args.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, routes::router(stats))
        .with_graceful_shutdown(ops_support::shutdown::signal())
        .await
        .context("server error")?;

    Ok(())
}
