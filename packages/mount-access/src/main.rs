use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use mount_access::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    ops_support::logging::init(
        args.log_format,
        &ops_support::logging::default_filter("mount_access"),
    );

    let config = args.mount_config().context("invalid configuration")?;
    tracing::info!(?config, "starting mount-access-controller");

    let addr = args.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, mount_access::app(config))
        .with_graceful_shutdown(ops_support::shutdown::signal())
        .await
        .context("server error")?;

    Ok(())
}
