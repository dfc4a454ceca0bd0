mod cli;
mod server;

use std::sync::Arc;
use std::time::Duration;

use bitcoin::Amount;
use clap::Parser;
use eyre::{eyre, WrapErr};

use flacon_core::provider::MempoolClient;
use flacon_core::ConflictPolicy;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    if args.estimated_vbytes == 0 {
        return Err(eyre!("--estimated-vbytes must be at least 1"));
    }

    let client = Arc::new(
        MempoolClient::new(
            &args.mainnet_api,
            &args.testnet_api,
            args.requests_per_second,
        )
        .wrap_err("configure mempool API client")?,
    );
    tracing::info!(
        mainnet = %client.base_url(flacon_core::NetworkParams::Main),
        testnet = %client.base_url(flacon_core::NetworkParams::Test),
        "using mempool API"
    );

    let state = server::AppState {
        chain: client.clone(),
        submitter: client,
        conflict_policy: ConflictPolicy {
            estimated_vbytes: args.estimated_vbytes,
            second_extra_debit: Amount::from_sat(args.second_extra_debit),
        },
        submit_timeout: Duration::from_secs(args.submit_timeout_secs),
        primitives: Default::default(),
    };

    let bind_addr = format!("{}:{}", args.bind, args.port);
    let router = server::build_router(state, args.allow_origin.as_deref())
        .wrap_err("build HTTP router")?;

    if args.bind == "0.0.0.0" {
        tracing::warn!("server is bound to 0.0.0.0 and reachable from the network");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("bind TCP listener")?;

    tracing::info!("Flacon API listening on {bind_addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("run HTTP server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
