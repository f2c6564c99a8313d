//! inkr-func-api server binary.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use inkr_func_api::config::{Cli, Config};
use inkr_func_api::server::api::{build_router, AppState};
use inkr_func_api::upstream::AzureOpenAiClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments (environment variables fill in unset flags).
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "inkr_func_api=debug,tower_http=debug"
    } else {
        "inkr_func_api=info,tower_http=info"
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true);

    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("inkr-func-api v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_cli(cli)?;

    info!(
        endpoint = config.upstream.endpoint,
        deployment = config.upstream.deployment,
        api_version = config.upstream.api_version,
        timeout_secs = config.upstream.timeout_secs,
        function_key = config.server.function_key.is_some(),
        "Configuration loaded"
    );

    let upstream = AzureOpenAiClient::new(config.upstream.clone())?;
    let config = Arc::new(config);

    let state = Arc::new(AppState {
        config: config.clone(),
        upstream,
    });

    let app = build_router(state);

    let listen_addr = &config.server.listen;
    let listener = TcpListener::bind(listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
