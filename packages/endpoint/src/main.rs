use std::sync::Arc;

use clap::Parser;
use silo_agent::builtin_registry;
use silo_endpoint::{serve, EndpointConfig, LocalEndpoint, ServeError};
use silo_store::ContentStoreClient;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EndpointConfig::parse();
    if let Err(e) = run(config).await {
        error!(error = %e, "endpoint failed");
        std::process::exit(1);
    }
}

async fn run(config: EndpointConfig) -> Result<(), ServeError> {
    let store = match &config.store_url {
        Some(url) => ContentStoreClient::http(url)?,
        None => {
            warn!("no store configured, only inline requests can be resolved");
            ContentStoreClient::in_memory()
        }
    };
    let endpoint = Arc::new(LocalEndpoint::new(store, builtin_registry()));

    let handle = serve(endpoint, &config.bind, config.api_key).await?;
    tokio::signal::ctrl_c().await?;
    handle.shutdown().await
}
