#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
// easier to use when using the functions as callback of foreign functions
#![allow(clippy::needless_pass_by_value)]

use std::sync::Arc;

use anyhow::Result;
use axum::Extension;
use axum::Router;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use crate::api::Settings;
use crate::config::Config;
use crate::deletion::DEFAULT_CHUNK_SIZE;
use crate::deletion::DeletionPipeline;
use crate::identity::IdentityKeys;
use crate::registry::LinkRegistry;
use crate::storage::Storage;

mod api;
mod codes;
mod config;
mod deletion;
mod graceful_shutdown;
mod identity;
mod links;
mod registry;
mod root;
mod storage;
#[cfg(test)]
mod tests;

const DEFAULT_RUST_LOG: &str = "snipper=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    setup_environment();
    setup_tracing();

    let config = Config::parse();

    let (app, registry) = setup_app(&config).await?;

    let listener = TcpListener::bind(&config.address).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(graceful_shutdown::handler())
        .await?;

    registry.shutdown().await;

    Ok(())
}

/// Create and setup the app with its dependencies
///
/// The registry is handed back as well, pending deletes need it at shutdown
///
/// # Errors
///
/// Will return `Err` if any of its dependencies fail to load:
/// - Storage setup, like opening the file or connecting to the database
/// - Secret generation
pub async fn setup_app(config: &Config) -> Result<(Router, LinkRegistry)> {
    let storage = storage::setup(config.storage()).await?;

    setup_app_with_storage(config, storage)
}

/// Create and setup the app on top of an existing storage
///
/// # Errors
///
/// Will return `Err` when no secret is configured and none can be generated
pub fn setup_app_with_storage(
    config: &Config,
    storage: Arc<dyn Storage>,
) -> Result<(Router, LinkRegistry)> {
    let deletion = DeletionPipeline::new(storage.clone(), config.delete_workers, DEFAULT_CHUNK_SIZE);
    let registry = LinkRegistry::new(storage, deletion);

    let keys = setup_identity_keys(config)?;
    let settings = Settings::new(&config.base_url, &config.cookie_name);

    Ok((create_router(registry.clone(), keys, settings), registry))
}

/// Create the router for Snipper
fn create_router(registry: LinkRegistry, keys: IdentityKeys, settings: Settings) -> Router {
    Router::new()
        .route("/", post(api::create_plain))
        .route("/ping", get(api::ping))
        .route("/{code}", get(root::root))
        .nest("/api", api::router())
        .layer(middleware::from_fn(api::identify))
        .layer(CompressionLayer::new())
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(registry))
        .layer(Extension(keys))
        .layer(Extension(settings))
}

fn setup_environment() {
    dotenvy::dotenv().ok();
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.into()),
        ))
        .with(fmt::layer())
        .init();
}

fn setup_identity_keys(config: &Config) -> Result<IdentityKeys> {
    let secret = if let Some(secret) = config.secret() {
        secret.to_string()
    } else {
        let secret = identity::generate_secret()?;
        tracing::info!("`SECRET_STRING` is not set, generating temporary one: {secret}");
        secret
    };

    Ok(IdentityKeys::new(secret.as_bytes()))
}
