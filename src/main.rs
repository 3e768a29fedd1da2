use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aws_clients;
mod config;
mod domain;
mod errors;
mod forms;
mod handlers;
mod models;
mod repositories;
mod routes;
mod startup;
mod storage;

use crate::config::{Config, StoreConfig};
use crate::domain::{FileStorage, PostRepository};
use crate::repositories::{DynamoDbPostRepository, InMemoryPostRepository};
use crate::storage::LocalFileStorage;

/// AppState holds shared resources for the web server.
struct AppState {
    post_repo: Arc<dyn PostRepository>,
    file_storage: Arc<dyn FileStorage>,
    max_upload_bytes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "blog_posts_api=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(?config, "Configuration loaded");

    let post_repo = build_post_repository(&config.store).await;

    let file_storage = LocalFileStorage::new(config.upload_dir.clone())
        .await
        .with_context(|| format!("Failed to prepare upload directory {}", config.upload_dir.display()))?;

    let state = Arc::new(AppState {
        post_repo,
        file_storage: Arc::new(file_storage),
        max_upload_bytes: config.max_upload_bytes,
    });

    let app = routes::create_router(state);

    tracing::info!("Server is running on http://{}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Connects the configured document store. A failed DynamoDB table check is
/// logged and startup continues; requests then fail individually.
async fn build_post_repository(store: &StoreConfig) -> Arc<dyn PostRepository> {
    match store {
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory post store; posts are lost on restart");
            Arc::new(InMemoryPostRepository::new())
        }
        StoreConfig::DynamoDb {
            table_name,
            aws_region,
            endpoint_url,
        } => {
            let sdk_config = aws_clients::create_sdk_config(aws_region, endpoint_url.as_deref()).await;
            let db_client = aws_clients::create_dynamodb_client(&sdk_config);

            match startup::ensure_posts_table(&db_client, table_name).await {
                Ok(()) => tracing::info!("DynamoDB connected"),
                Err(e) => tracing::error!(error = ?e, "DynamoDB connection error, continuing without a verified store"),
            }

            Arc::new(DynamoDbPostRepository::new(db_client, table_name.clone()))
        }
    }
}
