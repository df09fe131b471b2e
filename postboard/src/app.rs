//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::config::AppConfig;
use crate::database::{create_pool, Repository};
use crate::error::Result;
use crate::services::PostsService;
use crate::storage::BlobStore;
use std::sync::Arc;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub posts: PostsService,
}

impl AppState {
    /// Application setup, called once on startup
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        tracing::info!("Initializing application");
        tracing::info!("Data directory: {:?}", config.data_dir);

        std::fs::create_dir_all(&config.data_dir)?;

        let pool = create_pool(&config.database_path()).await?;
        let repo = Repository::new(pool);

        let blob_store = BlobStore::new(config.blob_dir());
        blob_store.initialize().await?;

        let posts = PostsService::new(Arc::new(repo), Arc::new(blob_store))
            .with_timeout(config.operation_timeout);

        tracing::info!("Application initialized successfully");

        Ok(Self { config, posts })
    }
}
