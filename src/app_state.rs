//! Application State Management
//!
//! This module provides the application state that contains the shared
//! collaborators of every request handler, following the dependency
//! injection pattern. Nothing in here changes after startup except the rate
//! limiter's internal token count.

use std::sync::Arc;

use log::info;

use crate::config::AppConfig;
use crate::error::ConfigurationError;
use crate::naming::key_generator::KeyGenerator;
use crate::rate_limit::RateLimiter;
use crate::storage::config::{create_store, StorageBackend};
use crate::storage::BlobStore;

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BlobStore>,
    pub limiter: Arc<RateLimiter>,
    pub keys: Arc<KeyGenerator>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Create application state from configuration
    pub fn from_config(config: AppConfig) -> Result<Self, ConfigurationError> {
        info!("Initializing application state with configuration");
        let store = create_store(&config.storage)?;
        Ok(Self::with_store(config, store, KeyGenerator::new()))
    }

    /// Assemble state around an existing store and key generator
    pub fn with_store(config: AppConfig, store: Arc<dyn BlobStore>, keys: KeyGenerator) -> Self {
        info!(
            "Rate limit: {} req/s, size limit: {:?} bytes",
            config.limits.rate_limit,
            config.limits.size_limit()
        );
        Self {
            store,
            limiter: Arc::new(RateLimiter::new(config.limits.rate_limit)),
            keys: Arc::new(keys),
            config: Arc::new(config),
        }
    }

    /// Create application state for testing with an in-memory store and no
    /// rate limiting
    pub fn new_for_testing() -> Self {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.limits.rate_limit = 0;
        config.expiration.enabled = false;
        Self::from_config(config).unwrap_or_else(|e| panic!("in-memory state cannot fail: {}", e))
    }
}
