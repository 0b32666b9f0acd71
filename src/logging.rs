//! Logger initialisation: log4rs from a YAML file when one is present,
//! env_logger otherwise.

use std::path::Path;

use log::info;

use crate::config::LoggingConfig;
use crate::error::ConfigurationError;

pub fn init(config: &LoggingConfig) -> Result<(), ConfigurationError> {
    if Path::new(&config.config_file).exists() {
        log4rs::init_file(&config.config_file, Default::default())
            .map_err(|e| ConfigurationError::Logging(e.to_string()))?;
        info!("Logging configured from {}", config.config_file);
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init()
            .map_err(|e| ConfigurationError::Logging(e.to_string()))?;
        info!("{} not found, logging to stderr", config.config_file);
    }
    Ok(())
}
