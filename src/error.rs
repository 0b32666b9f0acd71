//! Error types surfaced by the gateway and its collaborators.
//!
//! Every request-path error renders as a `400` with a plain-text message.
//! Backend faults are not distinguished from client faults on the wire.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::naming::InvalidHandle;
use crate::storage::StoreError;

/// Errors that terminate a single upload or download request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    InvalidHandle(#[from] InvalidHandle),

    #[error("payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("error reading payload: {0}")]
    Payload(String),
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(self.to_string())
    }
}

/// Startup-only failures. Any of these aborts the process before it binds.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("bucket url not valid: {0}")]
    InvalidBucketUrl(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },

    #[error("failed to build object store client: {0}")]
    Backend(#[from] object_store::Error),

    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl From<ConfigurationError> for std::io::Error {
    fn from(err: ConfigurationError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err)
    }
}
