//! Error types for the dispatch service.

use std::time::Duration;

use thiserror::Error;

use crate::{http_client::HttpClientPoolError, models::rule::ChannelKind};

/// Defines the possible errors that can occur while delivering notifications.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// An error related to invalid or missing channel configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The receiving end rejected or failed the delivery.
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    /// A delivery attempt exceeded its time budget.
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    /// No adapter is registered for the intent's channel.
    #[error("No adapter registered for channel: {0}")]
    UnknownChannel(ChannelKind),

    /// An error originating from the HTTP client pool.
    #[error("HTTP client error")]
    HttpClientError(#[from] HttpClientPoolError),

    /// An error from the underlying `reqwest` or `reqwest_middleware`
    /// libraries.
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest_middleware::Error),

    /// An internal error that should not occur under normal circumstances.
    #[error("Internal error: {0}")]
    InternalError(String),
}
