//! Retryable HTTP client construction and pooling for outbound deliveries.

mod client;
mod pool;

pub use client::create_retryable_http_client;
pub use pool::{HttpClientPool, HttpClientPoolError};
