//! Configuration module for Vigil.

mod app_config;
mod dispatcher;
mod helpers;
mod http_base;
mod http_retry;
mod server;
mod smtp;

pub use app_config::AppConfig;
pub use dispatcher::DispatcherConfig;
pub use helpers::{
    deserialize_duration_from_ms, deserialize_duration_from_seconds, serialize_duration_to_ms,
    serialize_duration_to_seconds,
};
pub use http_base::BaseHttpClientConfig;
pub use http_retry::{HttpRetryConfig, JitterSetting};
pub use server::ServerConfig;
pub use smtp::SmtpConfig;
