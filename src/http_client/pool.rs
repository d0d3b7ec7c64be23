//! A thread-safe pool of retryable HTTP clients, keyed by retry policy.
//!
//! Webhook deliveries with the same retry policy share one client, which is
//! what keeps connection pooling effective across dispatch cycles.

use super::client::create_retryable_http_client;
use crate::config::{BaseHttpClientConfig, HttpRetryConfig};
use reqwest::Client as ReqwestClient;
use reqwest_middleware::ClientWithMiddleware;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur within the `HttpClientPool`.
#[derive(Debug, Error)]
pub enum HttpClientPoolError {
    /// An error occurred while building the underlying `reqwest::Client`.
    #[error("Failed to create HTTP client: {0}")]
    HttpClientBuildError(String),
}

/// A pool for managing and reusing HTTP clients.
pub struct HttpClientPool {
    base_config: BaseHttpClientConfig,
    clients: Arc<RwLock<HashMap<String, Arc<ClientWithMiddleware>>>>,
}

impl HttpClientPool {
    /// Creates a new, empty pool building clients from the given base config.
    pub fn new(base_config: BaseHttpClientConfig) -> Self {
        Self { base_config, clients: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Gets an existing client for the retry policy or creates one. Uses a
    /// double-checked locking pattern to minimize write-lock contention.
    pub async fn get_or_create(
        &self,
        retry_policy: &HttpRetryConfig,
    ) -> Result<Arc<ClientWithMiddleware>, HttpClientPoolError> {
        let key = format!("{retry_policy:?}");

        if let Some(client) = self.clients.read().await.get(&key) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;
        // Another task may have created the client while we waited.
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let base_client = ReqwestClient::builder()
            .pool_max_idle_per_host(self.base_config.max_idle_per_host)
            .pool_idle_timeout(Some(self.base_config.idle_timeout))
            .connect_timeout(self.base_config.connect_timeout)
            .build()
            .map_err(|e| HttpClientPoolError::HttpClientBuildError(e.to_string()))?;

        let new_client = Arc::new(create_retryable_http_client(retry_policy, base_client));
        clients.insert(key, new_client.clone());

        Ok(new_client)
    }

    /// Returns the number of active HTTP clients in the pool.
    #[cfg(test)]
    pub async fn get_active_client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for HttpClientPool {
    fn default() -> Self {
        Self::new(BaseHttpClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_reuses_client_per_policy() {
        let pool = HttpClientPool::default();
        assert_eq!(pool.get_active_client_count().await, 0);

        let policy = HttpRetryConfig::default();
        let client1 = pool.get_or_create(&policy).await.unwrap();
        let client2 = pool.get_or_create(&policy).await.unwrap();

        assert!(Arc::ptr_eq(&client1, &client2), "same policy must share a client");
        assert_eq!(pool.get_active_client_count().await, 1);
    }

    #[tokio::test]
    async fn test_pool_isolates_different_policies() {
        let pool = HttpClientPool::default();
        let policy1 = HttpRetryConfig::default();
        let policy2 = HttpRetryConfig { max_retries: 5, ..Default::default() };

        let client1 = pool.get_or_create(&policy1).await.unwrap();
        let client2 = pool.get_or_create(&policy2).await.unwrap();

        assert!(!Arc::ptr_eq(&client1, &client2));
        assert_eq!(pool.get_active_client_count().await, 2);
    }

    #[tokio::test]
    async fn test_pool_concurrent_access() {
        let pool = Arc::new(HttpClientPool::default());
        let policy = HttpRetryConfig::default();

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let policy = policy.clone();
                tokio::spawn(async move { pool.get_or_create(&policy).await.unwrap() })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(pool.get_active_client_count().await, 1);
    }
}
