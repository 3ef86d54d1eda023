//! Redis cache module for the Stillpoint application
//!
//! Redis only backs short-lived keys (revoked session tokens), so the
//! wrapper exposes set-with-TTL, existence checks and a ping.

use anyhow::Result;
use redis::{AsyncCommands, Client};
use tracing::info;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        Ok(RedisConfig { url })
    }
}

/// Redis connection handle shared across request handlers
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Open a Redis client; no connection is made until first use
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Set a key-value pair in Redis with optional TTL
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.get_connection().await?;

        match ttl_seconds {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }

        Ok(())
    }

    /// Check whether a key is present
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let present: bool = conn.exists(key).await?;
        Ok(present)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> RedisConfig {
        RedisConfig {
            url: "redis://localhost:6379".to_string(),
        }
    }

    #[tokio::test]
    async fn test_client_open_is_lazy() -> Result<()> {
        let config = RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
        };

        // Opening never dials the server.
        RedisPool::new(&config).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let config = RedisConfig {
            url: "not a redis url".to_string(),
        };

        assert!(RedisPool::new(&config).await.is_err());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_key_expires_after_ttl() -> Result<()> {
        let pool = RedisPool::new(&local_config()).await?;
        assert!(pool.health_check().await?);

        let key = "stillpoint_test_key";
        pool.set(key, "1", Some(1)).await?;
        assert!(pool.exists(key).await?);

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!pool.exists(key).await?);
        Ok(())
    }
}
