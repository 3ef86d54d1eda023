//! Common library for the Stillpoint application
//!
//! This crate provides shared infrastructure used by the Stillpoint
//! services: database connectivity and migrations, the Redis connection
//! wrapper, the media bucket abstraction, and the error types they share.
//!
//! # Example
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
//! use common::storage::{StorageConfig, open_buckets};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     run_migrations(&pool).await?;
//!     println!("Database health check: {}", health_check(&pool).await?);
//!
//!     let buckets = open_buckets(&StorageConfig::from_env()?).await?;
//!     let blob = buckets.video.open("intro.mp4", None).await?;
//!     println!("intro.mp4 is {:?} bytes", blob.content_length);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod storage;
