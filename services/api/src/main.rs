use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod jwt;
mod middleware;
mod models;
mod rate_limiter;
mod repositories;
mod routes;
mod spotify;
mod state;
mod streaming;
#[cfg(test)]
mod test_support;
mod validation;

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, init_pool, run_migrations},
    storage::{StorageConfig, open_buckets},
};

use crate::{
    config::ServerConfig,
    jwt::{JwtConfig, JwtService, TokenDenylist},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::{UserRepository, media::MediaRepository},
    spotify::{SpotifyClient, SpotifyConfig},
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting API service");

    let server_config = ServerConfig::load()?;
    let jwt_config = JwtConfig::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    run_migrations(&pool).await?;

    let buckets = open_buckets(&StorageConfig::from_env()?).await?;
    info!(
        "Media buckets ready: {} and {}",
        buckets.video.bucket(),
        buckets.image.bucket()
    );

    let token_denylist = if server_config.token_denylist {
        let redis_pool = RedisPool::new(&RedisConfig::from_env()?).await?;
        if !redis_pool.health_check().await? {
            anyhow::bail!("Failed to connect to Redis for the token denylist");
        }
        info!("Token denylist enabled");
        Some(TokenDenylist::new(redis_pool))
    } else {
        None
    };

    let spotify = match SpotifyConfig::from_env(&server_config.frontend_url) {
        Some(spotify_config) => Some(SpotifyClient::new(
            spotify_config,
            Duration::from_secs(server_config.spotify_timeout_secs),
        )?),
        None => {
            warn!("SPOTIFY_CLIENT_ID/SPOTIFY_CLIENT_SECRET not set, Spotify routes disabled");
            None
        }
    };

    let cors = server_config.cors_layer()?;
    let listen_addr = server_config.listen_addr();

    let app_state = AppState {
        db_pool: pool.clone(),
        config: Arc::new(server_config),
        user_repository: UserRepository::new(pool.clone()),
        media_repository: MediaRepository::new(pool.clone()),
        jwt_service: JwtService::new(jwt_config),
        token_denylist,
        login_limiter: RateLimiter::new(RateLimiterConfig::default()),
        video_bucket: buckets.video,
        image_bucket: buckets.image,
        spotify,
    };

    // Start the web server
    let app = routes::create_router(app_state, cors);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("API service listening on {}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("API service stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
