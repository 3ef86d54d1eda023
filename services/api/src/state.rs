//! Application state shared across handlers

use common::storage::BlobStore;
use sqlx::PgPool;
use std::sync::Arc;

use crate::{
    config::ServerConfig,
    jwt::{JwtService, TokenDenylist},
    rate_limiter::RateLimiter,
    repositories::{UserRepository, media::MediaRepository},
    spotify::SpotifyClient,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<ServerConfig>,
    pub user_repository: UserRepository,
    pub media_repository: MediaRepository,
    pub jwt_service: JwtService,
    /// Present when `TOKEN_DENYLIST` is enabled
    pub token_denylist: Option<TokenDenylist>,
    pub login_limiter: RateLimiter,
    pub video_bucket: Arc<dyn BlobStore>,
    pub image_bucket: Arc<dyn BlobStore>,
    /// Present when Spotify credentials are configured
    pub spotify: Option<SpotifyClient>,
}
