//! Spotify token exchange on behalf of the web client
//!
//! The client runs the authorization redirect itself and hands us the
//! code; we hold the client secret and talk to the accounts service.

use anyhow::Result;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, RedirectUrl, RefreshToken,
    RequestTokenError, TokenResponse, TokenUrl,
    basic::{BasicClient, BasicTokenResponse},
    reqwest::async_http_client,
};
use serde::{Deserialize, Serialize};
use std::{fmt, future::Future, time::Duration};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};

const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Spotify client credentials
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
}

impl SpotifyConfig {
    /// Read the credentials from the environment
    ///
    /// Returns `None` when `SPOTIFY_CLIENT_ID` or `SPOTIFY_CLIENT_SECRET`
    /// is unset, which disables the integration.
    ///
    /// # Environment Variables
    /// - `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET`
    /// - `SPOTIFY_AUTH_URL`, `SPOTIFY_TOKEN_URL`: accounts service endpoints
    pub fn from_env(redirect_url: &str) -> Option<Self> {
        let client_id = std::env::var("SPOTIFY_CLIENT_ID").ok()?;
        let client_secret = std::env::var("SPOTIFY_CLIENT_SECRET").ok()?;

        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }

        Some(Self {
            client_id,
            client_secret,
            redirect_url: redirect_url.to_string(),
            auth_url: std::env::var("SPOTIFY_AUTH_URL")
                .unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string()),
            token_url: std::env::var("SPOTIFY_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
        })
    }
}

/// Body of `POST /login-spotify`
#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

/// Body of `POST /refresh`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Tokens handed back to the web client
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotifyTokens {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

impl From<BasicTokenResponse> for SpotifyTokens {
    fn from(response: BasicTokenResponse) -> Self {
        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|token| token.secret().clone()),
            expires_in: response.expires_in().map(|d| d.as_secs()),
        }
    }
}

/// OAuth2 client for the Spotify accounts service
#[derive(Clone)]
pub struct SpotifyClient {
    client: BasicClient,
    timeout: Duration,
}

impl SpotifyClient {
    pub fn new(config: SpotifyConfig, timeout: Duration) -> Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.client_id),
            Some(ClientSecret::new(config.client_secret)),
            AuthUrl::new(config.auth_url)?,
            Some(TokenUrl::new(config.token_url)?),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_url)?);

        Ok(Self { client, timeout })
    }

    /// Exchange an authorization code for access and refresh tokens
    pub async fn exchange_code(&self, code: String) -> ApiResult<SpotifyTokens> {
        info!("Exchanging Spotify authorization code");

        let request = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(async_http_client);

        self.bounded(request).await
    }

    /// Get a fresh access token from a refresh token
    pub async fn refresh(&self, refresh_token: String) -> ApiResult<SpotifyTokens> {
        info!("Refreshing Spotify access token");

        let refresh_token = RefreshToken::new(refresh_token);
        let request = self
            .client
            .exchange_refresh_token(&refresh_token)
            .request_async(async_http_client);

        let mut tokens = self.bounded(request).await?;
        tokens.refresh_token = None;
        Ok(tokens)
    }

    async fn bounded<F, RE, TE>(&self, request: F) -> ApiResult<SpotifyTokens>
    where
        F: Future<Output = Result<BasicTokenResponse, RequestTokenError<RE, TE>>>,
        RE: std::error::Error + 'static,
        TE: oauth2::ErrorResponse + fmt::Display + 'static,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Err(_) => {
                warn!("Spotify token request timed out after {:?}", self.timeout);
                Err(ApiError::UpstreamTimeout)
            }
            Ok(Ok(response)) => Ok(response.into()),
            Ok(Err(err)) => Err(map_token_error(err)),
        }
    }
}

fn map_token_error<RE, TE>(err: RequestTokenError<RE, TE>) -> ApiError
where
    RE: std::error::Error + 'static,
    TE: oauth2::ErrorResponse + fmt::Display + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            warn!("Spotify rejected the token request: {}", response);
            ApiError::UpstreamRejected(response.to_string())
        }
        RequestTokenError::Request(e) => {
            warn!("Spotify token request failed: {}", e);
            ApiError::Upstream(e.to_string())
        }
        RequestTokenError::Parse(e, _) => {
            warn!("Unreadable Spotify token response: {}", e);
            ApiError::Upstream(e.to_string())
        }
        RequestTokenError::Other(msg) => {
            warn!("Spotify token request failed: {}", msg);
            ApiError::Upstream(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serial_test::serial;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    /// Serve a fake token endpoint and return its URL
    async fn token_endpoint(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api/token", addr)
    }

    fn client(token_url: String, timeout: Duration) -> SpotifyClient {
        SpotifyClient::new(
            SpotifyConfig {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                redirect_url: "http://localhost:5173".to_string(),
                auth_url: DEFAULT_AUTH_URL.to_string(),
                token_url,
            },
            timeout,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_exchange_code_returns_tokens() {
        let url = token_endpoint(Router::new().route(
            "/api/token",
            post(|| async {
                Json(json!({
                    "access_token": "access-1",
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "refresh_token": "refresh-1"
                }))
            }),
        ))
        .await;

        let tokens = client(url, Duration::from_secs(5))
            .exchange_code("code-1".to_string())
            .await
            .unwrap();

        let value: Value = serde_json::to_value(&tokens).unwrap();
        assert_eq!(
            value,
            json!({"accessToken": "access-1", "refreshToken": "refresh-1", "expiresIn": 3600})
        );
    }

    #[tokio::test]
    async fn test_refresh_omits_refresh_token() {
        let url = token_endpoint(Router::new().route(
            "/api/token",
            post(|| async {
                Json(json!({
                    "access_token": "access-2",
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "refresh_token": "rotated"
                }))
            }),
        ))
        .await;

        let tokens = client(url, Duration::from_secs(5))
            .refresh("refresh-1".to_string())
            .await
            .unwrap();

        let value: Value = serde_json::to_value(&tokens).unwrap();
        assert_eq!(value, json!({"accessToken": "access-2", "expiresIn": 3600}));
    }

    #[tokio::test]
    async fn test_rejected_code_is_bad_request() {
        let url = token_endpoint(Router::new().route(
            "/api/token",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid_grant"})),
                )
            }),
        ))
        .await;

        let err = client(url, Duration::from_secs(5))
            .exchange_code("expired".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let url = token_endpoint(Router::new().route(
            "/api/token",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        ))
        .await;

        let err = client(url, Duration::from_millis(100))
            .exchange_code("code-1".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{}/api/token", addr), Duration::from_secs(5))
            .exchange_code("code-1".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    #[serial]
    fn test_config_requires_both_credentials() {
        unsafe {
            std::env::set_var("SPOTIFY_CLIENT_ID", "client");
            std::env::remove_var("SPOTIFY_CLIENT_SECRET");
        }
        assert!(SpotifyConfig::from_env("http://localhost:5173").is_none());

        unsafe {
            std::env::set_var("SPOTIFY_CLIENT_SECRET", "secret");
            std::env::remove_var("SPOTIFY_TOKEN_URL");
        }
        let config = SpotifyConfig::from_env("http://localhost:5173").unwrap();
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.redirect_url, "http://localhost:5173");

        unsafe {
            std::env::remove_var("SPOTIFY_CLIENT_ID");
            std::env::remove_var("SPOTIFY_CLIENT_SECRET");
        }
    }
}
