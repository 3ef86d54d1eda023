//! HTTP server configuration

use axum::http::{HeaderValue, Method, header};
use config::{Config, Environment, Map};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Settings of the HTTP surface, read from the environment
///
/// # Environment Variables
/// - `HOST`: listen address (default: 0.0.0.0)
/// - `PORT`: listen port (default: 3000)
/// - `FRONTEND_URL`: origin of the web client, used for CORS and as the
///   Spotify redirect URI (default: http://localhost:5173)
/// - `COOKIE_SECURE`: mark the auth cookie `Secure; SameSite=None` (default: true)
/// - `TOKEN_DENYLIST`: revoke tokens on logout through Redis (default: false)
/// - `SPOTIFY_TIMEOUT_SECS`: timeout of Spotify token calls (default: 10)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
    #[serde(default)]
    pub token_denylist: bool,
    #[serde(default = "default_spotify_timeout_secs")]
    pub spotify_timeout_secs: u64,
}

/// Environment variables read into [`ServerConfig`]
const SERVER_KEYS: [&str; 6] = [
    "HOST",
    "PORT",
    "FRONTEND_URL",
    "COOKIE_SECURE",
    "TOKEN_DENYLIST",
    "SPOTIFY_TIMEOUT_SECS",
];

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_true() -> bool {
    true
}

fn default_spotify_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frontend_url: default_frontend_url(),
            cookie_secure: true,
            token_denylist: false,
            spotify_timeout_secs: default_spotify_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// Load the configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        let vars: Map<String, String> = std::env::vars()
            .filter(|(key, _)| SERVER_KEYS.contains(&key.as_str()))
            .collect();

        let config: ServerConfig = Config::builder()
            .add_source(Environment::default().source(Some(vars)).try_parsing(true))
            .build()?
            .try_deserialize()?;

        // Fail at startup rather than on the first CORS preflight
        config.frontend_origin()?;

        Ok(config)
    }

    /// The frontend origin as a header value
    pub fn frontend_origin(&self) -> anyhow::Result<HeaderValue> {
        let origin = self.frontend_url.trim_end_matches('/');
        HeaderValue::from_str(origin)
            .map_err(|e| anyhow::anyhow!("Invalid FRONTEND_URL {}: {}", self.frontend_url, e))
    }

    /// CORS policy admitting the frontend with credentials
    pub fn cors_layer(&self) -> anyhow::Result<CorsLayer> {
        Ok(CorsLayer::new()
            .allow_origin(AllowOrigin::exact(self.frontend_origin()?))
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([header::CONTENT_TYPE, header::RANGE])
            .expose_headers([
                header::CONTENT_RANGE,
                header::ACCEPT_RANGES,
                header::CONTENT_LENGTH,
            ]))
    }

    /// Address to bind the listener to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        unsafe {
            for key in SERVER_KEYS {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_server_config_defaults() {
        clear_env();

        let config = ServerConfig::load().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.frontend_url, "http://localhost:5173");
        assert!(config.cookie_secure);
        assert!(!config.token_denylist);
        assert_eq!(config.spotify_timeout_secs, 10);
        assert_eq!(config.listen_addr(), "0.0.0.0:3000");
    }

    #[test]
    #[serial]
    fn test_server_config_from_env() {
        clear_env();
        unsafe {
            std::env::set_var("PORT", "8080");
            std::env::set_var("FRONTEND_URL", "https://yoga.example.com/");
            std::env::set_var("COOKIE_SECURE", "false");
            std::env::set_var("TOKEN_DENYLIST", "true");
        }

        let config = ServerConfig::load().unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.cookie_secure);
        assert!(config.token_denylist);
        assert_eq!(
            config.frontend_origin().unwrap(),
            HeaderValue::from_static("https://yoga.example.com")
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_server_config_rejects_bad_port() {
        clear_env();
        unsafe {
            std::env::set_var("PORT", "not-a-port");
        }

        assert!(ServerConfig::load().is_err());

        clear_env();
    }
}
