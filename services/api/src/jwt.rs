//! JWT service for session token generation and validation
//!
//! Session tokens are HS256-signed JWTs whose subject is the user's email.
//! They are stateless: validity is decided by signature and expiry alone,
//! unless the optional Redis denylist is enabled, in which case tokens
//! presented at logout are revoked for the rest of their lifetime.

use anyhow::Result;
use common::cache::RedisPool;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared secret for signing and verifying tokens
    pub secret: String,
    /// Token lifetime in seconds (default: 30 minutes)
    pub access_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: signing secret, at least 32 bytes
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: token lifetime in seconds (default: 1800)
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;

        if secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 bytes long");
        }

        let access_token_expiry = std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "1800".to_string()) // 30 minutes
            .parse()
            .unwrap_or(1800);

        Ok(JwtConfig {
            secret,
            access_token_expiry,
        })
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Email of the signed-in user
    pub sub: String,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

fn now_secs() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
        .as_secs())
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        JwtService {
            encoding_key,
            decoding_key,
            validation,
            config,
        }
    }

    /// Generate a session token for the given email
    pub fn generate_token(&self, email: &str) -> Result<String> {
        let now = now_secs()?;
        let claims = Claims {
            sub: email.to_string(),
            iat: now,
            exp: now + self.config.access_token_expiry,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate a token and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    /// Seconds until the token expires, zero when already expired
    pub fn remaining_lifetime(&self, claims: &Claims) -> Result<u64> {
        Ok(claims.exp.saturating_sub(now_secs()?))
    }

    /// Get the token expiry time
    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }
}

/// Revoked session tokens, kept in Redis until they would expire anyway
#[derive(Clone)]
pub struct TokenDenylist {
    redis_pool: RedisPool,
}

impl TokenDenylist {
    pub fn new(redis_pool: RedisPool) -> Self {
        Self { redis_pool }
    }

    fn key(token: &str) -> String {
        format!("revoked_token:{}", token)
    }

    /// Check if a token has been revoked
    pub async fn is_revoked(&self, token: &str) -> Result<bool> {
        self.redis_pool.exists(&Self::key(token)).await
    }

    /// Revoke a token for `ttl_seconds`
    pub async fn revoke(&self, token: &str, ttl_seconds: u64) -> Result<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        self.redis_pool
            .set(&Self::key(token), "1", Some(ttl_seconds))
            .await?;
        info!("Revoked session token for {} seconds", ttl_seconds);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serial_test::serial;

    pub(crate) const TEST_SECRET: &str = "test-secret-test-secret-test-secret";

    pub(crate) fn test_service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: TEST_SECRET.to_string(),
            access_token_expiry: 1800,
        })
    }

    /// Token for `email` issued `age_secs` ago with the standard lifetime
    pub(crate) fn token_issued_ago(email: &str, age_secs: u64) -> String {
        let now = now_secs().unwrap();
        let claims = Claims {
            sub: email.to_string(),
            iat: now - age_secs,
            exp: now - age_secs + 1800,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_generate_and_validate_token() {
        let service = test_service();
        let token = service.generate_token("maya@example.com").unwrap();

        let claims = service.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "maya@example.com");
        assert_eq!(claims.exp - claims.iat, 1800);
        assert!(service.remaining_lifetime(&claims).unwrap() > 1790);
    }

    #[test]
    fn test_token_older_than_lifetime_is_rejected() {
        let service = test_service();

        let fresh = token_issued_ago("maya@example.com", 29 * 60);
        assert!(service.validate_token(&fresh).is_ok());

        let stale = token_issued_ago("maya@example.com", 31 * 60);
        assert!(service.validate_token(&stale).is_err());
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let other = JwtService::new(JwtConfig {
            secret: "another-secret-another-secret-another".to_string(),
            access_token_expiry: 1800,
        });
        let token = other.generate_token("maya@example.com").unwrap();

        assert!(test_service().validate_token(&token).is_err());
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(test_service().validate_token("not.a.jwt").is_err());
    }

    #[test]
    #[serial]
    fn test_jwt_config_from_env() {
        unsafe {
            std::env::set_var("JWT_SECRET", TEST_SECRET);
            std::env::remove_var("JWT_ACCESS_TOKEN_EXPIRY");
        }

        let config = JwtConfig::from_env().unwrap();
        assert_eq!(config.secret, TEST_SECRET);
        assert_eq!(config.access_token_expiry, 1800);

        unsafe {
            std::env::set_var("JWT_SECRET", "short");
        }
        assert!(JwtConfig::from_env().is_err());

        unsafe {
            std::env::remove_var("JWT_SECRET");
        }
        assert!(JwtConfig::from_env().is_err());
    }
}
