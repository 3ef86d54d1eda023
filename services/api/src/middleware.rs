//! Authentication middleware for the session cookie

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::CookieBuilder;
use tracing::{debug, error};

use crate::{config::ServerConfig, error::ApiError, state::AppState};

/// Name of the cookie carrying the session token
pub const AUTH_COOKIE: &str = "auth";

/// Authenticated user information
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub email: String,
}

fn base_cookie(config: &ServerConfig, value: String) -> CookieBuilder<'static> {
    let same_site = if config.cookie_secure {
        SameSite::None
    } else {
        SameSite::Lax
    };

    Cookie::build((AUTH_COOKIE, value))
        .http_only(true)
        .path("/")
        .secure(config.cookie_secure)
        .same_site(same_site)
}

/// Session cookie holding `token` for `max_age_secs`
pub fn auth_cookie(config: &ServerConfig, token: String, max_age_secs: u64) -> Cookie<'static> {
    base_cookie(config, token)
        .max_age(time::Duration::seconds(max_age_secs as i64))
        .build()
}

/// Cookie matching the session cookie, for removal from a jar
///
/// Browsers only accept the removal when its `Secure` and `SameSite`
/// attributes match the cookie being replaced.
pub fn expired_auth_cookie(config: &ServerConfig) -> Cookie<'static> {
    base_cookie(config, String::new()).build()
}

/// Authentication middleware
///
/// Rejects the request with 401 unless the `auth` cookie holds a valid,
/// unexpired and unrevoked token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let jar = CookieJar::from_headers(req.headers());
    let token = jar
        .get(AUTH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.jwt_service.validate_token(&token).map_err(|e| {
        debug!("Rejected session token: {}", e);
        ApiError::Unauthorized
    })?;

    if let Some(denylist) = &state.token_denylist {
        let revoked = denylist.is_revoked(&token).await.map_err(|e| {
            error!("Failed to check token denylist: {}", e);
            ApiError::InternalServerError
        })?;
        if revoked {
            return Err(ApiError::Unauthorized);
        }
    }

    req.extensions_mut().insert(AuthUser { email: claims.sub });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, HeaderValue, header},
        response::IntoResponse,
    };

    fn config(cookie_secure: bool) -> ServerConfig {
        ServerConfig {
            cookie_secure,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_secure_cookie_attributes() {
        let cookie = auth_cookie(&config(true), "token".to_string(), 1800).to_string();

        assert!(cookie.starts_with("auth=token"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=1800"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=None"));
    }

    #[test]
    fn test_local_cookie_is_lax() {
        let cookie = auth_cookie(&config(false), "token".to_string(), 1800).to_string();

        assert!(!cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Lax"));
    }

    #[test]
    fn test_removal_cookie_matches_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("auth=token"));
        let jar = CookieJar::from_headers(&headers).remove(expired_auth_cookie(&config(true)));

        let response = (jar, ()).into_response();
        let removal = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(removal.starts_with("auth="));
        assert!(removal.contains("Max-Age=0"));
        assert!(removal.contains("Secure"));
        assert!(removal.contains("SameSite=None"));
        assert!(removal.contains("Path=/"));
    }
}
