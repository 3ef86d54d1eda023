//! API service routes

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    middleware::{AUTH_COOKIE, AuthUser, auth_cookie, auth_middleware, expired_auth_cookie},
    models::{
        FavouriteList, LoginRequest, ReminderRequest, SignupRequest, User,
        media::{CatalogFilter, MeditationQuery, VideoQuery},
        normalize_email,
    },
    repositories::{UserRepositoryError, verify_dummy_password, verify_password},
    spotify::{CodeRequest, RefreshRequest},
    state::AppState,
    streaming::{content_type_for, serve_range, serve_whole},
    validation::{validate_email, validate_signup},
};

/// Create the router for the API service
pub fn create_router(state: AppState, cors: CorsLayer) -> Router {
    let protected_routes = Router::new()
        .route("/api/verified", get(verified))
        .route("/api/yogavideos", get(list_videos))
        .route("/api/yogavideos/", get(list_videos))
        .route("/api/yogavideos/:id", get(get_video))
        .route("/api/favouriseVideo/:id", put(favourite_video))
        .route("/api/reminder", put(update_reminder))
        .route("/api/meditationimages", get(list_meditations))
        .route("/api/meditationimages/", get(list_meditations))
        .route("/api/favouriseMeditation/:id", put(favourite_meditation))
        .route("/refresh", post(spotify_refresh))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/signup", post(signup))
        .route("/api/login", post(login))
        .route("/api/logout", get(logout))
        .route("/api/thumbnail/:thumbnail", get(thumbnail))
        .route("/api/videostream/:filename", get(video_stream))
        .route("/api/image/:filename", get(meditation_image))
        .route("/login-spotify", post(spotify_login))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = common::database::health_check(&state.db_pool)
        .await
        .unwrap_or_else(|e| {
            warn!("Database health check failed: {}", e);
            false
        });

    Json(json!({
        "status": "ok",
        "service": "api-service",
        "database": database,
    }))
}

/// Issue a session token for `email` and attach it to the jar
fn start_session(state: &AppState, jar: CookieJar, email: &str) -> ApiResult<(CookieJar, String)> {
    let token = state
        .jwt_service
        .generate_token(email)
        .map_err(|e| ApiError::internal("Failed to generate session token", e))?;

    let cookie = auth_cookie(
        &state.config,
        token.clone(),
        state.jwt_service.access_token_expiry(),
    );
    Ok((jar.add(cookie), token))
}

async fn current_user(state: &AppState, email: &str) -> ApiResult<User> {
    state
        .user_repository
        .find_by_email(email)
        .await
        .map_err(|e| ApiError::internal("Failed to load user", e))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Register a new account and sign it in
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<SignupRequest>,
) -> ApiResult<Response> {
    let new_user = payload.normalize();
    validate_signup(&new_user).map_err(ApiError::BadRequest)?;

    let user = state
        .user_repository
        .create(&new_user)
        .await
        .map_err(|e| match e {
            UserRepositoryError::DuplicateEmail => {
                ApiError::Conflict("Email already registered".to_string())
            }
            other => ApiError::internal("Failed to create user", other),
        })?;

    let (jar, _) = start_session(&state, jar, &user.email)?;
    info!("User {} signed up", user.email);

    Ok((
        StatusCode::CREATED,
        jar,
        Json(json!({ "data": { "newUser": user } })),
    )
        .into_response())
}

/// Sign in with email and password
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Response> {
    let email = normalize_email(&payload.email);

    // No such account can exist, and the limiter only tracks plausible keys
    if validate_email(&email).is_err() {
        return Err(ApiError::InvalidCredentials);
    }

    if !state.login_limiter.is_allowed(&email).await {
        warn!(
            "Login rate limit hit for {}, locked out for up to {} seconds",
            email,
            state.login_limiter.config().ban_duration_seconds
        );
        return Err(ApiError::TooManyRequests);
    }

    let user = state
        .user_repository
        .find_by_email(&email)
        .await
        .map_err(|e| ApiError::internal("Failed to load user", e))?;

    let Some(user) = user else {
        verify_dummy_password(&payload.password)
            .map_err(|e| ApiError::internal("Failed to verify password", e))?;
        return Err(ApiError::InvalidCredentials);
    };

    let password_matches = verify_password(&user.password_hash, &payload.password)
        .map_err(|e| ApiError::internal("Failed to verify password", e))?;
    if !password_matches {
        return Err(ApiError::InvalidCredentials);
    }

    state.login_limiter.reset(&email).await;
    let (jar, token) = start_session(&state, jar, &user.email)?;
    info!("User {} logged in", user.email);

    Ok((jar, Json(json!({ "data": { "token": token }, "user": user }))).into_response())
}

/// Clear the session cookie, revoking the token when the denylist is on
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Response> {
    if let (Some(denylist), Some(cookie)) = (&state.token_denylist, jar.get(AUTH_COOKIE)) {
        let token = cookie.value();
        if let Ok(claims) = state.jwt_service.validate_token(token) {
            let ttl = state
                .jwt_service
                .remaining_lifetime(&claims)
                .map_err(|e| ApiError::internal("Failed to compute token lifetime", e))?;
            denylist
                .revoke(token, ttl)
                .await
                .map_err(|e| ApiError::internal("Failed to revoke session token", e))?;
        }
    }

    let jar = jar.remove(expired_auth_cookie(&state.config));
    Ok((jar, Json(json!({ "message": "Logged out successfully" }))).into_response())
}

/// The signed-in user's record
pub async fn verified(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<User>> {
    Ok(Json(current_user(&state, &auth.email).await?))
}

/// List videos, optionally filtered
pub async fn list_videos(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<VideoQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut filter: CatalogFilter = query.filter().map_err(ApiError::BadRequest)?;
    if query.wants_favourites() {
        let user = current_user(&state, &auth.email).await?;
        filter = filter.with_ids(user.fav_videos);
    }

    let videos = state
        .media_repository
        .list_videos(&filter)
        .await
        .map_err(|e| ApiError::internal("Failed to list videos", e))?;

    Ok(Json(videos))
}

/// One video by id
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let video = state
        .media_repository
        .find_video_by_id(id)
        .await
        .map_err(|e| ApiError::internal("Failed to load video", e))?
        .ok_or_else(|| ApiError::NotFound("Video not found".to_string()))?;

    Ok(Json(video))
}

/// Stream a video, honoring `Range`
pub async fn video_stream(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let video = state
        .media_repository
        .find_video_by_filename(&filename)
        .await
        .map_err(|e| ApiError::internal("Failed to load video", e))?
        .ok_or_else(|| ApiError::NotFound("Video not found".to_string()))?;

    let total = u64::try_from(video.filesize)
        .map_err(|e| ApiError::internal("Invalid declared video size", e))?;

    serve_range(
        state.video_bucket.as_ref(),
        &video.filename,
        total,
        headers.get(header::RANGE),
        &content_type_for(&video.filename, "video/mp4"),
    )
    .await
}

/// Thumbnail of a video
pub async fn thumbnail(
    State(state): State<AppState>,
    Path(thumbnail): Path<String>,
) -> ApiResult<Response> {
    let video = state
        .media_repository
        .find_video_by_thumbnail(&thumbnail)
        .await
        .map_err(|e| ApiError::internal("Failed to load video", e))?
        .ok_or_else(|| ApiError::NotFound("Thumbnail not found".to_string()))?;

    serve_whole(
        state.video_bucket.as_ref(),
        &video.thumbnail,
        &content_type_for(&video.thumbnail, "image/jpeg"),
    )
    .await
}

/// Toggle a video in the caller's favourites
pub async fn favourite_video(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    let exists = state
        .media_repository
        .video_exists(id)
        .await
        .map_err(|e| ApiError::internal("Failed to load video", e))?;
    if !exists {
        return Err(ApiError::NotFound("Video not found".to_string()));
    }

    toggle_favourite(&state, &auth.email, FavouriteList::Videos, id).await
}

/// Toggle a meditation in the caller's favourites
pub async fn favourite_meditation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    let exists = state
        .media_repository
        .image_exists(id)
        .await
        .map_err(|e| ApiError::internal("Failed to load meditation", e))?;
    if !exists {
        return Err(ApiError::NotFound("Meditation not found".to_string()));
    }

    toggle_favourite(&state, &auth.email, FavouriteList::Meditations, id).await
}

async fn toggle_favourite(
    state: &AppState,
    email: &str,
    list: FavouriteList,
    id: Uuid,
) -> ApiResult<Json<User>> {
    let user = state
        .user_repository
        .toggle_favourite(email, list, id)
        .await
        .map_err(|e| ApiError::internal("Failed to update favourites", e))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Replace the caller's practice reminder
pub async fn update_reminder(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<ReminderRequest>,
) -> ApiResult<Json<User>> {
    let reminder = payload.normalize().map_err(ApiError::BadRequest)?;

    let user = state
        .user_repository
        .set_reminder(&auth.email, &reminder)
        .await
        .map_err(|e| ApiError::internal("Failed to update reminder", e))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// List meditation images, optionally filtered
pub async fn list_meditations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<MeditationQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut filter = query.filter().map_err(ApiError::BadRequest)?;
    if query.wants_favourites() {
        let user = current_user(&state, &auth.email).await?;
        filter = filter.with_ids(user.fav_meditations);
    }

    let images = state
        .media_repository
        .list_images(&filter)
        .await
        .map_err(|e| ApiError::internal("Failed to list meditations", e))?;

    Ok(Json(images))
}

/// Meditation image by filename
pub async fn meditation_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let image = state
        .media_repository
        .find_image_by_filename(&filename)
        .await
        .map_err(|e| ApiError::internal("Failed to load meditation", e))?
        .ok_or_else(|| ApiError::NotFound("Image not found".to_string()))?;

    serve_whole(
        state.image_bucket.as_ref(),
        &image.filename,
        &content_type_for(&image.filename, "image/jpeg"),
    )
    .await
}

fn spotify_client(state: &AppState) -> ApiResult<&crate::spotify::SpotifyClient> {
    state.spotify.as_ref().ok_or_else(|| {
        error!("Spotify request received but no client credentials are configured");
        ApiError::ServiceUnavailable("Music service is not configured".to_string())
    })
}

/// Exchange a Spotify authorization code
pub async fn spotify_login(
    State(state): State<AppState>,
    Json(payload): Json<CodeRequest>,
) -> ApiResult<impl IntoResponse> {
    let tokens = spotify_client(&state)?.exchange_code(payload.code).await?;
    Ok(Json(tokens))
}

/// Refresh a Spotify access token
pub async fn spotify_refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let tokens = spotify_client(&state)?
        .refresh(payload.refresh_token)
        .await?;
    Ok(Json(tokens))
}
