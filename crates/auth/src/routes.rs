// Auth backend HTTP routes
// Decision: The access token travels only as the `token` cookie; the refresh token only in JSON bodies
// Decision: Identity for /user and /profile-picture comes from the gateway's x-user header
// Decision: With rotation on, every issued refresh jti is recorded and /refresh consumes it

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{TimeZone, Utc};
use otter_core::{
    ApiError, ForwardedPrincipal, Principal, TokenError, TokenPair, TokenService, ACCESS_COOKIE,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    config::AuthConfig,
    google::GoogleVerifier,
    profile_picture::ProfilePictures,
    storage::{
        password::{hash_password, verify_account_password},
        CreateRefreshTokenRow, CreateUserRow, DuplicateEmail, StorageBackend,
    },
};

const DICEBEAR_URL: &str = "https://api.dicebear.com/9.x/pixel-art/svg?seed=";

/// Auth state shared across routes
#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AuthConfig>,
    pub tokens: Arc<TokenService>,
    pub db: StorageBackend,
    pub google: Option<Arc<GoogleVerifier>>,
    pub pictures: Arc<ProfilePictures>,
}

impl AuthState {
    pub fn new(config: AuthConfig, db: StorageBackend) -> anyhow::Result<Self> {
        config.tokens.validate()?;
        let tokens = Arc::new(TokenService::new(config.tokens.clone()));
        let google = config.google.as_ref().map(|g| Arc::new(GoogleVerifier::new(g)));
        let pictures = Arc::new(ProfilePictures::new(db.clone(), config.profile_picture_ttl)?);

        Ok(Self {
            config: Arc::new(config),
            tokens,
            db,
            google,
            pictures,
        })
    }
}

/// Signup request
#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Login request
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Google sign-in request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    pub id_token: String,
}

/// Refresh / logout request
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Response of every token-issuing endpoint; the access token is in the cookie
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub message: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Current user, as forwarded by the gateway
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub sub: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub services: Vec<String>,
}

impl From<Principal> for UserResponse {
    fn from(p: Principal) -> Self {
        Self {
            sub: p.sub,
            email: p.email,
            name: p.name,
            picture: p.picture,
            services: p.services,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProfilePictureQuery {
    pub url: Option<String>,
}

/// Create auth routes
pub fn routes(state: AuthState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/google", post(google_login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/user", get(current_user))
        .route("/profile-picture", get(profile_picture))
        .with_state(state)
}

/// POST /signup - Create an account and sign in
#[utoipa::path(
    post,
    path = "/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created, access cookie set", body = AuthResponse),
        (status = 400, description = "Invalid input or email already registered")
    ),
    tag = "auth"
)]
pub async fn signup(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let email = normalize_email(&req.email);
    let name = req.name.trim().to_string();
    if !email.contains('@') {
        return Err(ApiError::validation("A valid email is required"));
    }
    if name.is_empty() {
        return Err(ApiError::validation("Name is required"));
    }
    if req.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    if state.db.get_user_by_email(&email).await?.is_some() {
        return Err(ApiError::validation("Email already registered"));
    }

    let password_hash = hash_password(&req.password)?;
    let user = state
        .db
        .create_user(CreateUserRow {
            picture: Some(dicebear_picture(&name)),
            email,
            name,
            password_hash: Some(password_hash),
            services: state.config.default_services.clone(),
            google_sub: None,
        })
        .await
        .map_err(duplicate_as_validation)?;

    tracing::info!(user_id = %user.id, "User signed up");
    sign_in(&state, jar, &user.principal(), "Logged in successfully").await
}

/// POST /login - Sign in with email and password
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in, access cookie set", body = AuthResponse),
        (status = 401, description = "Invalid email or password")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let user = state.db.get_user_by_email(&normalize_email(&req.email)).await?;
    let hash = user.as_ref().and_then(|u| u.password_hash.as_deref());

    if !verify_account_password(&req.password, hash)? {
        tracing::warn!(found = user.is_some(), "Login rejected");
        return Err(ApiError::InvalidCredentials);
    }
    let Some(user) = user else {
        return Err(ApiError::InvalidCredentials);
    };

    sign_in(&state, jar, &user.principal(), "Logged in successfully").await
}

/// POST /google - Sign in with a Google ID token
#[utoipa::path(
    post,
    path = "/google",
    request_body = GoogleLoginRequest,
    responses(
        (status = 200, description = "Signed in, access cookie set", body = AuthResponse),
        (status = 401, description = "ID token rejected"),
        (status = 404, description = "Google sign-in not configured")
    ),
    tag = "auth"
)]
pub async fn google_login(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(req): Json<GoogleLoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let verifier = state
        .google
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Google sign-in is not configured"))?;

    let identity = verifier.verify(&req.id_token).await.map_err(|e| {
        tracing::warn!(error = %e, "Google ID token rejected");
        ApiError::InvalidToken
    })?;

    let email = normalize_email(&identity.email);
    let user = match state.db.get_user_by_email(&email).await? {
        Some(user) if user.google_sub.is_none() => state
            .db
            .link_google_account(user.id, &identity.sub)
            .await?
            .unwrap_or(user),
        Some(user) => user,
        None => {
            let name = identity
                .name
                .clone()
                .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
            let user = state
                .db
                .create_user(CreateUserRow {
                    picture: Some(
                        identity
                            .picture
                            .clone()
                            .unwrap_or_else(|| dicebear_picture(&identity.sub)),
                    ),
                    email,
                    name,
                    password_hash: None,
                    services: state.config.default_services.clone(),
                    google_sub: Some(identity.sub.clone()),
                })
                .await?;
            tracing::info!(user_id = %user.id, "User signed up with Google");
            user
        }
    };

    sign_in(&state, jar, &user.principal(), "Logged in successfully").await
}

/// POST /refresh - Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New pair issued, access cookie set", body = AuthResponse),
        (status = 401, description = "Missing, invalid, expired or reused refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AuthState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let token = body
        .and_then(|Json(req)| req.refresh_token)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingRefreshToken)?;

    let (claims, pair) = state.tokens.refresh(&token).map_err(|e| {
        tracing::debug!(error = %e, "Refresh token rejected");
        match e {
            TokenError::Signing(_) | TokenError::RefreshDisabled => ApiError::Internal(e.into()),
            _ => ApiError::InvalidRefreshToken,
        }
    })?;

    if state.config.refresh_rotation && !state.db.consume_refresh_token(&claims.jti).await? {
        tracing::warn!(sub = %claims.principal.sub, "Refresh token reused or revoked");
        return Err(ApiError::InvalidRefreshToken);
    }

    respond_with_pair(&state, jar, &claims.principal, pair, "Token refreshed successfully").await
}

/// POST /logout - Clear the access cookie and revoke the refresh token
#[utoipa::path(
    post,
    path = "/logout",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Signed out, access cookie expired", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AuthState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    let token = body.and_then(|Json(req)| req.refresh_token);
    if let Some(claims) = token.and_then(|t| state.tokens.verify_refresh(&t).ok()) {
        state.db.delete_refresh_token(&claims.jti).await?;
        tracing::debug!(sub = %claims.principal.sub, "Refresh token revoked");
    }

    let jar = jar.add(expired_access_cookie());
    Ok((
        jar,
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}

/// GET /user - Current user from the forwarded identity
#[utoipa::path(
    get,
    path = "/user",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "No forwarded identity")
    ),
    tag = "auth"
)]
pub async fn current_user(ForwardedPrincipal(principal): ForwardedPrincipal) -> Json<UserResponse> {
    Json(principal.into())
}

/// GET /profile-picture - Cached proxy for remote profile pictures
#[utoipa::path(
    get,
    path = "/profile-picture",
    params(
        ("url" = String, Query, description = "Remote image URL")
    ),
    responses(
        (status = 200, description = "Image bytes with the upstream content type"),
        (status = 400, description = "No image URL provided"),
        (status = 401, description = "No forwarded identity"),
        (status = 502, description = "Image could not be fetched")
    ),
    tag = "auth"
)]
pub async fn profile_picture(
    State(state): State<AuthState>,
    _user: ForwardedPrincipal,
    Query(query): Query<ProfilePictureQuery>,
) -> Result<Response, ApiError> {
    let image_url = query
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::validation("No image URL provided"))?;

    match url::Url::parse(&image_url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return Err(ApiError::validation("Invalid image URL")),
    }

    let image = state.pictures.get(&image_url).await?;
    Ok(([(header::CONTENT_TYPE, image.content_type)], image.data).into_response())
}

/// Issue a pair for a freshly authenticated principal
async fn sign_in(
    state: &AuthState,
    jar: CookieJar,
    principal: &Principal,
    message: &str,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let pair = state.tokens.issue(principal).map_err(|e| ApiError::Internal(e.into()))?;
    respond_with_pair(state, jar, principal, pair, message).await
}

/// Record the refresh jti (rotation), set the access cookie, return the refresh token
async fn respond_with_pair(
    state: &AuthState,
    jar: CookieJar,
    principal: &Principal,
    pair: TokenPair,
    message: &str,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    if state.config.refresh_rotation {
        let expires_at = Utc
            .timestamp_opt(pair.refresh_expires_at, 0)
            .single()
            .ok_or_else(|| anyhow::anyhow!("refresh expiry out of range"))?;
        state
            .db
            .create_refresh_token(CreateRefreshTokenRow {
                jti: pair.refresh_jti.clone(),
                subject: principal.sub.clone(),
                expires_at,
            })
            .await?;
    }

    let jar = jar.add(access_cookie(pair.access_token, pair.expires_in));
    Ok((
        jar,
        Json(AuthResponse {
            message: message.to_string(),
            refresh_token: pair.refresh_token,
        }),
    ))
}

fn access_cookie_base(value: String) -> Cookie<'static> {
    Cookie::build((ACCESS_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .build()
}

/// The `token` cookie, valid for the access token lifetime
pub fn access_cookie(token: String, ttl_secs: i64) -> Cookie<'static> {
    let ttl = time::Duration::seconds(ttl_secs);
    let mut cookie = access_cookie_base(token);
    cookie.set_max_age(ttl);
    cookie.set_expires(time::OffsetDateTime::now_utc() + ttl);
    cookie
}

/// Empty `token` cookie that makes the browser drop the access token
fn expired_access_cookie() -> Cookie<'static> {
    let mut cookie = access_cookie_base(String::new());
    cookie.set_max_age(time::Duration::ZERO);
    cookie.set_expires(time::OffsetDateTime::UNIX_EPOCH);
    cookie
}

/// A signup that lost the race for its email is still a validation error
fn duplicate_as_validation(e: anyhow::Error) -> ApiError {
    if e.is::<DuplicateEmail>() {
        ApiError::validation("Email already registered")
    } else {
        e.into()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Generated avatar for accounts without a picture
pub fn dicebear_picture(seed: &str) -> String {
    let seed: String = url::form_urlencoded::byte_serialize(seed.as_bytes()).collect();
    format!("{DICEBEAR_URL}{seed}")
}
