// Auth backend tests, driven in-process with tower::ServiceExt::oneshot
// Storage is in-memory; Google tokeninfo and remote images are wiremock servers.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use http_body_util::BodyExt;
use otter_auth::{
    build_app,
    config::GoogleConfig,
    storage::StorageBackend,
    AuthConfig, AuthState,
};
use otter_core::{Principal, TokenService, USER_HEADER};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> AuthConfig {
    AuthConfig::new("auth-test-access", "auth-test-refresh")
}

fn app_with(config: AuthConfig) -> Router {
    build_app(AuthState::new(config, StorageBackend::in_memory()).unwrap())
}

fn app() -> Router {
    app_with(config())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_as(uri: &str, principal: Option<&Principal>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(p) = principal {
        builder = builder.header(USER_HEADER, p.to_header_value().unwrap());
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn token_cookie(response: &Response) -> Cookie<'static> {
    let raw = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Set-Cookie header")
        .to_str()
        .unwrap()
        .to_string();
    Cookie::parse(raw).unwrap()
}

fn principal() -> Principal {
    Principal {
        sub: "user-7".to_string(),
        email: "otter@example.com".to_string(),
        name: "Otter".to_string(),
        picture: None,
        services: vec!["auth".to_string()],
    }
}

async fn signup(app: &Router, email: &str, password: &str) -> Response {
    send(
        app,
        post_json(
            "/signup",
            json!({"email": email, "password": password, "name": "Otter Smith"}),
        ),
    )
    .await
}

#[tokio::test]
async fn test_signup_sets_cookie_and_returns_refresh_token() {
    let app = app();
    let response = signup(&app, "  Otter@Example.com ", "hunter22").await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = token_cookie(&response);
    assert_eq!(cookie.name(), "token");
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Strict));
    assert_eq!(cookie.max_age(), Some(time::Duration::seconds(3600)));

    let body = body_json(response).await;
    assert_eq!(body["message"], "Logged in successfully");
    assert!(!body["refreshToken"].as_str().unwrap().is_empty());

    let tokens = TokenService::new(config().tokens);
    let claims = tokens.verify_access(cookie.value()).unwrap();
    assert_eq!(claims.email, "otter@example.com");
    assert_eq!(claims.name, "Otter Smith");
    assert_eq!(claims.services, vec!["auth", "fitness", "budget"]);
    assert_eq!(
        claims.picture.as_deref(),
        Some("https://api.dicebear.com/9.x/pixel-art/svg?seed=Otter+Smith")
    );
}

#[tokio::test]
async fn test_signup_duplicate_email() {
    let app = app();
    assert_eq!(
        signup(&app, "otter@example.com", "pw").await.status(),
        StatusCode::OK
    );

    let response = signup(&app, "OTTER@example.com", "other").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Email already registered"})
    );
}

#[tokio::test]
async fn test_login() {
    let app = app();
    signup(&app, "otter@example.com", "hunter22").await;

    let response = send(
        &app,
        post_json(
            "/login",
            json!({"email": "otter@example.com", "password": "hunter22"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!token_cookie(&response).value().is_empty());
    let body = body_json(response).await;
    assert_eq!(body["message"], "Logged in successfully");
    assert!(body["refreshToken"].is_string());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = app();
    signup(&app, "otter@example.com", "hunter22").await;

    for (email, password) in [
        ("otter@example.com", "wrong"),
        ("nobody@example.com", "hunter22"),
    ] {
        let response = send(
            &app,
            post_json("/login", json!({"email": email, "password": password})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(
            body_json(response).await,
            json!({"error": "Invalid email or password"})
        );
    }
}

#[tokio::test]
async fn test_refresh_rotates_and_rejects_reuse() {
    let app = app();
    let body = body_json(signup(&app, "otter@example.com", "pw").await).await;
    let first = body["refreshToken"].as_str().unwrap().to_string();

    let response = send(&app, post_json("/refresh", json!({"refreshToken": first}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!token_cookie(&response).value().is_empty());
    let body = body_json(response).await;
    assert_eq!(body["message"], "Token refreshed successfully");
    let second = body["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    // The consumed token is dead
    let response = send(&app, post_json("/refresh", json!({"refreshToken": first}))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Invalid refresh token"})
    );

    // Its successor is not
    let response = send(&app, post_json("/refresh", json!({"refreshToken": second}))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_rotation_is_reusable() {
    let mut config = config();
    config.refresh_rotation = false;
    let app = app_with(config);

    let body = body_json(signup(&app, "otter@example.com", "pw").await).await;
    let token = body["refreshToken"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let response = send(&app, post_json("/refresh", json!({"refreshToken": token}))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_refresh_missing_or_invalid_token() {
    let app = app();

    let empty = Request::builder()
        .method(Method::POST)
        .uri("/refresh")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, empty).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Missing refresh token"})
    );

    let response = send(&app, post_json("/refresh", json!({}))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Missing refresh token"})
    );

    let response = send(
        &app,
        post_json("/refresh", json!({"refreshToken": "not-a-jwt"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Invalid refresh token"})
    );
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let app = app();
    let response = signup(&app, "otter@example.com", "pw").await;
    let access = token_cookie(&response).value().to_string();

    let response = send(&app, post_json("/refresh", json!({"refreshToken": access}))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_expires_cookie_and_revokes_refresh_token() {
    let app = app();
    let body = body_json(signup(&app, "otter@example.com", "pw").await).await;
    let token = body["refreshToken"].as_str().unwrap().to_string();

    let response = send(&app, post_json("/logout", json!({"refreshToken": token}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = token_cookie(&response);
    assert_eq!(cookie.name(), "token");
    assert_eq!(cookie.value(), "");
    assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    assert_eq!(
        body_json(response).await,
        json!({"message": "Logged out successfully"})
    );

    let response = send(&app, post_json("/refresh", json!({"refreshToken": token}))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_body() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/logout")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(token_cookie(&response).value(), "");
}

#[tokio::test]
async fn test_current_user_from_forwarded_identity() {
    let app = app();
    let principal = principal();

    let response = send(&app, get_as("/user", Some(&principal))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "sub": "user-7",
            "email": "otter@example.com",
            "name": "Otter",
            "services": ["auth"]
        })
    );

    let response = send(&app, get_as("/user", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_picture_validation() {
    let app = app();
    let principal = principal();

    let response = send(&app, get_as("/profile-picture", Some(&principal))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "No image URL provided"})
    );

    let response = send(
        &app,
        get_as(
            "/profile-picture?url=file%3A%2F%2F%2Fetc%2Fpasswd",
            Some(&principal),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Invalid image URL"})
    );

    let response = send(
        &app,
        get_as("/profile-picture?url=https%3A%2F%2Fexample.com%2Fa.png", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_picture_proxied_with_content_type() {
    let images = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/avatar.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3, 4], "image/png"))
        .expect(1)
        .mount(&images)
        .await;

    let app = app();
    let image_url: String =
        url::form_urlencoded::byte_serialize(format!("{}/avatar.png", images.uri()).as_bytes())
            .collect();
    let uri = format!("/profile-picture?url={image_url}");

    for _ in 0..2 {
        let response = send(&app, get_as(&uri, Some(&principal()))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], &[1, 2, 3, 4]);
    }
}

fn google_app(tokeninfo: &MockServer) -> Router {
    let mut config = config();
    config.google = Some(GoogleConfig {
        client_id: "client-123".to_string(),
        tokeninfo_url: format!("{}/tokeninfo", tokeninfo.uri()),
    });
    app_with(config)
}

async fn mount_tokeninfo(server: &MockServer, id_token: &str, email: &str, picture: Option<&str>) {
    let mut info = json!({
        "aud": "client-123",
        "sub": "google-1099",
        "email": email,
        "email_verified": "true",
        "name": "Otter G"
    });
    if let Some(picture) = picture {
        info["picture"] = json!(picture);
    }
    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .and(query_param("id_token", id_token))
        .respond_with(ResponseTemplate::new(200).set_body_json(info))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_google_sign_in_creates_account() {
    let tokeninfo = MockServer::start().await;
    mount_tokeninfo(
        &tokeninfo,
        "good",
        "Otter@Gmail.com",
        Some("https://lh3.googleusercontent.com/a/otter"),
    )
    .await;
    let app = google_app(&tokeninfo);

    let response = send(&app, post_json("/google", json!({"idToken": "good"}))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let tokens = TokenService::new(config().tokens);
    let claims = tokens.verify_access(token_cookie(&response).value()).unwrap();
    assert_eq!(claims.email, "otter@gmail.com");
    assert_eq!(claims.name, "Otter G");
    assert_eq!(
        claims.picture.as_deref(),
        Some("https://lh3.googleusercontent.com/a/otter")
    );

    // Signing in again reuses the same account
    let again = send(&app, post_json("/google", json!({"idToken": "good"}))).await;
    let again = tokens.verify_access(token_cookie(&again).value()).unwrap();
    assert_eq!(again.sub, claims.sub);
}

#[tokio::test]
async fn test_google_sign_in_links_existing_account() {
    let tokeninfo = MockServer::start().await;
    mount_tokeninfo(&tokeninfo, "good", "otter@example.com", None).await;
    let app = google_app(&tokeninfo);

    let response = signup(&app, "otter@example.com", "pw").await;
    let tokens = TokenService::new(config().tokens);
    let password_user = tokens.verify_access(token_cookie(&response).value()).unwrap();

    let response = send(&app, post_json("/google", json!({"idToken": "good"}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let google_user = tokens.verify_access(token_cookie(&response).value()).unwrap();
    assert_eq!(google_user.sub, password_user.sub);
}

#[tokio::test]
async fn test_google_sign_in_rejected_or_disabled() {
    let tokeninfo = MockServer::start().await;
    Mock::given(path("/tokeninfo"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_token"})))
        .mount(&tokeninfo)
        .await;

    let response = send(
        &google_app(&tokeninfo),
        post_json("/google", json!({"idToken": "bad"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app(), post_json("/google", json!({"idToken": "bad"}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_openapi() {
    let app = app();

    let response = send(&app, get_as("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "memory");

    let response = send(&app, get_as("/api-doc/openapi.json", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let spec = body_json(response).await;
    assert!(spec["paths"]["/refresh"].is_object());
}
