// Retry/refresh interceptor
// Decision: A 401 triggers at most one refresh and one retry per logical request
// Decision: Concurrent 401s share a single refresh, keyed by a session generation counter
// Decision: A failed refresh is shared only with requests queued behind that attempt; later 401s try again

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::{header, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::ClientError, token_store::RefreshTokenStore};

/// Name of the access token cookie set by the auth backend
pub const ACCESS_COOKIE: &str = "token";

/// States a logical request moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Initial,
    FailedOnce,
    Refreshing,
    Retry,
    /// The exchange is complete; the response is final whatever its status
    Success,
    /// Refresh failed; the original 401 is returned
    TerminalFailure,
}

/// A replayable request relative to the gateway base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path and query, e.g. `/budget/user?month=3`
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Final response plus the states visited to produce it
#[derive(Debug)]
pub struct Exchange {
    pub response: reqwest::Response,
    pub trail: Vec<RequestState>,
}

/// Body of every token-issuing auth endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub message: String,
    pub refresh_token: String,
}

/// Where the gateway and the auth backend behind it live
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Gateway prefix of the auth backend
    pub auth_path: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, auth_path: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let auth_path = format!("/{}", auth_path.into().trim_matches('/'));
        Self {
            base_url,
            auth_path,
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    access_token: Option<String>,
    /// Bumped on every token change
    generation: u64,
    /// Refresh attempts that have finished, successful or not
    refreshes_finished: u64,
}

pub struct Interceptor {
    config: ClientConfig,
    http: reqwest::Client,
    store: Arc<dyn RefreshTokenStore>,
    session: Mutex<Session>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl Interceptor {
    pub fn new(config: ClientConfig, store: Arc<dyn RefreshTokenStore>) -> Result<Self, ClientError> {
        // Cookies are managed by hand: only the access token is ever sent
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            config,
            http,
            store,
            session: Mutex::new(Session::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RefreshTokenStore> {
        &self.store
    }

    pub fn access_token(&self) -> Option<String> {
        self.session.lock().access_token.clone()
    }

    /// Replace the access token, starting a new session generation
    pub fn set_access_token(&self, token: Option<String>) {
        let mut session = self.session.lock();
        session.access_token = token;
        session.generation += 1;
    }

    /// Absolute URL for a gateway path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Absolute URL for an auth backend endpoint
    pub fn auth_url(&self, endpoint: &str) -> String {
        format!(
            "{}{}/{}",
            self.config.base_url,
            self.config.auth_path.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Send a request, refreshing the session once if it is rejected with 401
    pub async fn execute(&self, request: &ApiRequest) -> Result<Exchange, ClientError> {
        let mut trail = vec![RequestState::Initial];

        let (token, generation) = {
            let session = self.session.lock();
            (session.access_token.clone(), session.generation)
        };

        let response = self.send(request, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            trail.push(RequestState::Success);
            return Ok(Exchange { response, trail });
        }

        trail.push(RequestState::FailedOnce);
        trail.push(RequestState::Refreshing);

        let finished = self.session.lock().refreshes_finished;
        if let Err(e) = self.refresh_after(generation, finished).await {
            tracing::debug!(error = %e, path = %request.path, "Session refresh failed");
            trail.push(RequestState::TerminalFailure);
            return Ok(Exchange { response, trail });
        }

        trail.push(RequestState::Retry);
        let token = self.access_token();
        let response = self.send(request, token.as_deref()).await?;
        trail.push(RequestState::Success);
        Ok(Exchange { response, trail })
    }

    async fn send(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path));
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("{ACCESS_COOKIE}={token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    /// Make sure the session is newer than `observed`.
    ///
    /// `finished` is the count of completed refresh attempts when the 401 came
    /// back. If another attempt completed while we waited on the lock and the
    /// generation did not move, that attempt failed and its failure is ours too.
    async fn refresh_after(&self, observed: u64, finished: u64) -> Result<(), ClientError> {
        let _guard = self.refresh_lock.lock().await;

        {
            let session = self.session.lock();
            if session.generation != observed {
                // Someone else refreshed (or signed in) while we waited
                return Ok(());
            }
            if session.refreshes_finished != finished {
                return Err(ClientError::RefreshFailed);
            }
        }

        let result = self.refresh_tokens().await;
        let mut session = self.session.lock();
        session.refreshes_finished += 1;
        let access = result?;
        session.access_token = Some(access);
        session.generation += 1;
        tracing::debug!(generation = session.generation, "Session refreshed");
        Ok(())
    }

    async fn refresh_tokens(&self) -> Result<String, ClientError> {
        let refresh_token = self.store.load()?.ok_or(ClientError::NotLoggedIn)?;
        let response = self
            .http_post(
                &self.auth_url("refresh"),
                &serde_json::json!({ "refreshToken": refresh_token }),
            )
            .await?;

        let (access, _) = self.accept_auth_response(response).await?;
        Ok(access)
    }

    /// Plain JSON POST without a cookie or retry handling
    pub async fn http_post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, ClientError> {
        Ok(self.http.post(url).json(body).send().await?)
    }

    /// Take the access cookie and refresh token out of a sign-in or refresh response.
    /// The refresh token is saved to the store; the access token is returned.
    pub async fn accept_auth_response(
        &self,
        response: reqwest::Response,
    ) -> Result<(String, AuthResponse), ClientError> {
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }

        let access = access_cookie(response.headers())
            .ok_or_else(|| ClientError::InvalidAuthResponse("missing token cookie".to_string()))?;
        let body: AuthResponse = response.json().await?;
        self.store.save(&body.refresh_token)?;
        Ok((access, body))
    }
}

/// Value of the `token` cookie in a response's Set-Cookie headers, if non-empty
pub fn access_cookie(headers: &header::HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| cookie::Cookie::parse(raw.to_string()).ok())
        .find(|c| c.name() == ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
