// High-level client for the Otter gateway
// Sign-in calls go straight to the auth backend; everything else goes through the interceptor.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::{
    error::ClientError,
    interceptor::{ApiRequest, ClientConfig, Exchange, Interceptor},
    token_store::RefreshTokenStore,
};

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

pub struct Client {
    interceptor: Interceptor,
}

impl Client {
    pub fn new(config: ClientConfig, store: Arc<dyn RefreshTokenStore>) -> Result<Self, ClientError> {
        Ok(Self {
            interceptor: Interceptor::new(config, store)?,
        })
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Sign in with email and password; returns the server message
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ClientError> {
        self.sign_in(
            "login",
            &Credentials {
                email,
                password,
                name: None,
            },
        )
        .await
    }

    pub async fn signup(&self, email: &str, password: &str, name: &str) -> Result<String, ClientError> {
        self.sign_in(
            "signup",
            &Credentials {
                email,
                password,
                name: Some(name),
            },
        )
        .await
    }

    /// Sign in with a Google ID token obtained elsewhere
    pub async fn google(&self, id_token: &str) -> Result<String, ClientError> {
        self.sign_in("google", &serde_json::json!({ "idToken": id_token }))
            .await
    }

    async fn sign_in<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<String, ClientError> {
        let response = self
            .interceptor
            .http_post(&self.interceptor.auth_url(endpoint), body)
            .await?;
        let (access, body) = self.interceptor.accept_auth_response(response).await?;
        self.interceptor.set_access_token(Some(access));
        Ok(body.message)
    }

    /// Revoke the stored refresh token and forget the session
    pub async fn logout(&self) -> Result<String, ClientError> {
        let body = match self.interceptor.store().load()? {
            Some(token) => serde_json::json!({ "refreshToken": token }),
            None => serde_json::json!({}),
        };
        let response = self
            .interceptor
            .http_post(&self.interceptor.auth_url("logout"), &body)
            .await?;

        self.interceptor.store().clear()?;
        self.interceptor.set_access_token(None);

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        let body: Value = response.json().await?;
        Ok(body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// Current user as seen by the auth backend
    pub async fn whoami(&self) -> Result<Value, ClientError> {
        let path = format!("{}/user", self.interceptor.config().auth_path);
        self.json(&ApiRequest::get(path)).await
    }

    /// Send any request through the interceptor
    pub async fn request(&self, request: &ApiRequest) -> Result<Exchange, ClientError> {
        self.interceptor.execute(request).await
    }

    /// Send a request and decode a successful JSON response
    pub async fn json(&self, request: &ApiRequest) -> Result<Value, ClientError> {
        let exchange = self.request(request).await?;
        if !exchange.response.status().is_success() {
            return Err(ClientError::from_response(exchange.response).await);
        }
        Ok(exchange.response.json().await?)
    }
}
