// Client error type

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not logged in")]
    NotLoggedIn,

    /// A concurrent refresh this request was waiting on did not succeed
    #[error("Session refresh failed")]
    RefreshFailed,

    /// A sign-in or refresh answer without the expected cookie or body
    #[error("Unexpected auth response: {0}")]
    InvalidAuthResponse(String),

    #[error("Token store error: {0}")]
    Store(#[from] std::io::Error),
}

impl ClientError {
    /// Build an API error from a non-success response, preferring the `{"error": ...}` body
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(text);
        ClientError::Api { status, message }
    }
}
