// Google sign-in: verify an ID token issued to our client
// Decision: Verify through Google's tokeninfo endpoint instead of fetching and caching JWKS
// Decision: The audience must equal the configured client id; anything else is rejected

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::config::GoogleConfig;

/// Identity asserted by a verified Google ID token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    /// Google account id
    pub sub: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// tokeninfo response; Google encodes booleans and numbers as strings
#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<Value>,
    name: Option<String>,
    picture: Option<String>,
}

fn is_true(value: &Option<Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

pub struct GoogleVerifier {
    client_id: String,
    tokeninfo_url: String,
    http: reqwest::Client,
}

impl GoogleVerifier {
    pub fn new(config: &GoogleConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            tokeninfo_url: config.tokeninfo_url.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// Verify an ID token and return the identity it asserts
    pub async fn verify(&self, id_token: &str) -> Result<GoogleIdentity> {
        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .context("Failed to reach Google tokeninfo")?;

        if !response.status().is_success() {
            bail!("Google rejected the ID token ({})", response.status());
        }

        let info: TokenInfo = response
            .json()
            .await
            .context("Failed to parse tokeninfo response")?;

        if info.aud != self.client_id {
            bail!("ID token audience mismatch: {}", info.aud);
        }

        let email = info.email.clone().context("ID token carries no email")?;
        if !is_true(&info.email_verified) {
            bail!("Google account email is not verified");
        }

        Ok(GoogleIdentity {
            sub: info.sub,
            email,
            name: info.name,
            picture: info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn verifier(server: &MockServer) -> GoogleVerifier {
        GoogleVerifier::new(&GoogleConfig {
            client_id: "client-123".to_string(),
            tokeninfo_url: format!("{}/tokeninfo", server.uri()),
        })
    }

    #[tokio::test]
    async fn test_valid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .and(query_param("id_token", "good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "aud": "client-123",
                "sub": "1099",
                "email": "otter@gmail.com",
                "email_verified": "true",
                "name": "Otter",
                "picture": "https://lh3.googleusercontent.com/a/otter"
            })))
            .mount(&server)
            .await;

        let identity = verifier(&server).verify("good").await.unwrap();
        assert_eq!(
            identity,
            GoogleIdentity {
                sub: "1099".to_string(),
                email: "otter@gmail.com".to_string(),
                name: Some("Otter".to_string()),
                picture: Some("https://lh3.googleusercontent.com/a/otter".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_wrong_audience() {
        let server = MockServer::start().await;
        Mock::given(path("/tokeninfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "aud": "someone-else",
                "sub": "1099",
                "email": "otter@gmail.com",
                "email_verified": true
            })))
            .mount(&server)
            .await;

        assert!(verifier(&server).verify("tok").await.is_err());
    }

    #[tokio::test]
    async fn test_unverified_email() {
        let server = MockServer::start().await;
        Mock::given(path("/tokeninfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "aud": "client-123",
                "sub": "1099",
                "email": "otter@gmail.com",
                "email_verified": "false"
            })))
            .mount(&server)
            .await;

        assert!(verifier(&server).verify("tok").await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(path("/tokeninfo"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_token"})),
            )
            .mount(&server)
            .await;

        assert!(verifier(&server).verify("expired").await.is_err());
    }
}
