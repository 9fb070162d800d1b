// JWT token service for the access/refresh token pair
// Decision: Use HS256 algorithm for simplicity (symmetric key)
// Decision: Access and refresh tokens are signed with distinct secrets
// Decision: Expiry is checked here with zero leeway; a token is valid while now <= exp

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::principal::Principal;

const ACCESS: &str = "access";
const REFRESH: &str = "refresh";

/// Generate a random identifier string (32 hex characters)
fn generate_random_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    hex::encode(bytes)
}

/// Token errors
#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad signature, malformed token or missing claims
    #[error("Invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token type, expected {expected}")]
    WrongType { expected: &'static str },

    #[error("Refresh secret not configured")]
    RefreshDisabled,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Token configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Secret key for signing access tokens
    pub access_secret: String,
    /// Secret key for signing refresh tokens (None on verify-only nodes like the gateway)
    pub refresh_secret: Option<String>,
    /// Access token lifetime
    pub access_token_lifetime: Duration,
    /// Refresh token lifetime
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_secret: String::new(),
            refresh_secret: None,
            access_token_lifetime: Duration::from_secs(60 * 60), // 1 hour
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
        }
    }
}

impl TokenConfig {
    /// Configuration for a node that only verifies access tokens
    pub fn access_only(access_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            ..Default::default()
        }
    }

    /// Reject empty secrets and a refresh secret equal to the access secret
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.access_secret.is_empty() {
            anyhow::bail!("access token secret must not be empty");
        }
        if let Some(refresh) = &self.refresh_secret {
            if refresh.is_empty() {
                anyhow::bail!("refresh token secret must not be empty");
            }
            if refresh == &self.access_secret {
                anyhow::bail!("access and refresh token secrets must differ");
            }
        }
        Ok(())
    }
}

/// Wire claims shared by both token kinds
#[derive(Debug, Serialize, Deserialize, Clone)]
struct Claims {
    #[serde(flatten)]
    principal: Principal,
    /// Token type ("access" or "refresh")
    token_type: String,
    /// Expiration time (Unix timestamp)
    exp: i64,
    /// Issued at (Unix timestamp)
    iat: i64,
    /// Unique token ID
    jti: String,
}

/// Decoded refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    pub principal: Principal,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Token pair returned after successful authentication
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token ID (for the rotation ledger)
    pub refresh_jti: String,
    /// Refresh token expiration (Unix timestamp)
    pub refresh_expires_at: i64,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Stateless token service: signs, verifies and refreshes token pairs
pub struct TokenService {
    config: TokenConfig,
    access_keys: KeyPair,
    refresh_keys: Option<KeyPair>,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        let access_keys = KeyPair::from_secret(&config.access_secret);
        let refresh_keys = config.refresh_secret.as_deref().map(KeyPair::from_secret);

        Self {
            config,
            access_keys,
            refresh_keys,
        }
    }

    /// Issue a fresh access/refresh pair for a principal
    pub fn issue(&self, principal: &Principal) -> Result<TokenPair, TokenError> {
        self.issue_at(principal, Utc::now().timestamp())
    }

    /// Issue a pair as if the current time were `now`
    pub fn issue_at(&self, principal: &Principal, now: i64) -> Result<TokenPair, TokenError> {
        let refresh_keys = self.refresh_keys.as_ref().ok_or(TokenError::RefreshDisabled)?;

        let access_exp = now + self.access_token_lifetime_secs();
        let access = Claims {
            principal: principal.clone(),
            token_type: ACCESS.to_string(),
            exp: access_exp,
            iat: now,
            jti: generate_random_id(),
        };

        let refresh_exp = now + self.refresh_token_lifetime_secs();
        let refresh_jti = generate_random_id();
        let refresh = Claims {
            principal: principal.clone(),
            token_type: REFRESH.to_string(),
            exp: refresh_exp,
            iat: now,
            jti: refresh_jti.clone(),
        };

        let access_token = sign(&access, &self.access_keys.encoding)?;
        let refresh_token = sign(&refresh, &refresh_keys.encoding)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_token_lifetime_secs(),
            refresh_jti,
            refresh_expires_at: refresh_exp,
        })
    }

    /// Validate an access token and return its principal
    pub fn verify_access(&self, token: &str) -> Result<Principal, TokenError> {
        self.verify_access_at(token, Utc::now().timestamp())
    }

    pub fn verify_access_at(&self, token: &str, now: i64) -> Result<Principal, TokenError> {
        let claims = verify(token, &self.access_keys.decoding, ACCESS, now)?;
        Ok(claims.principal)
    }

    /// Validate a refresh token
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify_refresh_at(token, Utc::now().timestamp())
    }

    pub fn verify_refresh_at(&self, token: &str, now: i64) -> Result<RefreshClaims, TokenError> {
        let keys = self.refresh_keys.as_ref().ok_or(TokenError::RefreshDisabled)?;
        let claims = verify(token, &keys.decoding, REFRESH, now)?;
        Ok(RefreshClaims {
            principal: claims.principal,
            jti: claims.jti,
            iat: claims.iat,
            exp: claims.exp,
        })
    }

    /// Verify a refresh token and re-issue both tokens from its embedded claims.
    /// Returns the consumed refresh claims alongside the new pair.
    pub fn refresh(&self, refresh_token: &str) -> Result<(RefreshClaims, TokenPair), TokenError> {
        self.refresh_at(refresh_token, Utc::now().timestamp())
    }

    pub fn refresh_at(
        &self,
        refresh_token: &str,
        now: i64,
    ) -> Result<(RefreshClaims, TokenPair), TokenError> {
        let claims = self.verify_refresh_at(refresh_token, now)?;
        let pair = self.issue_at(&claims.principal, now)?;
        Ok((claims, pair))
    }

    /// Get access token lifetime in seconds
    pub fn access_token_lifetime_secs(&self) -> i64 {
        self.config.access_token_lifetime.as_secs() as i64
    }

    /// Get refresh token lifetime in seconds
    pub fn refresh_token_lifetime_secs(&self) -> i64 {
        self.config.refresh_token_lifetime.as_secs() as i64
    }
}

fn sign(claims: &Claims, key: &EncodingKey) -> Result<String, TokenError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| TokenError::Signing(e.to_string()))
}

fn verify(
    token: &str,
    key: &DecodingKey,
    expected: &'static str,
    now: i64,
) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is enforced below against the caller's clock
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);

    let claims = decode::<Claims>(token, key, &validation)?.claims;

    if claims.token_type != expected {
        return Err(TokenError::WrongType { expected });
    }
    if now > claims.exp {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}
