// Auth backend configuration loaded from environment variables.
// Decision: Secrets are required; access and refresh secrets must differ
// Decision: DATABASE_URL unset means in-memory storage (dev mode)
// Decision: A failing database aborts startup unless AUTH_DB_STARTUP=degrade

use std::{str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};
use otter_core::TokenConfig;

/// Default Google tokeninfo endpoint for ID token verification
pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// What to do when the database cannot be reached at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbStartupPolicy {
    /// Exit with an error
    #[default]
    Fail,
    /// Log and continue with in-memory storage
    Degrade,
}

impl FromStr for DbStartupPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(DbStartupPolicy::Fail),
            "degrade" => Ok(DbStartupPolicy::Degrade),
            other => bail!("expected \"fail\" or \"degrade\", got {other:?}"),
        }
    }
}

/// Google sign-in configuration
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Expected `aud` of incoming ID tokens
    pub client_id: String,
    pub tokeninfo_url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub port: u16,
    pub tokens: TokenConfig,
    /// Single-use refresh tokens
    pub refresh_rotation: bool,
    /// Entitlements granted to new accounts
    pub default_services: Vec<String>,
    pub database_url: Option<String>,
    pub db_startup: DbStartupPolicy,
    pub google: Option<GoogleConfig>,
    pub profile_picture_ttl: Duration,
    pub cors_origins: Vec<String>,
}

impl AuthConfig {
    /// Config for tests and local runs with in-memory storage
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            port: 3000,
            tokens: TokenConfig {
                access_secret: access_secret.into(),
                refresh_secret: Some(refresh_secret.into()),
                ..Default::default()
            },
            refresh_rotation: true,
            default_services: default_services(),
            database_url: None,
            db_startup: DbStartupPolicy::Fail,
            google: None,
            profile_picture_ttl: Duration::from_secs(60 * 60),
            cors_origins: Vec::new(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through a variable lookup (extracted for testing)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.is_empty());
        let secs = |key: &str, default: u64| -> Result<Duration> {
            match var(key) {
                Some(value) => value
                    .parse()
                    .map(Duration::from_secs)
                    .with_context(|| format!("Invalid {key}: {value}")),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let port = match var("AUTH_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("Invalid AUTH_PORT: {port}"))?,
            None => 3000,
        };

        let tokens = TokenConfig {
            access_secret: var("JWT_SECRET").context("JWT_SECRET environment variable required")?,
            refresh_secret: Some(
                var("JWT_REFRESH_SECRET")
                    .context("JWT_REFRESH_SECRET environment variable required")?,
            ),
            access_token_lifetime: secs("AUTH_ACCESS_TOKEN_LIFETIME", 60 * 60)?,
            refresh_token_lifetime: secs("AUTH_REFRESH_TOKEN_LIFETIME", 7 * 24 * 60 * 60)?,
        };
        tokens.validate()?;

        let refresh_rotation = var("AUTH_REFRESH_ROTATION")
            .map(|s| !matches!(s.to_lowercase().as_str(), "false" | "0" | "off" | "no"))
            .unwrap_or(true);

        let default_services = var("AUTH_DEFAULT_SERVICES")
            .map(|s| split_list(&s))
            .unwrap_or_else(default_services);

        let db_startup = match var("AUTH_DB_STARTUP") {
            Some(s) => s.parse().context("Invalid AUTH_DB_STARTUP")?,
            None => DbStartupPolicy::default(),
        };

        let google = var("OTTER_GOOGLE_CLIENT_ID").map(|client_id| GoogleConfig {
            client_id,
            tokeninfo_url: var("AUTH_GOOGLE_TOKENINFO_URL")
                .unwrap_or_else(|| GOOGLE_TOKENINFO_URL.to_string()),
        });

        Ok(Self {
            port,
            tokens,
            refresh_rotation,
            default_services,
            database_url: var("DATABASE_URL"),
            db_startup,
            google,
            profile_picture_ttl: secs("AUTH_PROFILE_PICTURE_TTL", 60 * 60)?,
            cors_origins: var("OTTER_FRONTEND_URL")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
        })
    }
}

fn default_services() -> Vec<String> {
    ["auth", "fitness", "budget"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
