// Database row types for the auth backend

use chrono::{DateTime, Utc};
use otter_core::Principal;
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

// ============================================
// Users
// ============================================

/// Returned by `create_user` when the email is already taken
#[derive(Debug, Error)]
#[error("user with email {0} already exists")]
pub struct DuplicateEmail(pub String);

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    /// None for accounts created through Google sign-in
    pub password_hash: Option<String>,
    pub picture: Option<String>,
    pub services: Vec<String>,
    pub google_sub: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    /// The identity carried in tokens for this user
    pub fn principal(&self) -> Principal {
        Principal {
            sub: self.id.to_string(),
            email: self.email.clone(),
            name: self.name.clone(),
            picture: self.picture.clone(),
            services: self.services.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserRow {
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub picture: Option<String>,
    pub services: Vec<String>,
    pub google_sub: Option<String>,
}

// ============================================
// Refresh token ledger
// ============================================

/// An outstanding (not yet consumed) refresh token
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRow {
    pub jti: String,
    /// Principal subject the token was issued to
    pub subject: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateRefreshTokenRow {
    pub jti: String,
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================
// Profile picture cache
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct ImageCacheRow {
    pub image_url: String,
    pub data: Vec<u8>,
    pub content_type: String,
    pub last_fetched: DateTime<Utc>,
}

impl ImageCacheRow {
    /// Whether the cached copy is younger than `ttl_secs` at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_secs: i64) -> bool {
        (now - self.last_fetched).num_seconds() < ttl_secs
    }
}

#[derive(Debug, Clone)]
pub struct UpsertImageCacheRow {
    pub image_url: String,
    pub data: Vec<u8>,
    pub content_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_principal_from_user() {
        let now = Utc::now();
        let id = Uuid::now_v7();
        let user = UserRow {
            id,
            email: "otter@example.com".to_string(),
            name: "Otter".to_string(),
            password_hash: None,
            picture: Some("https://example.com/p.png".to_string()),
            services: vec!["auth".to_string(), "budget".to_string()],
            google_sub: None,
            created_at: now,
            updated_at: now,
        };

        let principal = user.principal();
        assert_eq!(principal.sub, id.to_string());
        assert_eq!(principal.services, vec!["auth", "budget"]);
        assert_eq!(principal.picture.as_deref(), Some("https://example.com/p.png"));
    }

    #[test]
    fn test_image_freshness() {
        let now = Utc::now();
        let row = ImageCacheRow {
            image_url: "https://example.com/p.png".to_string(),
            data: vec![1, 2, 3],
            content_type: "image/png".to_string(),
            last_fetched: now - Duration::seconds(3599),
        };
        assert!(row.is_fresh(now, 3600));
        assert!(!row.is_fresh(now + Duration::seconds(1), 3600));
    }
}
