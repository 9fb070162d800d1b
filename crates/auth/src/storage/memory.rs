// In-memory storage implementation for dev mode
// Decision: Use parking_lot for thread-safe access
// Decision: UUIDs generated via uuid v7 (time-ordered)
//
// Same API as the PostgreSQL repository so the auth backend can run without
// a database. All data is lost on restart.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::*;

/// In-memory database for dev mode
#[derive(Default)]
pub struct InMemoryDatabase {
    users: RwLock<HashMap<Uuid, UserRow>>,
    refresh_tokens: RwLock<HashMap<String, RefreshTokenRow>>,
    images: RwLock<HashMap<String, ImageCacheRow>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    // ============================================
    // Users
    // ============================================

    pub async fn create_user(&self, input: CreateUserRow) -> Result<UserRow> {
        let mut users = self.users.write();
        if users.values().any(|u| u.email == input.email) {
            return Err(DuplicateEmail(input.email).into());
        }

        let now = Self::now();
        let row = UserRow {
            id: Uuid::now_v7(),
            email: input.email,
            name: input.name,
            password_hash: input.password_hash,
            picture: input.picture,
            services: input.services,
            google_sub: input.google_sub,
            created_at: now,
            updated_at: now,
        };
        users.insert(row.id, row.clone());
        Ok(row)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }


    pub async fn link_google_account(&self, id: Uuid, google_sub: &str) -> Result<Option<UserRow>> {
        let mut users = self.users.write();
        Ok(users.get_mut(&id).map(|user| {
            user.google_sub = Some(google_sub.to_string());
            user.updated_at = Self::now();
            user.clone()
        }))
    }

    // ============================================
    // Refresh token ledger
    // ============================================

    pub async fn create_refresh_token(
        &self,
        input: CreateRefreshTokenRow,
    ) -> Result<RefreshTokenRow> {
        let row = RefreshTokenRow {
            jti: input.jti,
            subject: input.subject,
            expires_at: input.expires_at,
            created_at: Self::now(),
        };
        self.refresh_tokens
            .write()
            .insert(row.jti.clone(), row.clone());
        Ok(row)
    }

    /// Remove an outstanding, unexpired token. Returns false if it was
    /// unknown, already consumed, or expired.
    pub async fn consume_refresh_token(&self, jti: &str) -> Result<bool> {
        let removed = self.refresh_tokens.write().remove(jti);
        Ok(removed.is_some_and(|row| row.expires_at >= Self::now()))
    }

    pub async fn delete_refresh_token(&self, jti: &str) -> Result<bool> {
        Ok(self.refresh_tokens.write().remove(jti).is_some())
    }

    pub async fn delete_expired_refresh_tokens(&self) -> Result<u64> {
        let now = Self::now();
        let mut tokens = self.refresh_tokens.write();
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at >= now);
        Ok((before - tokens.len()) as u64)
    }

    // ============================================
    // Profile picture cache
    // ============================================

    pub async fn get_cached_image(&self, image_url: &str) -> Result<Option<ImageCacheRow>> {
        Ok(self.images.read().get(image_url).cloned())
    }

    /// Last writer wins
    pub async fn upsert_cached_image(&self, input: UpsertImageCacheRow) -> Result<ImageCacheRow> {
        let row = ImageCacheRow {
            image_url: input.image_url,
            data: input.data,
            content_type: input.content_type,
            last_fetched: Self::now(),
        };
        self.images
            .write()
            .insert(row.image_url.clone(), row.clone());
        Ok(row)
    }
}
