// Storage backend abstraction
// Decision: Use enum dispatch for simplicity over trait objects
//
// A unified StorageBackend enum that works with either PostgreSQL
// (production) or in-memory (dev mode / DB degrade) storage.

use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

use super::memory::InMemoryDatabase;
use super::models::*;
use super::repositories::Database;

/// Storage backend that can be either PostgreSQL or in-memory
#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL database (production)
    Postgres(Database),
    /// In-memory database (dev mode)
    InMemory(Arc<InMemoryDatabase>),
}

impl StorageBackend {
    /// Connect to PostgreSQL and apply migrations
    pub async fn postgres(database_url: &str) -> Result<Self> {
        let db = Database::from_url(database_url).await?;
        db.migrate().await?;
        Ok(Self::Postgres(db))
    }

    /// Create an in-memory storage backend
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryDatabase::new()))
    }

    /// Check if this is dev mode (in-memory)
    pub fn is_dev_mode(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }

    // ============================================
    // Users
    // ============================================

    pub async fn create_user(&self, input: CreateUserRow) -> Result<UserRow> {
        match self {
            Self::Postgres(db) => db.create_user(input).await,
            Self::InMemory(db) => db.create_user(input).await,
        }
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        match self {
            Self::Postgres(db) => db.get_user_by_email(email).await,
            Self::InMemory(db) => db.get_user_by_email(email).await,
        }
    }

    pub async fn link_google_account(&self, id: Uuid, google_sub: &str) -> Result<Option<UserRow>> {
        match self {
            Self::Postgres(db) => db.link_google_account(id, google_sub).await,
            Self::InMemory(db) => db.link_google_account(id, google_sub).await,
        }
    }

    // ============================================
    // Refresh token ledger
    // ============================================

    pub async fn create_refresh_token(
        &self,
        input: CreateRefreshTokenRow,
    ) -> Result<RefreshTokenRow> {
        match self {
            Self::Postgres(db) => db.create_refresh_token(input).await,
            Self::InMemory(db) => db.create_refresh_token(input).await,
        }
    }

    pub async fn consume_refresh_token(&self, jti: &str) -> Result<bool> {
        match self {
            Self::Postgres(db) => db.consume_refresh_token(jti).await,
            Self::InMemory(db) => db.consume_refresh_token(jti).await,
        }
    }

    pub async fn delete_refresh_token(&self, jti: &str) -> Result<bool> {
        match self {
            Self::Postgres(db) => db.delete_refresh_token(jti).await,
            Self::InMemory(db) => db.delete_refresh_token(jti).await,
        }
    }

    pub async fn delete_expired_refresh_tokens(&self) -> Result<u64> {
        match self {
            Self::Postgres(db) => db.delete_expired_refresh_tokens().await,
            Self::InMemory(db) => db.delete_expired_refresh_tokens().await,
        }
    }

    // ============================================
    // Profile picture cache
    // ============================================

    pub async fn get_cached_image(&self, image_url: &str) -> Result<Option<ImageCacheRow>> {
        match self {
            Self::Postgres(db) => db.get_cached_image(image_url).await,
            Self::InMemory(db) => db.get_cached_image(image_url).await,
        }
    }

    pub async fn upsert_cached_image(&self, input: UpsertImageCacheRow) -> Result<ImageCacheRow> {
        match self {
            Self::Postgres(db) => db.upsert_cached_image(input).await,
            Self::InMemory(db) => db.upsert_cached_image(input).await,
        }
    }
}
