// PostgreSQL repository for the auth backend

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use super::models::*;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // ============================================
    // Users
    // ============================================

    pub async fn create_user(&self, input: CreateUserRow) -> Result<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email, name, password_hash, picture, services, google_sub)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, email, name, password_hash, picture, services, google_sub, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.email)
        .bind(&input.name)
        .bind(&input.password_hash)
        .bind(&input.picture)
        .bind(&input.services)
        .bind(&input.google_sub)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DuplicateEmail(input.email.clone()).into()
            }
            other => anyhow::Error::from(other),
        })?;

        Ok(row)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, password_hash, picture, services, google_sub, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn link_google_account(&self, id: Uuid, google_sub: &str) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET google_sub = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, name, password_hash, picture, services, google_sub, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(google_sub)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    // ============================================
    // Refresh token ledger
    // ============================================

    pub async fn create_refresh_token(
        &self,
        input: CreateRefreshTokenRow,
    ) -> Result<RefreshTokenRow> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            INSERT INTO refresh_tokens (jti, subject, expires_at)
            VALUES ($1, $2, $3)
            RETURNING jti, subject, expires_at, created_at
            "#,
        )
        .bind(&input.jti)
        .bind(&input.subject)
        .bind(input.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Atomically delete an unexpired token; true if this call consumed it
    pub async fn consume_refresh_token(&self, jti: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE jti = $1 AND expires_at >= NOW()
            "#,
        )
        .bind(jti)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_refresh_token(&self, jti: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE jti = $1")
            .bind(jti)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_expired_refresh_tokens(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // ============================================
    // Profile picture cache
    // ============================================

    pub async fn get_cached_image(&self, image_url: &str) -> Result<Option<ImageCacheRow>> {
        let row = sqlx::query_as::<_, ImageCacheRow>(
            r#"
            SELECT image_url, data, content_type, last_fetched
            FROM image_cache
            WHERE image_url = $1
            "#,
        )
        .bind(image_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn upsert_cached_image(&self, input: UpsertImageCacheRow) -> Result<ImageCacheRow> {
        let row = sqlx::query_as::<_, ImageCacheRow>(
            r#"
            INSERT INTO image_cache (image_url, data, content_type, last_fetched)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (image_url) DO UPDATE
            SET data = EXCLUDED.data,
                content_type = EXCLUDED.content_type,
                last_fetched = EXCLUDED.last_fetched
            RETURNING image_url, data, content_type, last_fetched
            "#,
        )
        .bind(&input.image_url)
        .bind(&input.data)
        .bind(&input.content_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }
}
