//! Repository layer for database operations
//!
//! SQLite implementation of [`PostStore`].

use super::models::*;
use super::PostStore;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for Repository {
    /// Create a new post
    async fn create_post(&self, req: CreatePostRequest) -> Result<Post> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, title, content, image, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&req.title)
        .bind(&req.content)
        .bind(&req.image)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Created post: {}", id);
        Ok(post)
    }

    /// Get a post by ID
    async fn get_post(&self, id: &str) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::PostNotFound(id.to_string()))?;

        Ok(post)
    }

    /// Update title and content, and the image key when one is given
    async fn update_post(&self, req: UpdatePostRequest) -> Result<Post> {
        let now = Utc::now();

        let post = sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
            SET title = ?, content = ?, image = COALESCE(?, image), updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&req.title)
        .bind(&req.content)
        .bind(req.image.as_deref())
        .bind(now)
        .bind(&req.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::PostNotFound(req.id.clone()))?;

        tracing::debug!("Updated post: {}", post.id);
        Ok(post)
    }

    /// Permanently delete a post
    async fn delete_post(&self, id: &str) -> Result<()> {
        let rows = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::PostNotFound(id.to_string()));
        }

        tracing::debug!("Deleted post: {}", id);
        Ok(())
    }

    /// List posts newest first; rowid breaks ties between equal timestamps
    async fn list_posts(&self, page: PageRequest) -> Result<Page<Post>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;

        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(i64::from(page.per_page()))
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(posts, page, total.max(0) as u64))
    }

    async fn list_image_keys(&self) -> Result<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT image FROM posts")
            .fetch_all(&self.pool)
            .await?;

        Ok(keys)
    }
}
