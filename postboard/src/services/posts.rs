//! Posts service
//!
//! Coordinates the record store and the image blob store for post
//! create, update and delete. There is no transaction spanning both stores;
//! consistency comes from the order of the steps:
//!
//! - create: store image, then insert record. If the insert fails the image
//!   is removed again.
//! - update with a new image: store new image, update record, then delete
//!   the old image. A record that exists always points at an existing image.
//! - delete: delete image, then delete record. A failed image delete stops
//!   the record delete.
//!
//! Two callers updating or deleting the same post at once race; the last
//! record write wins and the loser's image can be left orphaned.
//! [`PostsService::sweep_orphans`] reclaims such files.

use crate::config::DEFAULT_OPERATION_TIMEOUT_SECS;
use crate::database::{CreatePostRequest, Page, PageRequest, Post, PostStore, UpdatePostRequest};
use crate::error::{AppError, Result};
use crate::storage::BlobStorage;
use crate::validation::{NewPost, PostChanges};
use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Service for managing posts and their images
#[derive(Clone)]
pub struct PostsService {
    store: Arc<dyn PostStore>,
    blobs: Arc<dyn BlobStorage>,
    timeout: Duration,
}

impl PostsService {
    pub fn new(store: Arc<dyn PostStore>, blobs: Arc<dyn BlobStorage>) -> Self {
        Self {
            store,
            blobs,
            timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
        }
    }

    /// Deadline for each individual store call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a post from an accepted submission
    pub async fn create(&self, post: NewPost) -> Result<Post> {
        tracing::info!(
            "Creating post: {} (image: {} bytes)",
            post.title,
            post.image.len()
        );

        let key = self
            .guarded(
                "store image",
                self.blobs.put(post.image.bytes(), post.image.kind().extension()),
            )
            .await
            .map_err(storage_write_failed)?;

        let req = CreatePostRequest {
            title: post.title,
            content: post.content,
            image: key.clone(),
        };

        match self.guarded("create post record", self.store.create_post(req)).await {
            Ok(created) => {
                tracing::info!("Post created: {} (image: {})", created.id, key);
                Ok(created)
            }
            Err(AppError::Timeout(op)) => {
                // The insert may still have committed, keep the image
                tracing::warn!("Post creation timed out, image {} may be orphaned", key);
                Err(AppError::Timeout(op))
            }
            Err(e) => {
                tracing::warn!("Post record creation failed, removing image {}: {}", key, e);
                self.discard_image(&key).await;
                Err(record_write_failed(e))
            }
        }
    }

    /// Get a post by ID
    pub async fn get(&self, id: &str) -> Result<Post> {
        self.guarded("load post", self.store.get_post(id)).await
    }

    /// Get a post together with its image bytes
    pub async fn image(&self, id: &str) -> Result<(Post, Vec<u8>)> {
        let post = self.get(id).await?;
        let data = self.guarded("read image", self.blobs.read(&post.image)).await?;
        Ok((post, data))
    }

    /// List posts newest first
    pub async fn list(&self, page: PageRequest) -> Result<Page<Post>> {
        self.guarded("list posts", self.store.list_posts(page)).await
    }

    /// Update title and content, replacing the image when a new one is given
    pub async fn update(&self, id: &str, changes: PostChanges) -> Result<Post> {
        tracing::info!("Updating post: {}", id);

        let current = self.get(id).await?;

        let Some(image) = changes.image else {
            let updated = self
                .guarded(
                    "update post record",
                    self.store.update_post(UpdatePostRequest {
                        id: current.id,
                        title: changes.title,
                        content: changes.content,
                        image: None,
                    }),
                )
                .await
                .map_err(record_write_failed)?;

            tracing::info!("Post updated: {}", updated.id);
            return Ok(updated);
        };

        let new_key = self
            .guarded(
                "store image",
                self.blobs.put(image.bytes(), image.kind().extension()),
            )
            .await
            .map_err(storage_write_failed)?;

        let req = UpdatePostRequest {
            id: current.id.clone(),
            title: changes.title,
            content: changes.content,
            image: Some(new_key.clone()),
        };

        let updated = match self.guarded("update post record", self.store.update_post(req)).await {
            Ok(updated) => updated,
            Err(AppError::Timeout(op)) => {
                // Either image may be the one referenced now, keep both
                tracing::warn!(
                    "Post update timed out, image {} or {} may be orphaned",
                    new_key,
                    current.image
                );
                return Err(AppError::Timeout(op));
            }
            Err(e) => {
                tracing::warn!("Post record update failed, removing image {}: {}", new_key, e);
                self.discard_image(&new_key).await;
                return Err(record_write_failed(e));
            }
        };

        if let Err(e) = self.guarded("delete image", self.blobs.delete(&current.image)).await {
            tracing::warn!(
                "Post {} now uses image {}, old image {} is orphaned: {}",
                updated.id,
                new_key,
                current.image,
                e
            );
            return Err(storage_delete_failed(e));
        }

        tracing::info!("Post updated: {} (image: {} -> {})", updated.id, current.image, new_key);
        Ok(updated)
    }

    /// Delete a post and its image
    pub async fn delete(&self, id: &str) -> Result<()> {
        tracing::info!("Deleting post: {}", id);

        let post = self.get(id).await?;

        self.guarded("delete image", self.blobs.delete(&post.image))
            .await
            .map_err(storage_delete_failed)?;

        self.guarded("delete post record", self.store.delete_post(&post.id))
            .await
            .map_err(record_write_failed)?;

        tracing::info!("Post deleted: {} (image: {})", post.id, post.image);
        Ok(())
    }

    /// Delete images no post references that are older than `grace`.
    ///
    /// Returns the removed keys.
    pub async fn sweep_orphans(&self, grace: Duration) -> Result<Vec<String>> {
        let grace = chrono::Duration::from_std(grace)
            .map_err(|_| AppError::Config(format!("grace period out of range: {:?}", grace)))?;
        let cutoff = Utc::now() - grace;

        // Blobs are listed before references so a post created in between
        // is seen as referenced.
        let blobs = self.guarded("list images", self.blobs.list()).await?;
        let referenced: HashSet<String> = self
            .guarded("list image references", self.store.list_image_keys())
            .await?
            .into_iter()
            .collect();

        let mut removed = Vec::new();
        for blob in blobs {
            if referenced.contains(&blob.key) || blob.modified_at > cutoff {
                continue;
            }

            self.guarded("delete image", self.blobs.delete(&blob.key))
                .await
                .map_err(storage_delete_failed)?;

            tracing::info!("Removed orphaned image: {}", blob.key);
            removed.push(blob.key);
        }

        // Temp files of writes that were dropped mid-flight, e.g. by a timeout
        let partial = self
            .guarded("purge partial writes", self.blobs.purge_partial_writes(cutoff))
            .await
            .map_err(storage_delete_failed)?;
        if partial > 0 {
            tracing::info!("Removed {} partial image write(s)", partial);
        }

        Ok(removed)
    }

    /// Best-effort removal of an image no record points at
    async fn discard_image(&self, key: &str) {
        if let Err(e) = self.guarded("delete image", self.blobs.delete(key)).await {
            tracing::warn!("Could not remove unreferenced image {}: {}", key, e);
        }
    }

    async fn guarded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("{} exceeded {:?}", operation, self.timeout);
                Err(AppError::Timeout(operation))
            }
        }
    }
}

fn storage_write_failed(e: AppError) -> AppError {
    match e {
        AppError::Timeout(_) => e,
        other => AppError::StorageWriteFailed(other.to_string()),
    }
}

fn storage_delete_failed(e: AppError) -> AppError {
    match e {
        AppError::Timeout(_) => e,
        other => AppError::StorageDeleteFailed(other.to_string()),
    }
}

fn record_write_failed(e: AppError) -> AppError {
    match e {
        AppError::Timeout(_) | AppError::PostNotFound(_) => e,
        other => AppError::RecordWriteFailed(other.to_string()),
    }
}
