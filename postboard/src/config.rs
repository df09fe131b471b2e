//! Application configuration
//!
//! Central location for validation boundaries, listing limits and the
//! runtime configuration loaded from the environment.

use crate::error::{AppError, Result};
use std::path::PathBuf;
use std::time::Duration;

// ===== Validation Limits =====

/// Minimum post title length in characters
pub const MIN_TITLE_CHARS: usize = 5;

/// Minimum post content length in characters
pub const MIN_CONTENT_CHARS: usize = 10;

/// Maximum accepted image upload size (2 MiB)
pub const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

/// Maximum accepted image width or height in pixels
pub const MAX_IMAGE_DIMENSION: u32 = 6000;

/// Decoder allocation ceiling, one RGBA frame at the maximum dimensions
pub const MAX_IMAGE_DECODE_BYTES: u64 = MAX_IMAGE_DIMENSION as u64 * MAX_IMAGE_DIMENSION as u64 * 4;

// ===== Listing =====

/// Posts per page when nothing else is configured
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// Upper bound for a requested page size
pub const MAX_PAGE_SIZE: u32 = 100;

// ===== Storage =====

/// Deadline applied to every single record store or blob store call
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Unreferenced images younger than this are left alone by the sweeper,
/// they may belong to a create or update that is still in flight.
pub const DEFAULT_ORPHAN_GRACE_SECS: u64 = 3600;

/// Number of random characters in a generated image key (before the extension)
pub const IMAGE_KEY_RANDOM_CHARS: usize = 40;

const ENV_DATA_DIR: &str = "POSTBOARD_DATA_DIR";
const ENV_PAGE_SIZE: &str = "POSTBOARD_PAGE_SIZE";
const ENV_OPERATION_TIMEOUT: &str = "POSTBOARD_OPERATION_TIMEOUT_SECS";

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub page_size: u32,
    pub operation_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            page_size: DEFAULT_PAGE_SIZE,
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    /// Load configuration from `POSTBOARD_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup(ENV_PAGE_SIZE) {
            let size: u32 = raw
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("{} must be a number, got {:?}", ENV_PAGE_SIZE, raw)))?;
            config.page_size = validate_page_size(size)?;
        }

        if let Some(raw) = lookup(ENV_OPERATION_TIMEOUT) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                AppError::Config(format!("{} must be a number, got {:?}", ENV_OPERATION_TIMEOUT, raw))
            })?;
            if secs == 0 {
                return Err(AppError::Config(format!("{} must be positive", ENV_OPERATION_TIMEOUT)));
            }
            config.operation_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("posts.db")
    }

    /// Root directory of the image blob store
    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("storage").join("posts")
    }
}

/// Check a page size against the accepted range
pub fn validate_page_size(size: u32) -> Result<u32> {
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(AppError::Config(format!(
            "page size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, size
        )));
    }
    Ok(size)
}
