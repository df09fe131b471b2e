//! Database models
//!
//! Rust structs representing database entities.
//! All models use serde for serialization to the command line output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A blog post
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Blob store key of the post image
    pub image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create post request
#[derive(Debug, Clone)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub image: String,
}

/// Update post request
#[derive(Debug, Clone)]
pub struct UpdatePostRequest {
    pub id: String,
    pub title: String,
    pub content: String,
    /// New image key, `None` keeps the current one
    pub image: Option<String>,
}

/// Which page of a newest-first listing to fetch.
///
/// Both fields are at least 1, so only [`PageRequest::new`] builds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based
    page: u32,
    per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn first(per_page: u32) -> Self {
        Self::new(1, per_page)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub last_page: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        let last_page = total.div_ceil(u64::from(request.per_page())).max(1);
        Self {
            items,
            page: request.page(),
            per_page: request.per_page(),
            total,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
        }
    }

    /// Request for the following page, if there is one
    pub fn next_page(&self) -> Option<PageRequest> {
        (self.page < self.last_page).then(|| PageRequest::new(self.page + 1, self.per_page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_math() {
        let page: Page<u8> = Page::new(vec![1, 2, 3, 4, 5], PageRequest::first(5), 7);
        assert_eq!(page.last_page, 2);
        assert_eq!(page.next_page(), Some(PageRequest::new(2, 5)));
        assert_eq!(PageRequest::new(2, 5).offset(), 5);

        let last: Page<u8> = Page::new(vec![6, 7], PageRequest::new(2, 5), 7);
        assert_eq!(last.next_page(), None);

        let empty: Page<u8> = Page::new(vec![], PageRequest::first(5), 0);
        assert_eq!(empty.last_page, 1);
        assert_eq!(empty.next_page(), None);
    }

    #[test]
    fn test_page_request_clamps_to_one() {
        let request = PageRequest::new(0, 0);
        assert_eq!(request.page(), 1);
        assert_eq!(request.per_page(), 1);
        assert_eq!(request.offset(), 0);

        // A zero-sized request pages one item at a time instead of dividing by zero
        let page: Page<u8> = Page::new(vec![], request, 3);
        assert_eq!(page.per_page, 1);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.next_page(), Some(PageRequest::new(2, 1)));
    }
}
