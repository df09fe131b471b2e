//! Services module
//!
//! Business logic services that coordinate between commands and the stores.

pub mod posts;

pub use posts::PostsService;
