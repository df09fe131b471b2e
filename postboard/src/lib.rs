//! Postboard library
//!
//! Blog posts with an uploaded image each: post records live in SQLite,
//! image bytes in a blob store, and the posts service keeps the two in step.

pub mod app;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
pub mod storage;
pub mod validation;
