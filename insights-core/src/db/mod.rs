//! SQLite activity store
//!
//! This module provides the SQLite-backed [`crate::source::ActivitySource`] with:
//! - Schema migrations
//! - Write operations for loading workspace activity
//! - Windowed aggregate queries

mod queries;
pub mod repo;
pub mod schema;

pub use repo::{Channel, Database, Post, Reaction, Team, User};
