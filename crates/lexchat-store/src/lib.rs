//! # lexchat-store
//!
//! Document store for Lexchat conversations, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection`, provides typed CRUD helpers for conversations and
//! messages, assigns server timestamps, and publishes a change feed that
//! callers turn into live queries. Message text is stored exactly as given;
//! encryption happens before anything reaches this layer.

pub mod conversations;
pub mod database;
pub mod events;
pub mod messages;
pub mod migrations;
pub mod models;

mod clock;
mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use events::StoreEvent;
pub use models::*;
