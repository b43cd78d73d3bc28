//! Database layer for Rota
//!
//! SQLite implementation of the reviewer-assignment persistence gateway.

pub mod db;
pub mod error;
mod rows;
pub mod store;

pub use db::{Database, DatabaseConfig};
pub use error::{Error, Result};
pub use store::{SqliteStore, SqliteTransaction};
