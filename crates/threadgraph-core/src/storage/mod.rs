//! SQLite-backed persistence for threadgraph

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig};
