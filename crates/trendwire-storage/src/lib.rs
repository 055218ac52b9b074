//! Trendwire Storage crate - SQLite persistence for items and embeddings.
//!
//! Provides a WAL-mode SQLite database with migrations and the
//! [`ItemStore`] contract the pipeline runs against.

pub mod db;
pub mod migrations;
pub mod repository;
pub mod store;

pub use db::Database;
pub use repository::ItemRepository;
pub use store::ItemStore;
