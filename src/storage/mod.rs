//! Storage Layer Module
//!
//! Provides persistence for registered locked outputs.
//!
//! This module contains:
//! - Storage trait definition for abstraction
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryLockedOutputStore;
pub use sqlite::SqliteLockedOutputStore;
pub use traits::{LockedOutputStore, StorageError, StorageResult};
