//! # natsauth Store
//!
//! Storage abstraction for natsauth. Provides a trait-based interface for
//! credential records and declared objects, with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! The engine never talks to a database directly. It reads declared
//! operators, accounts and users and writes credential records through the
//! [`Store`] trait. The primary implementation is [`SqliteStore`], with
//! [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`StoreExt`] - Typed helpers (`get`, `list`, `declare`, `write_status`)
//! - [`Record`] - A named, versioned bag of credential fields
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests, with write counters
//!
//! ## Usage
//!
//! ```rust,no_run
//! use natsauth_core::AccountSpec;
//! use natsauth_store::{Record, SqliteStore, Store, StoreExt};
//!
//! async fn example() {
//!     let store = SqliteStore::open("natsauth.db").unwrap();
//!
//!     // Declare desired state
//!     let account = store.declare("prod", &AccountSpec::new("root")).await.unwrap();
//!     assert_eq!(account.meta.generation, 1);
//!
//!     // Records are created once, then replaced at their current version
//!     let record = Record::new("prod-account-jwt").with_field("account.jwt", "...");
//!     let stored = store.create_record(&record).await.unwrap();
//!     store.update_record(&stored).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Optimistic concurrency**: stale versions fail with `Conflict`
//! - **Atomic records**: seed and token land in one write
//! - **Quiet re-declaration**: an unchanged spec is not a write

pub mod error;
pub mod memory;
pub mod migration;
pub mod record;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemoryStore, WriteStats};
pub use record::{account_record_name, fields, operator_record_name, user_record_name, Record};
pub use sqlite::SqliteStore;
pub use traits::{Store, StoreExt, StoredObject};
