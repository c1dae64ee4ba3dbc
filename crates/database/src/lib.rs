//! # Tidewatch Database Crate
//!
//! This crate is the system's "permanent archive": end-of-day balance/equity
//! snapshots and the derived-statistics blobs the monitor serves after a restart.
//!
//! ## Architectural Principles
//!
//! - **Layer 2 Adapter:** This crate encapsulates all storage-specific logic
//!   behind the `SnapshotStore` trait. The engine never sees SQL.
//! - **Idempotent Writes:** Every write is an upsert on its natural key, so
//!   replays and concurrent background refreshes can rewrite rows safely.
//! - **Asynchronous & Pooled:** The PostgreSQL implementation shares one
//!   bounded connection pool (`PgPool`) across all accounts.
//!
//! ## Public API
//!
//! - `connect`: The async function to establish the database connection pool.
//! - `run_migrations`: Applies the embedded schema migrations.
//! - `SnapshotStore`: The read/write interface the engine depends on.
//! - `DbRepository`: `SnapshotStore` on PostgreSQL.
//! - `MemoryStore`: `SnapshotStore` in process memory.
//! - `DbError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use memory::MemoryStore;
pub use repository::DbRepository;
pub use store::{BlobKind, SnapshotStore};
