//! Clinivault Database Layer
//!
//! PostgreSQL implementations of the quota store and the attachment metadata
//! repository, plus the embedded schema migrations.

// Module declarations
pub mod db;

// Re-exports: Repositories and helpers
pub use db::{connect, run_migrations, AttachmentRepository, PgQuotaStore, RepositoryError};
