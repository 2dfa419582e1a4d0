//! Persistence adapters. libsql for durable storage, in-memory for tests and throwaway sessions.

pub mod memory_repo;
pub mod sqlite_repo;

pub use memory_repo::MemoryRepo;
pub use sqlite_repo::SqliteRepo;
