//! Infrastructure adapters. Implement outbound ports and the console front end.
//!
//! SQLite and memory storage, announcers, archive encoders. Map errors to DomainError.

pub mod announce;
pub mod clock;
pub mod export;
pub mod persistence;
pub mod ui;
