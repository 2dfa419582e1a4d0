//! Application use cases. Orchestrate domain logic via ports.

pub mod archive_service;
pub mod council_service;
pub mod motion_locks;
pub mod motion_service;

pub use archive_service::{ArchiveFormat, ArchiveService};
pub use council_service::{CouncilService, CouncilStats, StatusCounts};
pub use motion_locks::MotionLocks;
pub use motion_service::{Ballot, MotionService, Proposal, Voter};
