//! Core domain layer. No external I/O dependencies.
//!
//! Entities, majority parsing and the tally evaluator live here. Dependencies flow inward.

pub mod duration;
pub mod entities;
pub mod errors;
pub mod majority;
pub mod tally;

pub use duration::parse_duration;
pub use entities::{
    CloseTarget, Council, Motion, MotionRecord, MotionStatus, NewMotion, Vote, VoteChoice, VoteOutcome,
    WeightAssignment, WeightTarget, effective_weight,
};
pub use errors::DomainError;
pub use majority::Majority;
pub use tally::{Tally, Verdict, evaluate};
