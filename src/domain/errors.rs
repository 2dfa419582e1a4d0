//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these. None of them is fatal to the
//! process; callers decide how to present them.

use crate::domain::MotionStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    /// Majority string matched neither the fraction nor the percentage grammar.
    #[error("Invalid majority specification: {0}")]
    InvalidSpecification(String),

    #[error("Council {council_id} already has an active motion (#{motion_id})")]
    MotionAlreadyActive { council_id: i64, motion_id: i64 },

    #[error("Motion #{0} not found")]
    MotionNotFound(i64),

    #[error("Motion #{motion_id} is already closed ({status})")]
    MotionClosed {
        motion_id: i64,
        status: MotionStatus,
    },

    /// The weight collaborator failed; the vote was not recorded.
    #[error("Weight resolution failed: {0}")]
    WeightResolutionFailure(String),

    #[error("No council bound to {0}")]
    CouncilNotFound(String),

    /// Zero, or a weight whose sum no longer fits a `u64`.
    #[error("Weight {0} is out of range")]
    InvalidWeight(u64),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Per-motion lock could not be acquired within the configured timeout.
    #[error("Motion #{0} is busy, try again")]
    Busy(i64),

    #[error("Repository error: {0}")]
    Repo(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Announcement failed: {0}")]
    Announce(String),

    #[error("Archive export failed: {0}")]
    Export(String),

    #[error("UI error: {0}")]
    Ui(String),
}
