//! Log-only announcer. Used when no webhook is configured.

use crate::domain::{DomainError, Motion, Tally};
use crate::ports::AnnouncerPort;
use tracing::info;

#[derive(Debug, Default)]
pub struct LogAnnouncer;

impl LogAnnouncer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl AnnouncerPort for LogAnnouncer {
    async fn motion_proposed(&self, motion: &Motion) -> Result<(), DomainError> {
        info!(
            motion_id = motion.id,
            council_id = motion.council_id,
            author_id = motion.author_id,
            majority = %motion.requirement(),
            "[ANNOUNCE] new motion: {}",
            motion.text
        );
        Ok(())
    }

    async fn motion_resolved(&self, motion: &Motion, tally: &Tally) -> Result<(), DomainError> {
        info!(
            motion_id = motion.id,
            council_id = motion.council_id,
            status = %motion.status,
            yes = tally.yes,
            no = tally.no,
            abstain = tally.abstain,
            "[ANNOUNCE] motion {}",
            motion.status
        );
        Ok(())
    }
}
