//! Announcement outbound port. Tell the council about proposals and results.

use crate::domain::{DomainError, Motion, Tally};

/// Port for announcing motion events to an external channel.
///
/// Implemented by adapters (webhook, log). Announcements are best effort: the
/// motion service logs failures and never undoes the state change that
/// triggered them.
#[async_trait::async_trait]
pub trait AnnouncerPort: Send + Sync {
    /// A new motion was proposed.
    async fn motion_proposed(&self, motion: &Motion) -> Result<(), DomainError>;

    /// A motion reached a terminal state; `tally` is the final count.
    ///
    /// # Errors
    /// Returns `DomainError::Announce` if delivery fails.
    async fn motion_resolved(&self, motion: &Motion, tally: &Tally) -> Result<(), DomainError>;
}
