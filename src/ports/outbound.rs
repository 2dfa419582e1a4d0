//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{
    Council, DomainError, Motion, MotionStatus, NewMotion, Tally, Vote, VoteOutcome,
    WeightAssignment, WeightTarget,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Council registry. One council per channel.
#[async_trait::async_trait]
pub trait CouncilRepo: Send + Sync {
    /// Create the council for `channel_id`, or rename it if it exists.
    async fn upsert_council(
        &self,
        guild_id: i64,
        channel_id: i64,
        name: &str,
    ) -> Result<Council, DomainError>;

    async fn council_by_channel(&self, channel_id: i64) -> Result<Option<Council>, DomainError>;

    async fn council_by_id(&self, council_id: i64) -> Result<Option<Council>, DomainError>;

    async fn list_councils(&self) -> Result<Vec<Council>, DomainError>;

    /// Remove the council bound to `channel_id` together with its weights and
    /// configuration. A still-active motion is killed at `closed_at` in the same
    /// write; historical motions stay addressable. Returns the removed council.
    async fn remove_council(
        &self,
        channel_id: i64,
        closed_at: DateTime<Utc>,
    ) -> Result<Option<Council>, DomainError>;
}

/// Weight map of a council.
#[async_trait::async_trait]
pub trait WeightRepo: Send + Sync {
    /// Insert or overwrite the assignment for its (council, target).
    async fn set_weight(&self, assignment: &WeightAssignment) -> Result<(), DomainError>;

    /// Returns true if an assignment was removed.
    async fn remove_weight(&self, council_id: i64, target: WeightTarget) -> Result<bool, DomainError>;

    async fn weights(&self, council_id: i64) -> Result<Vec<WeightAssignment>, DomainError>;
}

/// Resolves a voter's effective weight from their identity and group membership.
#[async_trait::async_trait]
pub trait WeightResolver: Send + Sync {
    /// Sum of the direct and all matching group assignments; 1 when none match.
    async fn resolve_weight(
        &self,
        council_id: i64,
        voter_id: i64,
        group_ids: &[i64],
    ) -> Result<u64, DomainError>;
}

/// Per-council key/value configuration. Values are JSON.
#[async_trait::async_trait]
pub trait ConfigRepo: Send + Sync {
    async fn set_config(&self, council_id: i64, key: &str, value: &Value) -> Result<(), DomainError>;

    /// Returns true if the key existed.
    async fn unset_config(&self, council_id: i64, key: &str) -> Result<bool, DomainError>;

    async fn get_config(&self, council_id: i64, key: &str) -> Result<Option<Value>, DomainError>;

    async fn all_configs(&self, council_id: i64) -> Result<BTreeMap<String, Value>, DomainError>;
}

/// Motion and vote storage. Every state transition is conditional on the
/// motion still being active, so the store alone already rejects stale writes.
#[async_trait::async_trait]
pub trait MotionStore: Send + Sync {
    /// Insert an active motion unless the council already has one, in which
    /// case fails with `MotionAlreadyActive`.
    async fn insert_motion(&self, motion: &NewMotion) -> Result<Motion, DomainError>;

    async fn motion(&self, motion_id: i64) -> Result<Option<Motion>, DomainError>;

    async fn active_motion(&self, council_id: i64) -> Result<Option<Motion>, DomainError>;

    /// All motions of a council, oldest first.
    async fn motions_for_council(&self, council_id: i64) -> Result<Vec<Motion>, DomainError>;

    /// In one atomic write: check the motion is active, upsert `vote` keyed by
    /// (motion, voter), recompute the tally from all stored votes, and mark the
    /// motion passed at `vote.cast_at` if the tally reaches its majority.
    /// On error nothing is written.
    async fn record_vote(&self, vote: &Vote) -> Result<VoteOutcome, DomainError>;

    /// Move an active motion to `status`. Fails with `MotionNotFound` or
    /// `MotionClosed`; never overwrites a terminal status.
    async fn close_motion(
        &self,
        motion_id: i64,
        status: MotionStatus,
        closed_at: DateTime<Utc>,
    ) -> Result<Motion, DomainError>;

    async fn votes(&self, motion_id: i64) -> Result<Vec<Vote>, DomainError>;

    async fn tally(&self, motion_id: i64) -> Result<Tally, DomainError>;
}

/// Source of `created_at` / `closed_at` / `cast_at`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
