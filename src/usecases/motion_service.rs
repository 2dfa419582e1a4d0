//! Motion lifecycle use case: propose, cast, close, query.
//!
//! Owns the state machine `active -> passed | killed | expired`. Every write to
//! a motion runs under its per-motion lock; the store re-checks `active` inside
//! its own transaction, so a stale caller can never reopen or overwrite a
//! terminal motion. Announcements happen after the write committed and never
//! undo it.

use crate::domain::{
    CloseTarget, DomainError, Majority, Motion, NewMotion, Tally, Vote, VoteChoice, VoteOutcome,
};
use crate::ports::{AnnouncerPort, Clock, CouncilRepo, MotionStore, WeightResolver};
use crate::usecases::motion_locks::MotionLocks;
use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Request to open a motion.
#[derive(Debug, Clone, Default)]
pub struct Proposal {
    pub council_id: i64,
    pub author_id: i64,
    pub text: String,
    /// Majority spec such as "2/3" or "66%"; `None` means simple majority.
    pub majority: Option<String>,
    pub unanimous: bool,
    /// Advisory deadline, stored as `expires_at`. Nothing closes the motion on its own.
    pub expires_in: Option<Duration>,
}

/// A vote with an already known weight.
#[derive(Debug, Clone)]
pub struct Ballot {
    pub motion_id: i64,
    pub voter_id: i64,
    pub choice: VoteChoice,
    pub reason: Option<String>,
    pub weight: u64,
}

/// Identity of a voter as the membership collaborator sees it.
#[derive(Debug, Clone, Default)]
pub struct Voter {
    pub id: i64,
    pub group_ids: Vec<i64>,
}

pub struct MotionService {
    councils: Arc<dyn CouncilRepo>,
    store: Arc<dyn MotionStore>,
    resolver: Arc<dyn WeightResolver>,
    announcer: Arc<dyn AnnouncerPort>,
    clock: Arc<dyn Clock>,
    locks: MotionLocks,
}

impl MotionService {
    pub fn new(
        councils: Arc<dyn CouncilRepo>,
        store: Arc<dyn MotionStore>,
        resolver: Arc<dyn WeightResolver>,
        announcer: Arc<dyn AnnouncerPort>,
        clock: Arc<dyn Clock>,
        locks: MotionLocks,
    ) -> Self {
        Self {
            councils,
            store,
            resolver,
            announcer,
            clock,
            locks,
        }
    }

    /// Open a new active motion. Fails with `MotionAlreadyActive` if the
    /// council already has one; the check and the insert are a single write.
    pub async fn propose(&self, proposal: Proposal) -> Result<Motion, DomainError> {
        let council = self
            .councils
            .council_by_id(proposal.council_id)
            .await?
            .ok_or_else(|| DomainError::CouncilNotFound(format!("council {}", proposal.council_id)))?;

        let majority = Majority::parse_or_default(proposal.majority.as_deref())?;
        let now = self.clock.now();
        let expires_at = match proposal.expires_in {
            Some(d) => Some(
                now.checked_add_signed(d)
                    .ok_or_else(|| DomainError::InvalidDuration(format!("{} is out of range", d)))?,
            ),
            None => None,
        };

        let motion = self
            .store
            .insert_motion(&NewMotion {
                council_id: council.id,
                author_id: proposal.author_id,
                text: proposal.text,
                majority,
                unanimous: proposal.unanimous,
                created_at: now,
                expires_at,
            })
            .await?;

        info!(
            motion_id = motion.id,
            council_id = motion.council_id,
            author_id = motion.author_id,
            majority = %motion.requirement(),
            "motion proposed"
        );

        if let Err(e) = self.announcer.motion_proposed(&motion).await {
            warn!(motion_id = motion.id, error = %e, "proposal announcement failed");
        }
        Ok(motion)
    }

    /// Record or replace a vote. The vote write, the tally recount and the
    /// auto-pass are one atomic store operation; on error nothing changed.
    pub async fn cast_vote(&self, ballot: Ballot) -> Result<VoteOutcome, DomainError> {
        if ballot.weight == 0 {
            return Err(DomainError::InvalidWeight(ballot.weight));
        }

        let guard = self.locks.acquire(ballot.motion_id).await?;
        let vote = Vote {
            motion_id: ballot.motion_id,
            voter_id: ballot.voter_id,
            choice: ballot.choice,
            reason: ballot.reason.filter(|r| !r.trim().is_empty()),
            weight: ballot.weight,
            cast_at: self.clock.now(),
        };
        let outcome = self.store.record_vote(&vote).await?;
        drop(guard);

        info!(
            motion_id = vote.motion_id,
            voter_id = vote.voter_id,
            choice = %vote.choice,
            weight = vote.weight,
            replaced = outcome.replaced_previous,
            tally = %outcome.tally,
            "vote recorded"
        );

        if outcome.closed_motion() {
            info!(motion_id = vote.motion_id, status = %outcome.status, "motion resolved by vote");
            self.announce_resolved(vote.motion_id, &outcome.tally).await;
        }
        Ok(outcome)
    }

    /// Resolve the voter's weight through the membership collaborator, then cast.
    /// A resolver error is reported as `WeightResolutionFailure` and no vote is
    /// stored. An overflowing weight sum stays `InvalidWeight`.
    pub async fn cast_vote_as(
        &self,
        motion_id: i64,
        voter: &Voter,
        choice: VoteChoice,
        reason: Option<String>,
    ) -> Result<VoteOutcome, DomainError> {
        let motion = self.get_motion(motion_id).await?;
        motion.ensure_active()?;

        let weight = self
            .resolver
            .resolve_weight(motion.council_id, voter.id, &voter.group_ids)
            .await
            .map_err(|e| match e {
                DomainError::WeightResolutionFailure(_) | DomainError::InvalidWeight(_) => e,
                other => DomainError::WeightResolutionFailure(other.to_string()),
            })?;

        self.cast_vote(Ballot {
            motion_id,
            voter_id: voter.id,
            choice,
            reason,
            weight,
        })
        .await
    }

    /// Move an active motion to killed or expired. Authorization is the
    /// caller's business; `actor_id` is only logged.
    pub async fn close(
        &self,
        motion_id: i64,
        actor_id: i64,
        target: CloseTarget,
    ) -> Result<Motion, DomainError> {
        let guard = self.locks.acquire(motion_id).await?;
        let motion = self
            .store
            .close_motion(motion_id, target.into(), self.clock.now())
            .await?;
        drop(guard);

        info!(motion_id, actor_id, status = %motion.status, "motion closed");

        match self.store.tally(motion_id).await {
            Ok(tally) => {
                if let Err(e) = self.announcer.motion_resolved(&motion, &tally).await {
                    warn!(motion_id, error = %e, "result announcement failed");
                }
            }
            Err(e) => warn!(motion_id, error = %e, "could not load tally for announcement"),
        }
        Ok(motion)
    }

    pub async fn get_active(&self, council_id: i64) -> Result<Option<Motion>, DomainError> {
        self.store.active_motion(council_id).await
    }

    pub async fn get_motion(&self, motion_id: i64) -> Result<Motion, DomainError> {
        self.store
            .motion(motion_id)
            .await?
            .ok_or(DomainError::MotionNotFound(motion_id))
    }

    /// Current weighted totals, recomputed from stored votes.
    pub async fn get_totals(&self, motion_id: i64) -> Result<Tally, DomainError> {
        self.get_motion(motion_id).await?;
        self.store.tally(motion_id).await
    }

    pub async fn votes(&self, motion_id: i64) -> Result<Vec<Vote>, DomainError> {
        self.get_motion(motion_id).await?;
        self.store.votes(motion_id).await
    }

    /// Members of `eligible` that have no vote on the motion, in input order.
    pub async fn pending_voters(
        &self,
        motion_id: i64,
        eligible: &[i64],
    ) -> Result<Vec<i64>, DomainError> {
        let voted: HashSet<i64> = self
            .votes(motion_id)
            .await?
            .into_iter()
            .map(|v| v.voter_id)
            .collect();
        let mut seen = HashSet::new();
        Ok(eligible
            .iter()
            .copied()
            .filter(|id| !voted.contains(id) && seen.insert(*id))
            .collect())
    }

    /// Close the council's active motion as expired when its deadline passed.
    /// Returns the expired motion, or `None` when nothing was overdue.
    pub async fn expire_if_overdue(&self, council_id: i64) -> Result<Option<Motion>, DomainError> {
        let Some(motion) = self.store.active_motion(council_id).await? else {
            return Ok(None);
        };
        if !motion.is_overdue(self.clock.now()) {
            return Ok(None);
        }
        match self.close(motion.id, motion.author_id, CloseTarget::Expired).await {
            Ok(expired) => Ok(Some(expired)),
            // Resolved by a concurrent vote or close.
            Err(DomainError::MotionClosed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn announce_resolved(&self, motion_id: i64, tally: &Tally) {
        let motion = match self.store.motion(motion_id).await {
            Ok(Some(m)) => m,
            Ok(None) => return,
            Err(e) => {
                warn!(motion_id, error = %e, "could not load motion for announcement");
                return;
            }
        };
        if let Err(e) = self.announcer.motion_resolved(&motion, tally).await {
            warn!(motion_id, error = %e, "result announcement failed");
        }
    }
}
