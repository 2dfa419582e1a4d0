//! Domain entities. Pure data structures for the core business.
//!
//! No chat-platform or storage types here; adapters map into these.

use crate::domain::tally::{self, Tally, Verdict};
use crate::domain::{DomainError, Majority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A deliberation body bound to one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Council {
    pub id: i64,
    pub guild_id: i64,
    pub channel_id: i64,
    pub name: String,
}

/// Who a weight assignment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum WeightTarget {
    Member(i64),
    Group(i64),
}

impl WeightTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            WeightTarget::Member(_) => "member",
            WeightTarget::Group(_) => "group",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            WeightTarget::Member(id) | WeightTarget::Group(id) => *id,
        }
    }

    pub fn from_parts(kind: &str, id: i64) -> Result<Self, DomainError> {
        match kind {
            "member" => Ok(WeightTarget::Member(id)),
            "group" => Ok(WeightTarget::Group(id)),
            other => Err(DomainError::Repo(format!("unknown weight target kind '{}'", other))),
        }
    }

    fn applies_to(&self, voter_id: i64, group_ids: &[i64]) -> bool {
        match self {
            WeightTarget::Member(id) => *id == voter_id,
            WeightTarget::Group(id) => group_ids.contains(id),
        }
    }
}

impl fmt::Display for WeightTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightTarget::Member(id) => write!(f, "member {}", id),
            WeightTarget::Group(id) => write!(f, "group {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightAssignment {
    pub council_id: i64,
    pub target: WeightTarget,
    pub weight: u64,
}

/// Effective weight of a voter: their direct assignment plus every matching
/// group assignment. Voters nothing applies to weigh 1. A sum past `u64::MAX`
/// fails with `InvalidWeight`.
pub fn effective_weight(
    assignments: &[WeightAssignment],
    voter_id: i64,
    group_ids: &[i64],
) -> Result<u64, DomainError> {
    let mut total = 0u64;
    for a in assignments.iter().filter(|a| a.target.applies_to(voter_id, group_ids)) {
        total = total
            .checked_add(a.weight)
            .ok_or(DomainError::InvalidWeight(a.weight))?;
    }
    Ok(if total > 0 { total } else { 1 })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionStatus {
    Active,
    Passed,
    Failed,
    Killed,
    Expired,
}

impl MotionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionStatus::Active => "active",
            MotionStatus::Passed => "passed",
            MotionStatus::Failed => "failed",
            MotionStatus::Killed => "killed",
            MotionStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self != MotionStatus::Active
    }
}

impl fmt::Display for MotionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MotionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MotionStatus::Active),
            "passed" => Ok(MotionStatus::Passed),
            "failed" => Ok(MotionStatus::Failed),
            "killed" => Ok(MotionStatus::Killed),
            "expired" => Ok(MotionStatus::Expired),
            other => Err(DomainError::Repo(format!("unknown motion status '{}'", other))),
        }
    }
}

/// Terminal states an explicit close may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseTarget {
    Killed,
    Expired,
}

impl From<CloseTarget> for MotionStatus {
    fn from(target: CloseTarget) -> Self {
        match target {
            CloseTarget::Killed => MotionStatus::Killed,
            CloseTarget::Expired => MotionStatus::Expired,
        }
    }
}

/// A proposal under vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motion {
    pub id: i64,
    pub council_id: i64,
    pub author_id: i64,
    pub text: String,
    pub majority: Majority,
    pub unanimous: bool,
    pub status: MotionStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Motion {
    pub fn is_active(&self) -> bool {
        self.status == MotionStatus::Active
    }

    /// Fails with `MotionClosed` once the motion reached a terminal state.
    pub fn ensure_active(&self) -> Result<(), DomainError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DomainError::MotionClosed {
                motion_id: self.id,
                status: self.status,
            })
        }
    }

    pub fn evaluate(&self, tally: &Tally) -> Verdict {
        tally::evaluate(tally, self.majority, self.unanimous)
    }

    /// Status the motion moves to after a vote produced `tally`, if any.
    /// Only a reached majority closes a motion automatically.
    pub fn resolution_for(&self, tally: &Tally) -> Option<MotionStatus> {
        if self.is_active() && self.evaluate(tally).is_passed() {
            Some(MotionStatus::Passed)
        } else {
            None
        }
    }

    /// `expires_at` is advisory; this only reports whether it lies in the past.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at.is_some_and(|at| at <= now)
    }

    /// Human-readable requirement, e.g. `2/3` or `1/2 (unanimous)`.
    pub fn requirement(&self) -> String {
        if self.unanimous {
            format!("{} (unanimous)", self.majority)
        } else {
            self.majority.to_string()
        }
    }
}

/// Input for creating a motion; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMotion {
    pub council_id: i64,
    pub author_id: i64,
    pub text: String,
    pub majority: Majority,
    pub unanimous: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Yes,
    No,
    Abstain,
}

impl VoteChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteChoice::Yes => "yes",
            VoteChoice::No => "no",
            VoteChoice::Abstain => "abstain",
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteChoice {
    type Err = DomainError;

    /// Case-insensitive: "Yes", "NO", "abstain".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(VoteChoice::Yes),
            "no" => Ok(VoteChoice::No),
            "abstain" => Ok(VoteChoice::Abstain),
            other => Err(DomainError::Repo(format!("unknown vote choice '{}'", other))),
        }
    }
}

/// One voter's position on one motion. Weight is captured at cast time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub motion_id: i64,
    pub voter_id: i64,
    pub choice: VoteChoice,
    pub reason: Option<String>,
    pub weight: u64,
    pub cast_at: DateTime<Utc>,
}

/// Result of a successful cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub motion_id: i64,
    pub tally: Tally,
    pub status: MotionStatus,
    /// The voter already had a vote on this motion and it was replaced.
    pub replaced_previous: bool,
}

impl VoteOutcome {
    pub fn closed_motion(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Archived motion with its final (or current) tally and every stored vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MotionRecord {
    #[serde(flatten)]
    pub motion: Motion,
    pub tally: Tally,
    pub votes: Vec<Vote>,
}
