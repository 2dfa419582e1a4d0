//! In-memory repository. Implements every persistence port behind one async mutex.
//!
//! Used when `storage = "memory"` and by the use-case tests. Each port call
//! holds the mutex for its whole read-modify-write, which makes every call atomic.

use crate::domain::{
    Council, DomainError, Motion, MotionStatus, NewMotion, Tally, Vote, VoteOutcome,
    WeightAssignment, WeightTarget, effective_weight,
};
use crate::ports::{ConfigRepo, CouncilRepo, MotionStore, WeightRepo, WeightResolver};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    next_council_id: i64,
    next_motion_id: i64,
    councils: BTreeMap<i64, Council>,
    weights: Vec<WeightAssignment>,
    configs: BTreeMap<(i64, String), Value>,
    motions: BTreeMap<i64, Motion>,
    /// (motion_id, voter_id) -> latest vote
    votes: BTreeMap<(i64, i64), Vote>,
}

impl MemoryState {
    fn motion_votes(&self, motion_id: i64) -> impl Iterator<Item = &Vote> {
        self.votes
            .range((motion_id, i64::MIN)..=(motion_id, i64::MAX))
            .map(|(_, v)| v)
    }

    fn active_motion_id(&self, council_id: i64) -> Option<i64> {
        self.motions
            .values()
            .find(|m| m.council_id == council_id && m.is_active())
            .map(|m| m.id)
    }
}

/// Process-local storage; contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryRepo {
    state: Mutex<MemoryState>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CouncilRepo for MemoryRepo {
    async fn upsert_council(
        &self,
        guild_id: i64,
        channel_id: i64,
        name: &str,
    ) -> Result<Council, DomainError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .councils
            .values_mut()
            .find(|c| c.channel_id == channel_id)
        {
            existing.name = name.to_string();
            existing.guild_id = guild_id;
            return Ok(existing.clone());
        }
        state.next_council_id += 1;
        let council = Council {
            id: state.next_council_id,
            guild_id,
            channel_id,
            name: name.to_string(),
        };
        state.councils.insert(council.id, council.clone());
        Ok(council)
    }

    async fn council_by_channel(&self, channel_id: i64) -> Result<Option<Council>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .councils
            .values()
            .find(|c| c.channel_id == channel_id)
            .cloned())
    }

    async fn council_by_id(&self, council_id: i64) -> Result<Option<Council>, DomainError> {
        Ok(self.state.lock().await.councils.get(&council_id).cloned())
    }

    async fn list_councils(&self) -> Result<Vec<Council>, DomainError> {
        Ok(self.state.lock().await.councils.values().cloned().collect())
    }

    async fn remove_council(
        &self,
        channel_id: i64,
        closed_at: DateTime<Utc>,
    ) -> Result<Option<Council>, DomainError> {
        let mut state = self.state.lock().await;
        let Some(council_id) = state
            .councils
            .values()
            .find(|c| c.channel_id == channel_id)
            .map(|c| c.id)
        else {
            return Ok(None);
        };
        let removed = state.councils.remove(&council_id);
        state.weights.retain(|w| w.council_id != council_id);
        state.configs.retain(|(id, _), _| *id != council_id);
        if let Some(active_id) = state.active_motion_id(council_id) {
            if let Some(motion) = state.motions.get_mut(&active_id) {
                motion.status = MotionStatus::Killed;
                motion.closed_at = Some(closed_at);
            }
        }
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl WeightRepo for MemoryRepo {
    async fn set_weight(&self, assignment: &WeightAssignment) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        match state
            .weights
            .iter_mut()
            .find(|w| w.council_id == assignment.council_id && w.target == assignment.target)
        {
            Some(existing) => existing.weight = assignment.weight,
            None => state.weights.push(assignment.clone()),
        }
        Ok(())
    }

    async fn remove_weight(&self, council_id: i64, target: WeightTarget) -> Result<bool, DomainError> {
        let mut state = self.state.lock().await;
        let before = state.weights.len();
        state
            .weights
            .retain(|w| !(w.council_id == council_id && w.target == target));
        Ok(state.weights.len() != before)
    }

    async fn weights(&self, council_id: i64) -> Result<Vec<WeightAssignment>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .weights
            .iter()
            .filter(|w| w.council_id == council_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl WeightResolver for MemoryRepo {
    async fn resolve_weight(
        &self,
        council_id: i64,
        voter_id: i64,
        group_ids: &[i64],
    ) -> Result<u64, DomainError> {
        let assignments = self.weights(council_id).await?;
        effective_weight(&assignments, voter_id, group_ids)
    }
}

#[async_trait::async_trait]
impl ConfigRepo for MemoryRepo {
    async fn set_config(&self, council_id: i64, key: &str, value: &Value) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        state
            .configs
            .insert((council_id, key.to_string()), value.clone());
        Ok(())
    }

    async fn unset_config(&self, council_id: i64, key: &str) -> Result<bool, DomainError> {
        let mut state = self.state.lock().await;
        Ok(state
            .configs
            .remove(&(council_id, key.to_string()))
            .is_some())
    }

    async fn get_config(&self, council_id: i64, key: &str) -> Result<Option<Value>, DomainError> {
        let state = self.state.lock().await;
        Ok(state.configs.get(&(council_id, key.to_string())).cloned())
    }

    async fn all_configs(&self, council_id: i64) -> Result<BTreeMap<String, Value>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .configs
            .iter()
            .filter(|((id, _), _)| *id == council_id)
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[async_trait::async_trait]
impl MotionStore for MemoryRepo {
    async fn insert_motion(&self, new: &NewMotion) -> Result<Motion, DomainError> {
        let mut state = self.state.lock().await;
        if let Some(motion_id) = state.active_motion_id(new.council_id) {
            return Err(DomainError::MotionAlreadyActive {
                council_id: new.council_id,
                motion_id,
            });
        }
        state.next_motion_id += 1;
        let motion = Motion {
            id: state.next_motion_id,
            council_id: new.council_id,
            author_id: new.author_id,
            text: new.text.clone(),
            majority: new.majority,
            unanimous: new.unanimous,
            status: MotionStatus::Active,
            created_at: new.created_at,
            closed_at: None,
            expires_at: new.expires_at,
        };
        state.motions.insert(motion.id, motion.clone());
        Ok(motion)
    }

    async fn motion(&self, motion_id: i64) -> Result<Option<Motion>, DomainError> {
        Ok(self.state.lock().await.motions.get(&motion_id).cloned())
    }

    async fn active_motion(&self, council_id: i64) -> Result<Option<Motion>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .active_motion_id(council_id)
            .and_then(|id| state.motions.get(&id).cloned()))
    }

    async fn motions_for_council(&self, council_id: i64) -> Result<Vec<Motion>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .motions
            .values()
            .filter(|m| m.council_id == council_id)
            .cloned()
            .collect())
    }

    async fn record_vote(&self, vote: &Vote) -> Result<VoteOutcome, DomainError> {
        let mut state = self.state.lock().await;
        let motion = state
            .motions
            .get(&vote.motion_id)
            .cloned()
            .ok_or(DomainError::MotionNotFound(vote.motion_id))?;
        motion.ensure_active()?;

        let key = (vote.motion_id, vote.voter_id);
        let previous = state.votes.insert(key, vote.clone());
        let recount = Tally::from_votes(state.motion_votes(vote.motion_id));
        let tally = match recount {
            Ok(tally) => tally,
            Err(e) => {
                match previous {
                    Some(prev) => state.votes.insert(key, prev),
                    None => state.votes.remove(&key),
                };
                return Err(e);
            }
        };
        let replaced_previous = previous.is_some();

        let mut status = motion.status;
        if let Some(resolved) = motion.resolution_for(&tally) {
            if let Some(stored) = state.motions.get_mut(&vote.motion_id) {
                stored.status = resolved;
                stored.closed_at = Some(vote.cast_at);
            }
            status = resolved;
        }

        Ok(VoteOutcome {
            motion_id: vote.motion_id,
            tally,
            status,
            replaced_previous,
        })
    }

    async fn close_motion(
        &self,
        motion_id: i64,
        status: MotionStatus,
        closed_at: DateTime<Utc>,
    ) -> Result<Motion, DomainError> {
        let mut state = self.state.lock().await;
        let motion = state
            .motions
            .get_mut(&motion_id)
            .ok_or(DomainError::MotionNotFound(motion_id))?;
        motion.ensure_active()?;
        motion.status = status;
        motion.closed_at = Some(closed_at);
        Ok(motion.clone())
    }

    async fn votes(&self, motion_id: i64) -> Result<Vec<Vote>, DomainError> {
        let state = self.state.lock().await;
        Ok(state.motion_votes(motion_id).cloned().collect())
    }

    async fn tally(&self, motion_id: i64) -> Result<Tally, DomainError> {
        let state = self.state.lock().await;
        Tally::from_votes(state.motion_votes(motion_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Majority, VoteChoice};

    fn new_motion(council_id: i64) -> NewMotion {
        NewMotion {
            council_id,
            author_id: 1,
            text: "Buy a new gavel".into(),
            majority: Majority::SIMPLE,
            unanimous: false,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    fn vote(motion_id: i64, voter_id: i64, choice: VoteChoice, weight: u64) -> Vote {
        Vote {
            motion_id,
            voter_id,
            choice,
            reason: None,
            weight,
            cast_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_motion_rejects_second_active() {
        let repo = MemoryRepo::new();
        let first = repo.insert_motion(&new_motion(1)).await.unwrap();
        let err = repo.insert_motion(&new_motion(1)).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::MotionAlreadyActive { council_id: 1, motion_id } if motion_id == first.id
        ));
        // Other councils are unaffected.
        repo.insert_motion(&new_motion(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_vote_replaces_previous() {
        let repo = MemoryRepo::new();
        let m = repo
            .insert_motion(&NewMotion {
                majority: Majority::new(3, 4).unwrap(),
                ..new_motion(1)
            })
            .await
            .unwrap();
        let first = repo.record_vote(&vote(m.id, 9, VoteChoice::No, 1)).await.unwrap();
        assert!(!first.replaced_previous);
        let second = repo.record_vote(&vote(m.id, 9, VoteChoice::Abstain, 4)).await.unwrap();
        assert!(second.replaced_previous);
        assert_eq!(second.tally, Tally::new(0, 0, 4));
        assert_eq!(repo.votes(m.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overflowing_vote_is_not_stored() {
        let repo = MemoryRepo::new();
        let m = repo
            .insert_motion(&NewMotion {
                majority: Majority::new(3, 4).unwrap(),
                ..new_motion(1)
            })
            .await
            .unwrap();
        repo.record_vote(&vote(m.id, 8, VoteChoice::No, 1)).await.unwrap();
        repo.record_vote(&vote(m.id, 9, VoteChoice::No, u64::MAX - 1))
            .await
            .unwrap();

        assert!(matches!(
            repo.record_vote(&vote(m.id, 8, VoteChoice::No, 2)).await,
            Err(DomainError::InvalidWeight(_))
        ));
        assert!(matches!(
            repo.record_vote(&vote(m.id, 10, VoteChoice::No, 1)).await,
            Err(DomainError::InvalidWeight(_))
        ));
        assert_eq!(repo.tally(m.id).await.unwrap(), Tally::new(0, u64::MAX, 0));
        assert_eq!(repo.votes(m.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_council_kills_active_motion() {
        let repo = MemoryRepo::new();
        let council = repo.upsert_council(1, 100, "Small Council").await.unwrap();
        let m = repo.insert_motion(&new_motion(council.id)).await.unwrap();
        repo.set_config(council.id, "reason.required", &Value::Bool(true))
            .await
            .unwrap();

        let removed = repo.remove_council(100, Utc::now()).await.unwrap();
        assert_eq!(removed.map(|c| c.id), Some(council.id));
        assert!(repo.council_by_channel(100).await.unwrap().is_none());
        assert!(repo.all_configs(council.id).await.unwrap().is_empty());

        let orphan = repo.motion(m.id).await.unwrap().unwrap();
        assert_eq!(orphan.status, MotionStatus::Killed);
        assert!(matches!(
            repo.record_vote(&vote(m.id, 2, VoteChoice::Yes, 1)).await,
            Err(DomainError::MotionClosed { .. })
        ));
    }
}
