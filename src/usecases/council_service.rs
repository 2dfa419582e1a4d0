//! Council management use case: registry, weight map, per-council configuration.

use crate::domain::{
    Council, DomainError, Majority, Motion, MotionStatus, Tally, WeightAssignment, WeightTarget,
};
use crate::ports::{Clock, ConfigRepo, CouncilRepo, MotionStore, WeightRepo};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Config key: votes must carry a non-empty reason (bool).
pub const REASON_REQUIRED_KEY: &str = "reason.required";
/// Config key: majority used when a proposal names none (string, e.g. "2/3").
pub const MAJORITY_DEFAULT_KEY: &str = "majority.default";

/// Motion counts of one council by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: usize,
    pub passed: usize,
    pub failed: usize,
    pub killed: usize,
    pub expired: usize,
}

impl StatusCounts {
    fn bump(&mut self, status: MotionStatus) {
        let slot = match status {
            MotionStatus::Active => &mut self.active,
            MotionStatus::Passed => &mut self.passed,
            MotionStatus::Failed => &mut self.failed,
            MotionStatus::Killed => &mut self.killed,
            MotionStatus::Expired => &mut self.expired,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.active + self.passed + self.failed + self.killed + self.expired
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouncilStats {
    pub council: Council,
    pub active: Option<(Motion, Tally)>,
    pub counts: StatusCounts,
}

pub struct CouncilService {
    councils: Arc<dyn CouncilRepo>,
    weights: Arc<dyn WeightRepo>,
    configs: Arc<dyn ConfigRepo>,
    motions: Arc<dyn MotionStore>,
    clock: Arc<dyn Clock>,
}

impl CouncilService {
    pub fn new(
        councils: Arc<dyn CouncilRepo>,
        weights: Arc<dyn WeightRepo>,
        configs: Arc<dyn ConfigRepo>,
        motions: Arc<dyn MotionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            councils,
            weights,
            configs,
            motions,
            clock,
        }
    }

    /// Bind a council to `channel_id`, or rename the one already bound there.
    pub async fn create_or_rename(
        &self,
        guild_id: i64,
        channel_id: i64,
        name: &str,
    ) -> Result<Council, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Config("council name cannot be empty".into()));
        }
        let council = self.councils.upsert_council(guild_id, channel_id, name).await?;
        info!(council_id = council.id, channel_id, name = %council.name, "council saved");
        Ok(council)
    }

    /// Remove the council of `channel_id`. Its active motion, if any, is killed.
    pub async fn remove(&self, channel_id: i64) -> Result<Council, DomainError> {
        let council = self
            .councils
            .remove_council(channel_id, self.clock.now())
            .await?
            .ok_or_else(|| DomainError::CouncilNotFound(format!("channel {}", channel_id)))?;
        info!(council_id = council.id, channel_id, "council removed");
        Ok(council)
    }

    pub async fn by_channel(&self, channel_id: i64) -> Result<Council, DomainError> {
        self.councils
            .council_by_channel(channel_id)
            .await?
            .ok_or_else(|| DomainError::CouncilNotFound(format!("channel {}", channel_id)))
    }

    pub async fn by_id(&self, council_id: i64) -> Result<Council, DomainError> {
        self.councils
            .council_by_id(council_id)
            .await?
            .ok_or_else(|| DomainError::CouncilNotFound(format!("council {}", council_id)))
    }

    pub async fn list(&self) -> Result<Vec<Council>, DomainError> {
        self.councils.list_councils().await
    }

    pub async fn stats(&self, council_id: i64) -> Result<CouncilStats, DomainError> {
        let council = self.by_id(council_id).await?;
        let motions = self.motions.motions_for_council(council_id).await?;

        let mut counts = StatusCounts::default();
        for m in &motions {
            counts.bump(m.status);
        }

        let active = match motions.into_iter().find(Motion::is_active) {
            Some(m) => {
                let tally = self.motions.tally(m.id).await?;
                Some((m, tally))
            }
            None => None,
        };

        Ok(CouncilStats {
            council,
            active,
            counts,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Weights
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn set_weight(
        &self,
        council_id: i64,
        target: WeightTarget,
        weight: u64,
    ) -> Result<WeightAssignment, DomainError> {
        if weight == 0 {
            return Err(DomainError::InvalidWeight(weight));
        }
        self.by_id(council_id).await?;
        let assignment = WeightAssignment {
            council_id,
            target,
            weight,
        };
        self.weights.set_weight(&assignment).await?;
        info!(council_id, target = %target, weight, "weight assigned");
        Ok(assignment)
    }

    pub async fn remove_weight(
        &self,
        council_id: i64,
        target: WeightTarget,
    ) -> Result<bool, DomainError> {
        let removed = self.weights.remove_weight(council_id, target).await?;
        if removed {
            info!(council_id, target = %target, "weight removed");
        }
        Ok(removed)
    }

    pub async fn weights(&self, council_id: i64) -> Result<Vec<WeightAssignment>, DomainError> {
        self.weights.weights(council_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a JSON value under `key`. Known keys are type-checked.
    pub async fn set_config(&self, council_id: i64, key: &str, value: Value) -> Result<(), DomainError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(DomainError::Config("config key cannot be empty".into()));
        }
        match key {
            REASON_REQUIRED_KEY if !value.is_boolean() => {
                return Err(DomainError::Config(format!("{} expects true or false", key)));
            }
            MAJORITY_DEFAULT_KEY => {
                let spec = value
                    .as_str()
                    .ok_or_else(|| DomainError::Config(format!("{} expects a string", key)))?;
                Majority::parse(spec)?;
            }
            _ => {}
        }
        self.by_id(council_id).await?;
        self.configs.set_config(council_id, key, &value).await?;
        info!(council_id, key, value = %value, "config set");
        Ok(())
    }

    pub async fn unset_config(&self, council_id: i64, key: &str) -> Result<bool, DomainError> {
        self.configs.unset_config(council_id, key.trim()).await
    }

    pub async fn get_config(&self, council_id: i64, key: &str) -> Result<Option<Value>, DomainError> {
        self.configs.get_config(council_id, key.trim()).await
    }

    pub async fn configs(&self, council_id: i64) -> Result<BTreeMap<String, Value>, DomainError> {
        self.configs.all_configs(council_id).await
    }

    pub async fn reason_required(&self, council_id: i64) -> Result<bool, DomainError> {
        Ok(self
            .get_config(council_id, REASON_REQUIRED_KEY)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    pub async fn default_majority(&self, council_id: i64) -> Result<Option<String>, DomainError> {
        Ok(self
            .get_config(council_id, MAJORITY_DEFAULT_KEY)
            .await?
            .and_then(|v| v.as_str().map(String::from)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::persistence::MemoryRepo;
    use crate::domain::NewMotion;
    use chrono::Utc;
    use serde_json::json;

    fn service() -> (Arc<MemoryRepo>, CouncilService) {
        let repo = Arc::new(MemoryRepo::new());
        let service = CouncilService::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            repo.clone(),
            Arc::new(ManualClock::new(Utc::now())),
        );
        (repo, service)
    }

    fn new_motion(council_id: i64) -> NewMotion {
        NewMotion {
            council_id,
            author_id: 1,
            text: "Adopt rules".into(),
            majority: Majority::SIMPLE,
            unanimous: false,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_rename_keeps_id() {
        let (_, svc) = service();
        let a = svc.create_or_rename(1, 50, "Senate").await.unwrap();
        let b = svc.create_or_rename(1, 50, " Upper House ").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.name, "Upper House");
        assert_eq!(svc.list().await.unwrap().len(), 1);
        assert!(svc.create_or_rename(1, 51, "  ").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_unknown_channel() {
        let (_, svc) = service();
        assert!(matches!(
            svc.remove(404).await,
            Err(DomainError::CouncilNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_by_channel_sees_latest_name() {
        let (_, svc) = service();
        let picked = svc.create_or_rename(1, 52, "Senate").await.unwrap();
        svc.create_or_rename(1, 52, "Assembly").await.unwrap();

        let fresh = svc.by_channel(picked.channel_id).await.unwrap();
        assert_eq!(fresh.id, picked.id);
        assert_eq!(fresh.name, "Assembly");

        svc.remove(52).await.unwrap();
        assert!(matches!(
            svc.by_channel(52).await,
            Err(DomainError::CouncilNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_kills_active_motion() {
        let (repo, svc) = service();
        let council = svc.create_or_rename(1, 50, "Senate").await.unwrap();
        let motion = repo.insert_motion(&new_motion(council.id)).await.unwrap();
        svc.remove(50).await.unwrap();

        let after = repo.motion(motion.id).await.unwrap().unwrap();
        assert_eq!(after.status, MotionStatus::Killed);
        assert!(svc.by_channel(50).await.is_err());
    }

    #[tokio::test]
    async fn test_weights_validated_and_listed() {
        let (_, svc) = service();
        let council = svc.create_or_rename(1, 50, "Senate").await.unwrap();
        assert!(matches!(
            svc.set_weight(council.id, WeightTarget::Member(3), 0).await,
            Err(DomainError::InvalidWeight(0))
        ));
        assert!(matches!(
            svc.set_weight(999, WeightTarget::Member(3), 2).await,
            Err(DomainError::CouncilNotFound(_))
        ));
        svc.set_weight(council.id, WeightTarget::Member(3), 2).await.unwrap();
        svc.set_weight(council.id, WeightTarget::Member(3), 5).await.unwrap();
        svc.set_weight(council.id, WeightTarget::Group(9), 4).await.unwrap();
        let weights = svc.weights(council.id).await.unwrap();
        assert_eq!(weights.len(), 2);
        assert!(weights.iter().any(|w| w.target == WeightTarget::Member(3) && w.weight == 5));

        assert!(svc.remove_weight(council.id, WeightTarget::Group(9)).await.unwrap());
        assert!(!svc.remove_weight(council.id, WeightTarget::Group(9)).await.unwrap());
    }

    #[tokio::test]
    async fn test_known_config_keys_are_typed() {
        let (_, svc) = service();
        let council = svc.create_or_rename(1, 50, "Senate").await.unwrap();

        assert!(!svc.reason_required(council.id).await.unwrap());
        assert!(svc.set_config(council.id, REASON_REQUIRED_KEY, json!("yes")).await.is_err());
        svc.set_config(council.id, REASON_REQUIRED_KEY, json!(true)).await.unwrap();
        assert!(svc.reason_required(council.id).await.unwrap());

        assert!(matches!(
            svc.set_config(council.id, MAJORITY_DEFAULT_KEY, json!("1/0")).await,
            Err(DomainError::InvalidSpecification(_))
        ));
        svc.set_config(council.id, MAJORITY_DEFAULT_KEY, json!("2/3")).await.unwrap();
        assert_eq!(svc.default_majority(council.id).await.unwrap().as_deref(), Some("2/3"));

        svc.set_config(council.id, "motd", json!({"text": "hi"})).await.unwrap();
        assert_eq!(svc.configs(council.id).await.unwrap().len(), 3);
        assert!(svc.unset_config(council.id, "motd").await.unwrap());
        assert_eq!(svc.get_config(council.id, "motd").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let (repo, svc) = service();
        let council = svc.create_or_rename(1, 50, "Senate").await.unwrap();
        let first = repo.insert_motion(&new_motion(council.id)).await.unwrap();
        repo.close_motion(first.id, MotionStatus::Killed, Utc::now())
            .await
            .unwrap();
        let second = repo.insert_motion(&new_motion(council.id)).await.unwrap();

        let stats = svc.stats(council.id).await.unwrap();
        assert_eq!(stats.counts.killed, 1);
        assert_eq!(stats.counts.active, 1);
        assert_eq!(stats.counts.total(), 2);
        let (active, tally) = stats.active.unwrap();
        assert_eq!(active.id, second.id);
        assert_eq!(tally, Tally::default());
    }
}
