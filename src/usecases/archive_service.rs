//! Archive use case: dump every motion of a council with its tally and votes.

use crate::adapters::export::{records_to_csv, records_to_json};
use crate::domain::{DomainError, MotionRecord};
use crate::ports::{Clock, CouncilRepo, MotionStore};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Json,
    Csv,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Json => "json",
            ArchiveFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ArchiveFormat::Json),
            "csv" => Ok(ArchiveFormat::Csv),
            other => Err(DomainError::Export(format!("unknown archive format '{}'", other))),
        }
    }
}

pub struct ArchiveService {
    councils: Arc<dyn CouncilRepo>,
    motions: Arc<dyn MotionStore>,
    clock: Arc<dyn Clock>,
    archive_dir: PathBuf,
}

impl ArchiveService {
    pub fn new(
        councils: Arc<dyn CouncilRepo>,
        motions: Arc<dyn MotionStore>,
        clock: Arc<dyn Clock>,
        archive_dir: PathBuf,
    ) -> Self {
        Self {
            councils,
            motions,
            clock,
            archive_dir,
        }
    }

    /// All motions of the council, oldest first, with tallies and votes.
    pub async fn records(&self, council_id: i64) -> Result<Vec<MotionRecord>, DomainError> {
        let motions = self.motions.motions_for_council(council_id).await?;
        let mut records = Vec::with_capacity(motions.len());
        for motion in motions {
            let votes = self.motions.votes(motion.id).await?;
            let tally = self.motions.tally(motion.id).await?;
            records.push(MotionRecord {
                motion,
                tally,
                votes,
            });
        }
        Ok(records)
    }

    /// Render the council's archive in `format` without touching the disk.
    pub async fn render(&self, council_id: i64, format: ArchiveFormat) -> Result<String, DomainError> {
        let records = self.records(council_id).await?;
        match format {
            ArchiveFormat::Json => {
                records_to_json(&records).map_err(|e| DomainError::Export(e.to_string()))
            }
            ArchiveFormat::Csv => {
                records_to_csv(&records).map_err(|e| DomainError::Export(e.to_string()))
            }
        }
    }

    /// Write the archive under the archive directory and return its path.
    pub async fn export(&self, council_id: i64, format: ArchiveFormat) -> Result<PathBuf, DomainError> {
        let council = self
            .councils
            .council_by_id(council_id)
            .await?
            .ok_or_else(|| DomainError::CouncilNotFound(format!("council {}", council_id)))?;
        let body = self.render(council.id, format).await?;

        tokio::fs::create_dir_all(&self.archive_dir)
            .await
            .map_err(|e| DomainError::Export(e.to_string()))?;
        let file_name = format!(
            "council-{}-{}.{}",
            council.id,
            self.clock.now().format("%Y%m%dT%H%M%SZ"),
            format.extension()
        );
        let path = self.archive_dir.join(file_name);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| DomainError::Export(e.to_string()))?;

        info!(council_id = council.id, path = %path.display(), %format, "archive written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::persistence::MemoryRepo;
    use crate::domain::{Majority, MotionStatus, NewMotion, Vote, VoteChoice};
    use chrono::{TimeZone, Utc};

    async fn seeded(dir: &tempfile::TempDir) -> (ArchiveService, i64) {
        let repo = Arc::new(MemoryRepo::new());
        let now = Utc.with_ymd_and_hms(2024, 5, 4, 10, 30, 0).unwrap();
        let council = repo.upsert_council(1, 77, "Guild").await.unwrap();
        let motion = repo
            .insert_motion(&NewMotion {
                council_id: council.id,
                author_id: 1,
                text: "Rename the channel".into(),
                majority: Majority::new(2, 3).unwrap(),
                unanimous: false,
                created_at: now,
                expires_at: None,
            })
            .await
            .unwrap();
        repo.record_vote(&Vote {
            motion_id: motion.id,
            voter_id: 2,
            choice: VoteChoice::Yes,
            reason: Some("finally".into()),
            weight: 1,
            cast_at: now,
        })
        .await
        .unwrap();
        let service = ArchiveService::new(
            repo.clone(),
            repo,
            Arc::new(ManualClock::new(now)),
            dir.path().join("archives"),
        );
        (service, council.id)
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Csv);
        assert_eq!("json".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Json);
        assert!("xml".parse::<ArchiveFormat>().is_err());
    }

    #[tokio::test]
    async fn test_records_include_tally_and_votes() {
        let dir = tempfile::tempdir().unwrap();
        let (service, council_id) = seeded(&dir).await;
        let records = service.records(council_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].motion.status, MotionStatus::Passed);
        assert_eq!(records[0].tally.yes, 1);
        assert_eq!(records[0].votes.len(), 1);
    }

    #[tokio::test]
    async fn test_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let (service, council_id) = seeded(&dir).await;

        let path = service.export(council_id, ArchiveFormat::Csv).await.unwrap();
        assert!(path.ends_with(format!("council-{}-20240504T103000Z.csv", council_id)));
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("finally"));

        let path = service.export(council_id, ArchiveFormat::Json).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value[0]["text"], "Rename the channel");
    }

    #[tokio::test]
    async fn test_export_unknown_council() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = seeded(&dir).await;
        assert!(matches!(
            service.export(999, ArchiveFormat::Json).await,
            Err(DomainError::CouncilNotFound(_))
        ));
    }
}
