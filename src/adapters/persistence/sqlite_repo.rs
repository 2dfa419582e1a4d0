//! SQLite-backed repository via libsql. Implements every persistence port.
//!
//! One database file holds councils, weight assignments, council configuration,
//! motions and votes. State transitions run inside IMMEDIATE transactions and
//! are conditional on `status = 'active'`; a partial unique index keeps at most
//! one active motion per council even if a writer bypasses the motion service.

use crate::domain::{
    Council, DomainError, Majority, Motion, MotionStatus, NewMotion, Tally, Vote, VoteChoice,
    VoteOutcome, WeightAssignment, WeightTarget, effective_weight,
};
use crate::ports::{ConfigRepo, CouncilRepo, MotionStore, WeightRepo, WeightResolver};
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, Row, TransactionBehavior, params};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const COUNCILS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS councils (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guild_id INTEGER NOT NULL,
    channel_id INTEGER NOT NULL UNIQUE,
    name TEXT NOT NULL
)"#;

const WEIGHTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS weight_assignments (
    council_id INTEGER NOT NULL,
    target_kind TEXT NOT NULL CHECK (target_kind IN ('member', 'group')),
    target_id INTEGER NOT NULL,
    weight INTEGER NOT NULL CHECK (weight >= 1),
    PRIMARY KEY (council_id, target_kind, target_id)
)"#;

const CONFIGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS council_configs (
    council_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (council_id, key)
)"#;

const MOTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS motions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    council_id INTEGER NOT NULL,
    author_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    majority_num INTEGER NOT NULL,
    majority_den INTEGER NOT NULL CHECK (majority_den > 0),
    unanimous INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    closed_at TEXT,
    expires_at TEXT
)"#;

/// At most one active motion per council.
const MOTIONS_ONE_ACTIVE_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_motions_one_active ON motions (council_id) WHERE status = 'active'";
const MOTIONS_COUNCIL_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_motions_council ON motions (council_id, id)";

const VOTES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS votes (
    motion_id INTEGER NOT NULL,
    voter_id INTEGER NOT NULL,
    choice TEXT NOT NULL CHECK (choice IN ('yes', 'no', 'abstain')),
    reason TEXT,
    weight INTEGER NOT NULL CHECK (weight >= 1),
    cast_at TEXT NOT NULL,
    PRIMARY KEY (motion_id, voter_id)
)"#;

const MOTION_COLUMNS: &str = "id, council_id, author_id, text, majority_num, majority_den, unanimous, status, created_at, closed_at, expires_at";

/// SQLite repository. Safe to share via Arc; each call opens its own connection.
pub struct SqliteRepo {
    db: Database,
    db_path: PathBuf,
    busy_timeout_ms: u64,
}

impl SqliteRepo {
    /// Connect to (or create) the database file and ensure the schema exists.
    /// Call this once at startup.
    ///
    /// Sets WAL mode and synchronous=NORMAL so readers do not block the writer.
    pub async fn connect(
        db_path: impl AsRef<Path>,
        busy_timeout_ms: u64,
    ) -> Result<Self, DomainError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DomainError::Repo(e.to_string()))?;
        }
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(repo_err)?;
        let repo = Self {
            db,
            db_path,
            busy_timeout_ms,
        };

        let conn = repo.conn().await?;
        // PRAGMA returns a row (new value); use query and consume rows (execute fails when rows are returned).
        pragma(&conn, "PRAGMA journal_mode=WAL").await?;
        pragma(&conn, "PRAGMA synchronous=NORMAL").await?;

        for ddl in [
            COUNCILS_TABLE,
            WEIGHTS_TABLE,
            CONFIGS_TABLE,
            MOTIONS_TABLE,
            MOTIONS_ONE_ACTIVE_INDEX,
            MOTIONS_COUNCIL_INDEX,
            VOTES_TABLE,
        ] {
            conn.execute(ddl, ()).await.map_err(repo_err)?;
        }

        info!(
            path = %repo.db_path.display(),
            busy_timeout_ms,
            "SQLite connected with WAL mode"
        );
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Fresh connection with the busy timeout applied; writers queue instead of failing fast.
    async fn conn(&self) -> Result<Connection, DomainError> {
        let conn = self.db.connect().map_err(repo_err)?;
        pragma(&conn, &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms)).await?;
        Ok(conn)
    }

    async fn find_motion(conn: &Connection, motion_id: i64) -> Result<Option<Motion>, DomainError> {
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM motions WHERE id = ?1", MOTION_COLUMNS),
                params![motion_id],
            )
            .await
            .map_err(repo_err)?;
        match rows.next().await.map_err(repo_err)? {
            Some(row) => Ok(Some(motion_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_active_motion(
        conn: &Connection,
        council_id: i64,
    ) -> Result<Option<Motion>, DomainError> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM motions WHERE council_id = ?1 AND status = 'active' ORDER BY id DESC LIMIT 1",
                    MOTION_COLUMNS
                ),
                params![council_id],
            )
            .await
            .map_err(repo_err)?;
        match rows.next().await.map_err(repo_err)? {
            Some(row) => Ok(Some(motion_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_council(
        conn: &Connection,
        column: &str,
        value: i64,
    ) -> Result<Option<Council>, DomainError> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT id, guild_id, channel_id, name FROM councils WHERE {} = ?1",
                    column
                ),
                params![value],
            )
            .await
            .map_err(repo_err)?;
        match rows.next().await.map_err(repo_err)? {
            Some(row) => Ok(Some(council_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn load_votes(conn: &Connection, motion_id: i64) -> Result<Vec<Vote>, DomainError> {
        let mut rows = conn
            .query(
                r#"
                SELECT motion_id, voter_id, choice, reason, weight, cast_at
                FROM votes
                WHERE motion_id = ?1
                ORDER BY cast_at ASC, voter_id ASC
                "#,
                params![motion_id],
            )
            .await
            .map_err(repo_err)?;
        let mut votes = Vec::new();
        while let Some(row) = rows.next().await.map_err(repo_err)? {
            votes.push(vote_from_row(&row)?);
        }
        Ok(votes)
    }
}

#[async_trait::async_trait]
impl CouncilRepo for SqliteRepo {
    async fn upsert_council(
        &self,
        guild_id: i64,
        channel_id: i64,
        name: &str,
    ) -> Result<Council, DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO councils (guild_id, channel_id, name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (channel_id) DO UPDATE SET
                guild_id = excluded.guild_id,
                name = excluded.name
            "#,
            params![guild_id, channel_id, name],
        )
        .await
        .map_err(repo_err)?;
        Self::find_council(&conn, "channel_id", channel_id)
            .await?
            .ok_or_else(|| DomainError::Repo(format!("council for channel {} vanished", channel_id)))
    }

    async fn council_by_channel(&self, channel_id: i64) -> Result<Option<Council>, DomainError> {
        let conn = self.conn().await?;
        Self::find_council(&conn, "channel_id", channel_id).await
    }

    async fn council_by_id(&self, council_id: i64) -> Result<Option<Council>, DomainError> {
        let conn = self.conn().await?;
        Self::find_council(&conn, "id", council_id).await
    }

    async fn list_councils(&self) -> Result<Vec<Council>, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, guild_id, channel_id, name FROM councils ORDER BY id",
                (),
            )
            .await
            .map_err(repo_err)?;
        let mut councils = Vec::new();
        while let Some(row) = rows.next().await.map_err(repo_err)? {
            councils.push(council_from_row(&row)?);
        }
        Ok(councils)
    }

    async fn remove_council(
        &self,
        channel_id: i64,
        closed_at: DateTime<Utc>,
    ) -> Result<Option<Council>, DomainError> {
        let conn = self.conn().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(repo_err)?;
        let Some(council) = Self::find_council(&tx, "channel_id", channel_id).await? else {
            return Ok(None);
        };
        let killed = tx
            .execute(
                "UPDATE motions SET status = 'killed', closed_at = ?1 WHERE council_id = ?2 AND status = 'active'",
                params![ts(&closed_at), council.id],
            )
            .await
            .map_err(repo_err)?;
        tx.execute(
            "DELETE FROM weight_assignments WHERE council_id = ?1",
            params![council.id],
        )
        .await
        .map_err(repo_err)?;
        tx.execute(
            "DELETE FROM council_configs WHERE council_id = ?1",
            params![council.id],
        )
        .await
        .map_err(repo_err)?;
        tx.execute("DELETE FROM councils WHERE id = ?1", params![council.id])
            .await
            .map_err(repo_err)?;
        tx.commit().await.map_err(repo_err)?;
        debug!(council_id = council.id, killed, "council removed");
        Ok(Some(council))
    }
}

#[async_trait::async_trait]
impl WeightRepo for SqliteRepo {
    async fn set_weight(&self, assignment: &WeightAssignment) -> Result<(), DomainError> {
        let weight = i64::try_from(assignment.weight)
            .map_err(|_| DomainError::InvalidWeight(assignment.weight))?;
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO weight_assignments (council_id, target_kind, target_id, weight)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (council_id, target_kind, target_id) DO UPDATE SET
                weight = excluded.weight
            "#,
            params![
                assignment.council_id,
                assignment.target.kind(),
                assignment.target.id(),
                weight
            ],
        )
        .await
        .map_err(repo_err)?;
        Ok(())
    }

    async fn remove_weight(&self, council_id: i64, target: WeightTarget) -> Result<bool, DomainError> {
        let conn = self.conn().await?;
        let removed = conn
            .execute(
                "DELETE FROM weight_assignments WHERE council_id = ?1 AND target_kind = ?2 AND target_id = ?3",
                params![council_id, target.kind(), target.id()],
            )
            .await
            .map_err(repo_err)?;
        Ok(removed > 0)
    }

    async fn weights(&self, council_id: i64) -> Result<Vec<WeightAssignment>, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT target_kind, target_id, weight
                FROM weight_assignments
                WHERE council_id = ?1
                ORDER BY target_kind, target_id
                "#,
                params![council_id],
            )
            .await
            .map_err(repo_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(repo_err)? {
            let kind: String = row.get(0).map_err(repo_err)?;
            let target_id: i64 = row.get(1).map_err(repo_err)?;
            let weight: i64 = row.get(2).map_err(repo_err)?;
            out.push(WeightAssignment {
                council_id,
                target: WeightTarget::from_parts(&kind, target_id)?,
                weight: to_u64(weight)?,
            });
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl WeightResolver for SqliteRepo {
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
impl ConfigRepo for SqliteRepo {
    async fn set_config(&self, council_id: i64, key: &str, value: &Value) -> Result<(), DomainError> {
        let json = serde_json::to_string(value).map_err(|e| DomainError::Repo(e.to_string()))?;
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO council_configs (council_id, key, value) VALUES (?1, ?2, ?3)
            ON CONFLICT (council_id, key) DO UPDATE SET value = excluded.value
            "#,
            params![council_id, key, json],
        )
        .await
        .map_err(repo_err)?;
        Ok(())
    }

    async fn unset_config(&self, council_id: i64, key: &str) -> Result<bool, DomainError> {
        let conn = self.conn().await?;
        let removed = conn
            .execute(
                "DELETE FROM council_configs WHERE council_id = ?1 AND key = ?2",
                params![council_id, key],
            )
            .await
            .map_err(repo_err)?;
        Ok(removed > 0)
    }

    async fn get_config(&self, council_id: i64, key: &str) -> Result<Option<Value>, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT value FROM council_configs WHERE council_id = ?1 AND key = ?2",
                params![council_id, key],
            )
            .await
            .map_err(repo_err)?;
        match rows.next().await.map_err(repo_err)? {
            Some(row) => {
                let raw: String = row.get(0).map_err(repo_err)?;
                let value = serde_json::from_str(&raw).map_err(|e| DomainError::Repo(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn all_configs(&self, council_id: i64) -> Result<BTreeMap<String, Value>, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT key, value FROM council_configs WHERE council_id = ?1",
                params![council_id],
            )
            .await
            .map_err(repo_err)?;
        let mut out = BTreeMap::new();
        while let Some(row) = rows.next().await.map_err(repo_err)? {
            let key: String = row.get(0).map_err(repo_err)?;
            let raw: String = row.get(1).map_err(repo_err)?;
            let value = serde_json::from_str(&raw).map_err(|e| DomainError::Repo(e.to_string()))?;
            out.insert(key, value);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl MotionStore for SqliteRepo {
    async fn insert_motion(&self, new: &NewMotion) -> Result<Motion, DomainError> {
        let conn = self.conn().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(repo_err)?;
        let inserted = tx
            .execute(
                r#"
                INSERT INTO motions (council_id, author_id, text, majority_num, majority_den, unanimous, status, created_at, expires_at)
                SELECT ?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?8
                WHERE NOT EXISTS (
                    SELECT 1 FROM motions WHERE council_id = ?1 AND status = 'active'
                )
                "#,
                params![
                    new.council_id,
                    new.author_id,
                    new.text.as_str(),
                    i64::from(new.majority.numerator),
                    i64::from(new.majority.denominator),
                    i64::from(new.unanimous),
                    ts(&new.created_at),
                    new.expires_at.as_ref().map(ts)
                ],
            )
            .await
            .map_err(repo_err)?;

        if inserted == 0 {
            let existing = Self::find_active_motion(&tx, new.council_id).await?;
            return Err(DomainError::MotionAlreadyActive {
                council_id: new.council_id,
                motion_id: existing.map(|m| m.id).unwrap_or_default(),
            });
        }

        let motion_id = tx.last_insert_rowid();
        let motion = Self::find_motion(&tx, motion_id)
            .await?
            .ok_or(DomainError::MotionNotFound(motion_id))?;
        tx.commit().await.map_err(repo_err)?;
        Ok(motion)
    }

    async fn motion(&self, motion_id: i64) -> Result<Option<Motion>, DomainError> {
        let conn = self.conn().await?;
        Self::find_motion(&conn, motion_id).await
    }

    async fn active_motion(&self, council_id: i64) -> Result<Option<Motion>, DomainError> {
        let conn = self.conn().await?;
        Self::find_active_motion(&conn, council_id).await
    }

    async fn motions_for_council(&self, council_id: i64) -> Result<Vec<Motion>, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM motions WHERE council_id = ?1 ORDER BY id ASC",
                    MOTION_COLUMNS
                ),
                params![council_id],
            )
            .await
            .map_err(repo_err)?;
        let mut motions = Vec::new();
        while let Some(row) = rows.next().await.map_err(repo_err)? {
            motions.push(motion_from_row(&row)?);
        }
        Ok(motions)
    }

    async fn record_vote(&self, vote: &Vote) -> Result<VoteOutcome, DomainError> {
        let weight =
            i64::try_from(vote.weight).map_err(|_| DomainError::InvalidWeight(vote.weight))?;
        let conn = self.conn().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(repo_err)?;

        let motion = Self::find_motion(&tx, vote.motion_id)
            .await?
            .ok_or(DomainError::MotionNotFound(vote.motion_id))?;
        motion.ensure_active()?;

        let mut existing = tx
            .query(
                "SELECT 1 FROM votes WHERE motion_id = ?1 AND voter_id = ?2",
                params![vote.motion_id, vote.voter_id],
            )
            .await
            .map_err(repo_err)?;
        let replaced_previous = existing.next().await.map_err(repo_err)?.is_some();
        drop(existing);

        tx.execute(
            r#"
            INSERT INTO votes (motion_id, voter_id, choice, reason, weight, cast_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (motion_id, voter_id) DO UPDATE SET
                choice = excluded.choice,
                reason = excluded.reason,
                weight = excluded.weight,
                cast_at = excluded.cast_at
            "#,
            params![
                vote.motion_id,
                vote.voter_id,
                vote.choice.as_str(),
                vote.reason.clone(),
                weight,
                ts(&vote.cast_at)
            ],
        )
        .await
        .map_err(repo_err)?;

        let votes = Self::load_votes(&tx, vote.motion_id).await?;
        let tally = Tally::from_votes(&votes)?;

        let mut status = motion.status;
        if let Some(resolved) = motion.resolution_for(&tally) {
            let updated = tx
                .execute(
                    "UPDATE motions SET status = ?1, closed_at = ?2 WHERE id = ?3 AND status = 'active'",
                    params![resolved.as_str(), ts(&vote.cast_at), vote.motion_id],
                )
                .await
                .map_err(repo_err)?;
            if updated != 1 {
                return Err(DomainError::Repo(format!(
                    "motion #{} changed status during vote",
                    vote.motion_id
                )));
            }
            status = resolved;
        }

        tx.commit().await.map_err(repo_err)?;
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
        let conn = self.conn().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(repo_err)?;
        let updated = tx
            .execute(
                "UPDATE motions SET status = ?1, closed_at = ?2 WHERE id = ?3 AND status = 'active'",
                params![status.as_str(), ts(&closed_at), motion_id],
            )
            .await
            .map_err(repo_err)?;
        let motion = Self::find_motion(&tx, motion_id)
            .await?
            .ok_or(DomainError::MotionNotFound(motion_id))?;
        if updated == 0 {
            return Err(DomainError::MotionClosed {
                motion_id,
                status: motion.status,
            });
        }
        tx.commit().await.map_err(repo_err)?;
        Ok(motion)
    }

    async fn votes(&self, motion_id: i64) -> Result<Vec<Vote>, DomainError> {
        let conn = self.conn().await?;
        Self::load_votes(&conn, motion_id).await
    }

    async fn tally(&self, motion_id: i64) -> Result<Tally, DomainError> {
        let conn = self.conn().await?;
        let votes = Self::load_votes(&conn, motion_id).await?;
        Tally::from_votes(&votes)
    }
}

async fn pragma(conn: &Connection, sql: &str) -> Result<(), DomainError> {
    let mut rows = conn
        .query(sql, ())
        .await
        .map_err(|e| DomainError::Repo(format!("{} failed: {}", sql, e)))?;
    while rows.next().await.map_err(repo_err)?.is_some() {}
    Ok(())
}

fn repo_err(e: libsql::Error) -> DomainError {
    DomainError::Repo(e.to_string())
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Repo(format!("bad timestamp '{}': {}", raw, e)))
}

fn to_u64(value: i64) -> Result<u64, DomainError> {
    u64::try_from(value).map_err(|_| DomainError::Repo(format!("negative weight {}", value)))
}

fn to_u32(value: i64) -> Result<u32, DomainError> {
    u32::try_from(value).map_err(|_| DomainError::Repo(format!("majority term out of range: {}", value)))
}

fn council_from_row(row: &Row) -> Result<Council, DomainError> {
    Ok(Council {
        id: row.get(0).map_err(repo_err)?,
        guild_id: row.get(1).map_err(repo_err)?,
        channel_id: row.get(2).map_err(repo_err)?,
        name: row.get(3).map_err(repo_err)?,
    })
}

fn motion_from_row(row: &Row) -> Result<Motion, DomainError> {
    let status: String = row.get(7).map_err(repo_err)?;
    let created_at: String = row.get(8).map_err(repo_err)?;
    let closed_at: Option<String> = row.get(9).map_err(repo_err)?;
    let expires_at: Option<String> = row.get(10).map_err(repo_err)?;
    let unanimous: i64 = row.get(6).map_err(repo_err)?;
    Ok(Motion {
        id: row.get(0).map_err(repo_err)?,
        council_id: row.get(1).map_err(repo_err)?,
        author_id: row.get(2).map_err(repo_err)?,
        text: row.get(3).map_err(repo_err)?,
        majority: Majority::new(
            to_u32(row.get(4).map_err(repo_err)?)?,
            to_u32(row.get(5).map_err(repo_err)?)?,
        )?,
        unanimous: unanimous != 0,
        status: status.parse()?,
        created_at: parse_ts(&created_at)?,
        closed_at: closed_at.as_deref().map(parse_ts).transpose()?,
        expires_at: expires_at.as_deref().map(parse_ts).transpose()?,
    })
}

fn vote_from_row(row: &Row) -> Result<Vote, DomainError> {
    let choice: String = row.get(2).map_err(repo_err)?;
    let weight: i64 = row.get(4).map_err(repo_err)?;
    let cast_at: String = row.get(5).map_err(repo_err)?;
    Ok(Vote {
        motion_id: row.get(0).map_err(repo_err)?,
        voter_id: row.get(1).map_err(repo_err)?,
        choice: choice.parse::<VoteChoice>()?,
        reason: row.get(3).map_err(repo_err)?,
        weight: to_u64(weight)?,
        cast_at: parse_ts(&cast_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::config::DEFAULT_BUSY_TIMEOUT_MS;
    use std::sync::Arc;

    async fn repo(dir: &tempfile::TempDir) -> SqliteRepo {
        SqliteRepo::connect(dir.path().join("votum.db"), DEFAULT_BUSY_TIMEOUT_MS)
            .await
            .unwrap()
    }

    fn new_motion(council_id: i64, majority: Majority, unanimous: bool) -> NewMotion {
        NewMotion {
            council_id,
            author_id: 42,
            text: "Test motion".into(),
            majority,
            unanimous,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    fn vote(motion_id: i64, voter_id: i64, choice: VoteChoice, weight: u64) -> Vote {
        Vote {
            motion_id,
            voter_id,
            choice,
            reason: Some("because".into()),
            weight,
            cast_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_council_create_rename_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let created = repo.upsert_council(1, 10, "Test Council").await.unwrap();
        let renamed = repo.upsert_council(1, 10, "Renamed").await.unwrap();
        assert_eq!(created.id, renamed.id);

        let fetched = repo.council_by_channel(10).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Renamed");
        assert_eq!(repo.council_by_id(created.id).await.unwrap(), Some(fetched));
        assert_eq!(repo.list_councils().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_config_set_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let council = repo.upsert_council(1, 20, "Config Council").await.unwrap();
        let value = serde_json::json!({ "x": 1 });
        repo.set_config(council.id, "test.key", &value).await.unwrap();
        assert_eq!(repo.get_config(council.id, "test.key").await.unwrap(), Some(value));
        assert!(repo.unset_config(council.id, "test.key").await.unwrap());
        assert_eq!(repo.get_config(council.id, "test.key").await.unwrap(), None);
        assert!(!repo.unset_config(council.id, "test.key").await.unwrap());
    }

    #[tokio::test]
    async fn test_weights_overwrite_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let assign = |target, weight| WeightAssignment {
            council_id: 1,
            target,
            weight,
        };
        repo.set_weight(&assign(WeightTarget::Member(5), 2)).await.unwrap();
        repo.set_weight(&assign(WeightTarget::Member(5), 3)).await.unwrap();
        repo.set_weight(&assign(WeightTarget::Group(77), 4)).await.unwrap();
        assert_eq!(repo.weights(1).await.unwrap().len(), 2);

        assert_eq!(repo.resolve_weight(1, 5, &[77]).await.unwrap(), 7);
        assert_eq!(repo.resolve_weight(1, 6, &[]).await.unwrap(), 1);
        assert_eq!(repo.resolve_weight(2, 5, &[77]).await.unwrap(), 1);

        assert!(repo.remove_weight(1, WeightTarget::Group(77)).await.unwrap());
        assert_eq!(repo.resolve_weight(1, 5, &[77]).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_vote_flow_and_majority() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let council = repo.upsert_council(1, 30, "Vote Council").await.unwrap();
        let motion = repo
            .insert_motion(&new_motion(council.id, Majority::new(2, 3).unwrap(), false))
            .await
            .unwrap();

        let first = repo.record_vote(&vote(motion.id, 1, VoteChoice::Yes, 1)).await.unwrap();
        assert_eq!(first.status, MotionStatus::Passed);
        assert!(matches!(
            repo.record_vote(&vote(motion.id, 2, VoteChoice::No, 1)).await,
            Err(DomainError::MotionClosed { status: MotionStatus::Passed, .. })
        ));

        let stored = repo.motion(motion.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MotionStatus::Passed);
        assert!(stored.closed_at.is_some());
        assert_eq!(repo.tally(motion.id).await.unwrap(), Tally::new(1, 0, 0));
    }

    #[tokio::test]
    async fn test_vote_upsert_keeps_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let motion = repo
            .insert_motion(&new_motion(1, Majority::SIMPLE, true))
            .await
            .unwrap();
        repo.record_vote(&vote(motion.id, 7, VoteChoice::No, 1)).await.unwrap();
        let outcome = repo.record_vote(&vote(motion.id, 7, VoteChoice::Abstain, 5)).await.unwrap();
        assert!(outcome.replaced_previous);
        assert_eq!(outcome.status, MotionStatus::Active);

        let votes = repo.votes(motion.id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].choice, VoteChoice::Abstain);
        assert_eq!(votes[0].weight, 5);
        assert_eq!(votes[0].reason.as_deref(), Some("because"));
    }

    #[tokio::test]
    async fn test_one_active_motion_per_council() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let first = repo
            .insert_motion(&new_motion(1, Majority::SIMPLE, false))
            .await
            .unwrap();
        match repo.insert_motion(&new_motion(1, Majority::SIMPLE, false)).await {
            Err(DomainError::MotionAlreadyActive { motion_id, .. }) => assert_eq!(motion_id, first.id),
            other => panic!("unexpected {:?}", other),
        }

        let closed = repo
            .close_motion(first.id, MotionStatus::Killed, Utc::now())
            .await
            .unwrap();
        assert_eq!(closed.status, MotionStatus::Killed);
        assert!(matches!(
            repo.close_motion(first.id, MotionStatus::Expired, Utc::now()).await,
            Err(DomainError::MotionClosed { status: MotionStatus::Killed, .. })
        ));
        assert!(matches!(
            repo.close_motion(999, MotionStatus::Killed, Utc::now()).await,
            Err(DomainError::MotionNotFound(999))
        ));

        let second = repo
            .insert_motion(&new_motion(1, Majority::SIMPLE, false))
            .await
            .unwrap();
        assert_eq!(repo.active_motion(1).await.unwrap().map(|m| m.id), Some(second.id));
        assert_eq!(repo.motions_for_council(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_leave_one_active() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(repo(&dir).await);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.insert_motion(&new_motion(3, Majority::SIMPLE, false)).await
            }));
        }
        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(DomainError::MotionAlreadyActive { .. }) => {}
                Err(other) => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_concurrent_votes_pass_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(repo(&dir).await);
        let majority = Majority::new(3, 4).unwrap();
        let motion = repo
            .insert_motion(&new_motion(1, majority, false))
            .await
            .unwrap();
        repo.record_vote(&vote(motion.id, 100, VoteChoice::No, 3)).await.unwrap();

        // 9 yes against 3 no is the first tally that reaches 3/4.
        let mut handles = Vec::new();
        for voter in 1..=12 {
            let repo = Arc::clone(&repo);
            let id = motion.id;
            handles.push(tokio::spawn(async move {
                repo.record_vote(&vote(id, voter, VoteChoice::Yes, 1)).await
            }));
        }

        let (mut passed, mut active, mut closed) = (0, 0, 0);
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) if outcome.status == MotionStatus::Passed => passed += 1,
                Ok(outcome) => {
                    assert_eq!(outcome.status, MotionStatus::Active);
                    active += 1;
                }
                Err(DomainError::MotionClosed { status: MotionStatus::Passed, .. }) => closed += 1,
                Err(other) => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!((passed, active, closed), (1, 8, 3));

        let tally = repo.tally(motion.id).await.unwrap();
        assert_eq!(tally, Tally::new(9, 3, 0));
        assert!(crate::domain::evaluate(&tally, majority, false).is_passed());
        assert_eq!(
            repo.motion(motion.id).await.unwrap().unwrap().status,
            MotionStatus::Passed
        );
    }

    #[tokio::test]
    async fn test_overflowing_vote_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let motion = repo
            .insert_motion(&new_motion(1, Majority::SIMPLE, false))
            .await
            .unwrap();
        let heavy = i64::MAX as u64;
        repo.record_vote(&vote(motion.id, 1, VoteChoice::No, heavy)).await.unwrap();
        repo.record_vote(&vote(motion.id, 2, VoteChoice::No, heavy)).await.unwrap();

        assert!(matches!(
            repo.record_vote(&vote(motion.id, 3, VoteChoice::No, heavy)).await,
            Err(DomainError::InvalidWeight(_))
        ));
        assert_eq!(repo.votes(motion.id).await.unwrap().len(), 2);
        assert_eq!(repo.tally(motion.id).await.unwrap(), Tally::new(0, 2 * heavy, 0));
    }

    #[tokio::test]
    async fn test_remove_council_orphans_motions() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let council = repo.upsert_council(1, 40, "Doomed").await.unwrap();
        let motion = repo
            .insert_motion(&new_motion(council.id, Majority::SIMPLE, false))
            .await
            .unwrap();
        repo.set_weight(&WeightAssignment {
            council_id: council.id,
            target: WeightTarget::Member(1),
            weight: 3,
        })
        .await
        .unwrap();

        assert!(repo.remove_council(40, Utc::now()).await.unwrap().is_some());
        assert!(repo.remove_council(40, Utc::now()).await.unwrap().is_none());
        assert!(repo.weights(council.id).await.unwrap().is_empty());

        let orphan = repo.motion(motion.id).await.unwrap().unwrap();
        assert_eq!(orphan.status, MotionStatus::Killed);
        assert_eq!(repo.motions_for_council(council.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timestamps_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let expires = Utc::now() + chrono::Duration::hours(2);
        let motion = repo
            .insert_motion(&NewMotion {
                expires_at: Some(expires),
                ..new_motion(1, Majority::new(66, 100).unwrap(), false)
            })
            .await
            .unwrap();
        let stored = repo.motion(motion.id).await.unwrap().unwrap();
        assert_eq!(ts(&stored.expires_at.unwrap()), ts(&expires));
        assert_eq!(stored.majority, Majority::new(66, 100).unwrap());
    }
}
