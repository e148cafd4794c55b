//! Append-only history: implemented changes, rejections, rollbacks and the
//! external sinks (JSONL changelog, SQLite `evolution_log`) they are mirrored to.
//!
//! The in-memory `evolution_history` is the source of truth for the live profile:
//! `current == replay(original, history, history.len())` at all times.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result as AnyResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EvolutionError, Result};
use crate::profile::{Profile, ProfileDiff};
use crate::types::GrowthProposal;

// ─── In-memory logs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementedChange {
    pub proposal: GrowthProposal,
    pub applied_timestamp: DateTime<Utc>,
    pub resulting_diff: ProfileDiff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectionReason {
    Consensus,
    Expired,
    Manual(String),
}

impl RejectionReason {
    pub fn describe(&self) -> String {
        match self {
            Self::Consensus => "rejected by votes".to_string(),
            Self::Expired => "pending too long".to_string(),
            Self::Manual(reason) => reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedProposal {
    pub proposal: GrowthProposal,
    pub rejected_timestamp: DateTime<Utc>,
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum RollbackTarget {
    /// Back to the untouched baseline.
    Original,
    /// State as it was before the history event at this index.
    HistoryIndex(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HistoryEvent {
    Implemented(ImplementedChange),
    RolledBack {
        target: RollbackTarget,
        /// Proposal ids whose changes are live after the rollback, in order.
        replayed: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

/// Indices (into `history`) of the implemented events that are live after the
/// first `upto` events. A rollback resets the live set to what it was at its target.
pub fn effective_changes(history: &[HistoryEvent], upto: usize) -> Vec<usize> {
    let upto = upto.min(history.len());
    let mut prefix: Vec<Vec<usize>> = Vec::with_capacity(upto + 1);
    prefix.push(Vec::new());
    for (i, event) in history.iter().take(upto).enumerate() {
        let next = match event {
            HistoryEvent::Implemented(_) => {
                let mut live = prefix[i].clone();
                live.push(i);
                live
            }
            HistoryEvent::RolledBack { target, .. } => match target {
                RollbackTarget::Original => Vec::new(),
                RollbackTarget::HistoryIndex(n) => prefix[(*n).min(i)].clone(),
            },
        };
        prefix.push(next);
    }
    prefix.pop().unwrap_or_default()
}

/// Rebuild a profile from `original` and the first `upto` history events.
pub fn replay(original: &Profile, history: &[HistoryEvent], upto: usize) -> Result<Profile> {
    let mut profile = original.clone();
    for idx in effective_changes(history, upto) {
        if let HistoryEvent::Implemented(change) = &history[idx] {
            profile.apply_changes(&change.proposal.proposed_changes)?;
        }
    }
    Ok(profile)
}

/// Resolve a rollback target to the number of history events to replay.
pub fn rollback_cutoff(history: &[HistoryEvent], target: RollbackTarget) -> Result<usize> {
    match target {
        RollbackTarget::Original => Ok(0),
        RollbackTarget::HistoryIndex(n) if n <= history.len() => Ok(n),
        RollbackTarget::HistoryIndex(n) => Err(EvolutionError::InvalidState(format!(
            "history index {} out of range (history has {} events)",
            n,
            history.len()
        ))),
    }
}

// ─── Sinks ──────────────────────────────────────────────────────────────────

/// One lifecycle event as written to an external append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub ts: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub target_id: String,
    pub reason: String,
    #[serde(default)]
    pub payload: Value,
}

impl HistoryRecord {
    pub fn new(event_type: &str, target_id: &str, reason: &str, payload: Value) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            target_id: target_id.to_string(),
            reason: reason.to_string(),
            payload,
        }
    }
}

/// External append-only history log. Failures are reported to the caller, who
/// logs them; they never roll back engine state.
pub trait HistorySink: Send + Sync {
    fn name(&self) -> &'static str;
    fn append(&self, record: &HistoryRecord) -> AnyResult<()>;
}

/// `changelog.jsonl`: one JSON record per line.
pub struct JsonlHistorySink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlHistorySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back. Blank and unparsable lines are skipped.
    pub fn read_all(path: &Path) -> AnyResult<Vec<HistoryRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

impl HistorySink for JsonlHistorySink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn append(&self, record: &HistoryRecord) -> AnyResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// SQLite `evolution_log` table.
pub struct SqliteHistorySink {
    conn: Mutex<Connection>,
}

fn ensure_history_table(conn: &Connection) -> AnyResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS evolution_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL DEFAULT (datetime('now')),
            type TEXT NOT NULL,
            target_id TEXT,
            reason TEXT,
            payload TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_evo_log_ts ON evolution_log(ts);
        CREATE INDEX IF NOT EXISTS idx_evo_log_type ON evolution_log(type);
        "#,
    )?;
    Ok(())
}

impl SqliteHistorySink {
    pub fn open(db_path: &Path) -> AnyResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening history db {}", db_path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        ensure_history_table(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> AnyResult<Self> {
        let conn = Connection::open_in_memory()?;
        ensure_history_table(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Most recent records first.
    pub fn query_recent(&self, limit: usize) -> AnyResult<Vec<HistoryRecord>> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let mut stmt = conn.prepare(
            "SELECT ts, type, target_id, reason, payload FROM evolution_log
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let payload: Option<String> = row.get(4)?;
            Ok(HistoryRecord {
                ts: row.get(0)?,
                event_type: row.get(1)?,
                target_id: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                reason: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                payload: payload
                    .and_then(|p| serde_json::from_str(&p).ok())
                    .unwrap_or(Value::Null),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn count_by_type(&self) -> AnyResult<Vec<(String, i64)>> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let mut stmt = conn.prepare(
            "SELECT type, COUNT(*) FROM evolution_log GROUP BY type ORDER BY type",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

impl HistorySink for SqliteHistorySink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn append(&self, record: &HistoryRecord) -> AnyResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let payload = serde_json::to_string(&record.payload)?;
        conn.execute(
            "INSERT INTO evolution_log (ts, type, target_id, reason, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.ts,
                record.event_type,
                record.target_id,
                record.reason,
                payload
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Complexity, EvolutionType, ImplementationStatus, Priority, ProposedChanges, RiskLevel,
    };
    use serde_json::json;

    fn implemented(id: &str, path: &str, value: Value) -> HistoryEvent {
        let mut changes = ProposedChanges::new();
        changes.insert(path.to_string(), value);
        HistoryEvent::Implemented(ImplementedChange {
            proposal: GrowthProposal {
                proposal_id: id.into(),
                evolution_type: EvolutionType::PerformanceTuning,
                priority: Priority::High,
                title: id.into(),
                description: String::new(),
                target_component: "performance".into(),
                proposed_changes: changes,
                supporting_evidence: vec![],
                confidence_score: 0.8,
                risk_assessment: RiskLevel::Low,
                implementation_complexity: Complexity::Trivial,
                created_timestamp: Utc::now(),
                votes_for: 2,
                votes_against: 0,
                implementation_status: ImplementationStatus::Implemented,
            },
            applied_timestamp: Utc::now(),
            resulting_diff: ProfileDiff::default(),
        })
    }

    fn rollback(target: RollbackTarget) -> HistoryEvent {
        HistoryEvent::RolledBack {
            target,
            replayed: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_effective_changes_follow_rollbacks() {
        let history = vec![
            implemented("a", "performance.x", json!(1)),
            implemented("b", "performance.y", json!(2)),
            rollback(RollbackTarget::HistoryIndex(1)),
            implemented("c", "performance.z", json!(3)),
        ];
        assert_eq!(effective_changes(&history, 2), vec![0, 1]);
        assert_eq!(effective_changes(&history, 3), vec![0]);
        assert_eq!(effective_changes(&history, 4), vec![0, 3]);

        let mut history = history;
        history.push(rollback(RollbackTarget::Original));
        assert!(effective_changes(&history, 5).is_empty());
        // Rolling back to "just after the first rollback" keeps it in force.
        history.push(rollback(RollbackTarget::HistoryIndex(3)));
        assert_eq!(effective_changes(&history, 6), vec![0]);
    }

    #[test]
    fn test_replay_applies_live_changes() {
        let original = Profile::new(json!({"performance": {"x": 0}})).unwrap();
        let history = vec![
            implemented("a", "performance.x", json!(1)),
            implemented("b", "performance.y", json!(2)),
            rollback(RollbackTarget::HistoryIndex(1)),
        ];
        let p = replay(&original, &history, history.len()).unwrap();
        assert_eq!(p.get("performance.x"), Some(&json!(1)));
        assert_eq!(p.get("performance.y"), None);
        assert_eq!(original.get("performance.x"), Some(&json!(0)));
    }

    #[test]
    fn test_rollback_cutoff_bounds() {
        let history = vec![implemented("a", "performance.x", json!(1))];
        assert_eq!(rollback_cutoff(&history, RollbackTarget::Original).unwrap(), 0);
        assert_eq!(rollback_cutoff(&history, RollbackTarget::HistoryIndex(1)).unwrap(), 1);
        assert!(matches!(
            rollback_cutoff(&history, RollbackTarget::HistoryIndex(2)),
            Err(EvolutionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_jsonl_sink_appends_and_reads() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("history").join("changelog.jsonl");
        let sink = JsonlHistorySink::new(&path);
        sink.append(&HistoryRecord::new("proposal_registered", "p1", "cycle", json!({"n": 1})))
            .unwrap();
        sink.append(&HistoryRecord::new("proposal_implemented", "p1", "votes", Value::Null))
            .unwrap();
        let records = JsonlHistorySink::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, "proposal_registered");
        assert_eq!(records[0].payload["n"], 1);
        assert_eq!(records[1].target_id, "p1");
    }

    #[test]
    fn test_sqlite_sink_query_and_counts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let sink = SqliteHistorySink::open(&tmp.path().join("evolution.sqlite")).unwrap();
        sink.append(&HistoryRecord::new("proposal_registered", "p1", "", Value::Null))
            .unwrap();
        sink.append(&HistoryRecord::new("proposal_registered", "p2", "", Value::Null))
            .unwrap();
        sink.append(&HistoryRecord::new("proposal_rejected", "p1", "expired", json!({"a": 1})))
            .unwrap();

        let recent = sink.query_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type, "proposal_rejected");
        assert_eq!(recent[0].payload["a"], 1);
        assert_eq!(recent[1].target_id, "p2");

        let counts = sink.count_by_type().unwrap();
        assert_eq!(
            counts,
            vec![
                ("proposal_registered".to_string(), 2),
                ("proposal_rejected".to_string(), 1)
            ]
        );
    }
}
