//! Append-only attempt ledger.
//!
//! Every agent attempt is recorded as one NDJSON line in
//! `.trinity/attempts.ndjson`, written before the outcome is applied to the
//! backlog. The ledger is the authoritative attempt history: on resume,
//! per-item counts derived from it reconcile the backlog's attempt counters
//! for items that were in flight when the previous process died.

use crate::agent::Outcome;
use crate::error::{Result, TrinityError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One recorded agent attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// Work item this attempt was for.
    pub item_id: String,

    /// 1-based attempt number for the item.
    pub sequence: u32,

    /// When the attempt was dispatched.
    pub started_at: DateTime<Utc>,

    /// When the outcome was observed.
    pub ended_at: DateTime<Utc>,

    /// What the agent invocation produced.
    pub outcome: Outcome,

    /// Optional operator-facing detail (e.g. truncated stderr tail).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// NDJSON-backed attempt history.
///
/// Holds per-item attempt counts in memory; the full history stays on disk
/// and is re-read only when a caller asks for it.
#[derive(Debug)]
pub struct AttemptLedger {
    path: PathBuf,
    counts: HashMap<String, u32>,
}

impl AttemptLedger {
    /// Open (or create on first write) the ledger at `path`.
    ///
    /// Existing lines are parsed to rebuild per-item counts; a malformed
    /// line is corrupt state, not something to skip over.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut counts = HashMap::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                TrinityError::IoFailure(format!(
                    "failed to read attempt ledger '{}': {}",
                    path.display(),
                    e
                ))
            })?;

            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let attempt: Attempt = serde_json::from_str(line).map_err(|e| {
                    TrinityError::CorruptState(format!(
                        "attempt ledger '{}' line {}: {}",
                        path.display(),
                        line_no + 1,
                        e
                    ))
                })?;
                let count = counts.entry(attempt.item_id.clone()).or_insert(0);
                *count = (*count).max(attempt.sequence);
            }
        }

        Ok(Self { path, counts })
    }

    /// Attempt number the next dispatch of `item_id` should carry.
    pub fn next_sequence(&self, item_id: &str) -> u32 {
        self.attempt_count(item_id) + 1
    }

    /// Number of attempts recorded for an item.
    pub fn attempt_count(&self, item_id: &str) -> u32 {
        self.counts.get(item_id).copied().unwrap_or(0)
    }

    /// Append one attempt record and fsync.
    pub fn record(&mut self, attempt: &Attempt) -> Result<()> {
        let line = serde_json::to_string(attempt).map_err(|e| {
            TrinityError::IoFailure(format!("failed to serialize attempt record: {}", e))
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                TrinityError::IoFailure(format!(
                    "failed to open attempt ledger '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", line).map_err(|e| {
            TrinityError::IoFailure(format!(
                "failed to append to attempt ledger '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        file.sync_all().map_err(|e| {
            TrinityError::IoFailure(format!(
                "failed to sync attempt ledger '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        let count = self.counts.entry(attempt.item_id.clone()).or_insert(0);
        *count = (*count).max(attempt.sequence);
        Ok(())
    }

    /// Full attempt history for one item, ordered by sequence.
    pub fn history(&self, item_id: &str) -> Result<Vec<Attempt>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            TrinityError::IoFailure(format!(
                "failed to read attempt ledger '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        let mut attempts = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let attempt: Attempt = serde_json::from_str(line).map_err(|e| {
                TrinityError::CorruptState(format!(
                    "attempt ledger '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;
            if attempt.item_id == item_id {
                attempts.push(attempt);
            }
        }

        attempts.sort_by_key(|a| a.sequence);
        Ok(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_attempt(item_id: &str, sequence: u32, outcome: Outcome) -> Attempt {
        let now = Utc::now();
        Attempt {
            item_id: item_id.to_string(),
            sequence,
            started_at: now,
            ended_at: now,
            outcome,
            diagnostic: None,
        }
    }

    #[test]
    fn open_missing_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = AttemptLedger::open(temp_dir.path().join("attempts.ndjson")).unwrap();
        assert_eq!(ledger.attempt_count("ITEM-001"), 0);
        assert_eq!(ledger.next_sequence("ITEM-001"), 1);
    }

    #[test]
    fn record_bumps_counts_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("attempts.ndjson");

        let mut ledger = AttemptLedger::open(&path).unwrap();
        ledger
            .record(&make_attempt("ITEM-001", 1, Outcome::Timeout))
            .unwrap();
        ledger
            .record(&make_attempt("ITEM-001", 2, Outcome::Success))
            .unwrap();
        ledger
            .record(&make_attempt(
                "ITEM-002",
                1,
                Outcome::AgentFailure {
                    reason: "exit code 1".to_string(),
                },
            ))
            .unwrap();

        assert_eq!(ledger.attempt_count("ITEM-001"), 2);
        assert_eq!(ledger.attempt_count("ITEM-002"), 1);

        // Counts survive reopening the file.
        let reopened = AttemptLedger::open(&path).unwrap();
        assert_eq!(reopened.attempt_count("ITEM-001"), 2);
        assert_eq!(reopened.next_sequence("ITEM-002"), 2);
    }

    #[test]
    fn history_is_ordered_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("attempts.ndjson");

        let mut ledger = AttemptLedger::open(&path).unwrap();
        ledger
            .record(&make_attempt("ITEM-001", 1, Outcome::Timeout))
            .unwrap();
        ledger
            .record(&make_attempt("ITEM-002", 1, Outcome::Success))
            .unwrap();
        ledger
            .record(&make_attempt("ITEM-001", 2, Outcome::Success))
            .unwrap();

        let history = ledger.history("ITEM-001").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sequence, 1);
        assert_eq!(history[0].outcome, Outcome::Timeout);
        assert_eq!(history[1].sequence, 2);
        assert_eq!(history[1].outcome, Outcome::Success);
    }

    #[test]
    fn malformed_line_is_corrupt_state() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("attempts.ndjson");
        std::fs::write(&path, "{\"item_id\": \"ITEM-001\"\nnot json\n").unwrap();

        let err = AttemptLedger::open(&path).unwrap_err();
        assert!(matches!(err, TrinityError::CorruptState(_)));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn blank_lines_are_tolerated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("attempts.ndjson");

        let mut ledger = AttemptLedger::open(&path).unwrap();
        ledger
            .record(&make_attempt("ITEM-001", 1, Outcome::Success))
            .unwrap();

        // Simulate a stray trailing newline from a crashed writer.
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push('\n');
        std::fs::write(&path, content).unwrap();

        let reopened = AttemptLedger::open(&path).unwrap();
        assert_eq!(reopened.attempt_count("ITEM-001"), 1);
    }

    #[test]
    fn attempt_record_roundtrips_through_json() {
        let attempt = make_attempt("ITEM-007", 3, Outcome::CrashedProcess { code: 11 });
        let json = serde_json::to_string(&attempt).unwrap();
        let restored: Attempt = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.item_id, "ITEM-007");
        assert_eq!(restored.sequence, 3);
        assert_eq!(restored.outcome, Outcome::CrashedProcess { code: 11 });
    }
}
