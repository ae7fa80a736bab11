/*!
 * Audit log of balancing actions
 *
 * Every action the balancer proposes and every outcome of submitting it is
 * appended as one JSON object per line, so a run can be reconstructed
 * after the fact.
 *
 * # Example
 *
 * ```no_run
 * use ballast::audit::{ActionStatus, AuditLog, AuditRecord};
 * use ballast_core_catalog::Action;
 * use chrono::NaiveDate;
 * use std::path::Path;
 *
 * let log = AuditLog::open(Path::new("ballast_audit.jsonl")).unwrap();
 * let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
 * let action = Action::replicate("/A/B/AOD", "T2_X");
 * log.record(&AuditRecord::new(date, &action, ActionStatus::Proposed)).unwrap();
 * ```
 */

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ballast_core_catalog::{Action, ActionKind};
use ballast_core_ingest::RequestId;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BallastError, Result};

/// Where an action stands when it is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Computed by the balancer
    Proposed,
    /// Accepted by the replica catalog
    Submitted,
    /// Refused by the replica catalog
    Rejected,
    /// Not submitted because of a dry run
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// RFC 3339 timestamp of the write
    pub timestamp: String,

    /// Date the cycle balanced for
    pub cycle_date: NaiveDate,

    pub dataset: String,

    pub site: String,

    pub kind: ActionKind,

    pub status: ActionStatus,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<RequestId>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl AuditRecord {
    pub fn new(cycle_date: NaiveDate, action: &Action, status: ActionStatus) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            cycle_date,
            dataset: action.dataset.clone(),
            site: action.site.clone(),
            kind: action.kind,
            status,
            request_id: None,
            error: None,
        }
    }

    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Append-only JSON Lines writer
pub struct AuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl AuditLog {
    /// Open or create the log in append mode, creating parent directories
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BallastError::AuditLog(format!("Failed to create audit log directory: {}", e))
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| BallastError::AuditLog(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, record: &AuditRecord) -> Result<()> {
        self.record_all(std::slice::from_ref(record))
    }

    /// Write a batch under one lock and flush once
    pub fn record_all(&self, records: &[AuditRecord]) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| BallastError::AuditLog("Audit writer lock poisoned".to_string()))?;

        for record in records {
            let json = serde_json::to_string(record)
                .map_err(|e| BallastError::AuditLog(format!("Failed to serialize record: {}", e)))?;
            writeln!(writer, "{}", json)
                .map_err(|e| BallastError::AuditLog(format!("Failed to write audit log: {}", e)))?;
        }
        writer
            .flush()
            .map_err(|e| BallastError::AuditLog(format!("Failed to flush audit log: {}", e)))?;
        Ok(())
    }
}

/// Read every record back, skipping blank lines
pub fn read_audit_log(path: &Path) -> Result<Vec<AuditRecord>> {
    let file = File::open(path)
        .map_err(|e| BallastError::AuditLog(format!("Failed to open audit log: {}", e)))?;

    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            BallastError::AuditLog(format!("Malformed audit line {}: {}", n + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}
