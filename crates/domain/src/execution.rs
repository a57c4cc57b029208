//! Executions: one concrete run of a report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use reportflow_core::{ExecutionId, ReportId};

/// Queue ordering tier. `High` drains before `Normal` before `Low`; FIFO
/// within a tier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Execution lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Queued, waiting to be picked up (also after a transient failure while
    /// retries remain)
    Queued,
    /// An attempt is running
    Running,
    /// Completed successfully; artifacts are final
    Completed,
    /// Retry bound exhausted (or a permanent failure); never retried again
    Failed { error: String, attempts: u32 },
    /// Cancelled before completion; any in-flight result was discarded
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed { .. } | ExecutionStatus::Cancelled
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "QUEUED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed { .. } => "FAILED",
            ExecutionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Output format of a rendered artifact.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    Pdf,
    Excel,
    Csv,
}

impl ArtifactFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactFormat::Pdf => "pdf",
            ArtifactFormat::Excel => "excel",
            ArtifactFormat::Csv => "csv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactFormat::Pdf => "application/pdf",
            ArtifactFormat::Excel => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ArtifactFormat::Csv => "text/csv",
        }
    }
}

/// A rendered output file, referenced by opaque blob location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub format: ArtifactFormat,
    /// Opaque reference into the blob store; never a filesystem path.
    pub location: String,
    pub size_bytes: u64,
    pub filename: String,
}

/// Successful output of one generation attempt: the complete artifact set
/// plus the summary figures delivery manifests carry.
///
/// An attempt yields all of its artifacts or none; partial sets are never
/// surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedReport {
    pub artifacts: Vec<Artifact>,
    pub record_count: u64,
    pub data_size: u64,
}

impl GeneratedReport {
    pub fn total_artifact_bytes(&self) -> u64 {
        self.artifacts.iter().map(|a| a.size_bytes).sum()
    }
}

/// One concrete run of a report.
///
/// Created at enqueue time; mutated only by the worker owning the current
/// attempt; immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub report_id: ReportId,
    pub status: ExecutionStatus,
    pub priority: Priority,
    pub parameters: JsonValue,
    /// Attempts started so far (first attempt makes this 1).
    pub attempt: u32,
    pub artifacts: Vec<Artifact>,
    pub record_count: u64,
    pub data_size: u64,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Cooperative cancellation flag, checked at attempt boundaries.
    pub cancel_requested: bool,
}

impl Execution {
    pub fn new(
        report_id: ReportId,
        parameters: JsonValue,
        priority: Priority,
        queued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            report_id,
            status: ExecutionStatus::Queued,
            priority,
            parameters,
            attempt: 0,
            artifacts: Vec::new(),
            record_count: 0,
            data_size: 0,
            queued_at,
            started_at: None,
            completed_at: None,
            last_error: None,
            cancel_requested: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Begin an attempt. A retried attempt starts from a clean slate: no
    /// artifacts or partial state carry over from the prior attempt.
    pub fn mark_running(&mut self, at: DateTime<Utc>) {
        self.status = ExecutionStatus::Running;
        self.attempt += 1;
        self.started_at = Some(at);
        self.artifacts.clear();
    }

    pub fn mark_completed(&mut self, report: GeneratedReport, at: DateTime<Utc>) {
        self.data_size = report.total_artifact_bytes();
        self.record_count = report.record_count;
        self.artifacts = report.artifacts;
        self.completed_at = Some(at);
        self.status = ExecutionStatus::Completed;
    }

    /// Put the execution back in line after a transient failure.
    pub fn mark_retrying(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.status = ExecutionStatus::Queued;
        self.started_at = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        let error = error.into();
        self.last_error = Some(error.clone());
        self.completed_at = Some(at);
        self.status = ExecutionStatus::Failed {
            error,
            attempts: self.attempt,
        };
    }

    pub fn mark_cancelled(&mut self, at: DateTime<Utc>) {
        self.completed_at = Some(at);
        self.status = ExecutionStatus::Cancelled;
    }

    pub fn duration_ms(&self) -> Option<u64> {
        let (started, completed) = (self.started_at?, self.completed_at?);
        Some((completed - started).num_milliseconds().max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    fn artifact(size: u64) -> Artifact {
        Artifact {
            format: ArtifactFormat::Pdf,
            location: "blobs/abc".into(),
            size_bytes: size,
            filename: "report.pdf".into(),
        }
    }

    #[test]
    fn lifecycle_to_completed() {
        let mut execution = Execution::new(
            ReportId::new(),
            serde_json::json!({"month": "2024-04"}),
            Priority::Normal,
            at(8, 0),
        );
        assert_eq!(execution.status, ExecutionStatus::Queued);

        execution.mark_running(at(8, 1));
        assert_eq!(execution.attempt, 1);

        execution.mark_completed(
            GeneratedReport {
                artifacts: vec![artifact(100), artifact(50)],
                record_count: 12,
                data_size: 0,
            },
            at(8, 2),
        );
        assert!(execution.is_terminal());
        assert_eq!(execution.data_size, 150);
        assert_eq!(execution.duration_ms(), Some(60_000));
    }

    #[test]
    fn retry_starts_clean() {
        let mut execution = Execution::new(
            ReportId::new(),
            serde_json::json!({}),
            Priority::Normal,
            at(8, 0),
        );

        execution.mark_running(at(8, 1));
        execution.mark_retrying("upstream 502");
        assert_eq!(execution.status, ExecutionStatus::Queued);
        assert!(execution.started_at.is_none());
        assert!(execution.artifacts.is_empty());

        execution.mark_running(at(8, 5));
        assert_eq!(execution.attempt, 2);
    }

    #[test]
    fn failed_records_attempts() {
        let mut execution = Execution::new(
            ReportId::new(),
            serde_json::json!({}),
            Priority::Low,
            at(8, 0),
        );
        execution.mark_running(at(8, 1));
        execution.mark_failed("boom", at(8, 2));

        match &execution.status {
            ExecutionStatus::Failed { attempts, .. } => assert_eq!(*attempts, 1),
            other => panic!("unexpected status {other:?}"),
        }
        assert!(execution.is_terminal());
    }

    #[test]
    fn priority_orders_high_first() {
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
    }
}
