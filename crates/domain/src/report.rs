//! Report definitions: the unit the engine schedules and runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reportflow_core::ReportId;

use crate::recipient::Recipient;
use crate::schedule::ScheduleSpec;

/// Definition lifecycle state.
///
/// Replaces an ad-hoc "is active" flag: the schedule calculator consults this
/// state directly (non-active means no next run), and `Retired` definitions
/// never run again.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportLifecycle {
    Active,
    Paused,
    Retired,
}

impl ReportLifecycle {
    pub fn is_active(&self) -> bool {
        matches!(self, ReportLifecycle::Active)
    }
}

/// A report definition as the engine sees it.
///
/// Owned by the external definition store; the engine reads it and writes
/// back only `next_run_at`, `last_run_at`, `run_count`, and `lifecycle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub id: ReportId,
    pub name: String,
    /// Absent means on-demand only. At most one active schedule per report.
    pub schedule: Option<ScheduleSpec>,
    pub lifecycle: ReportLifecycle,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub run_count: u32,
    pub max_runs: Option<u32>,
    pub recipients: Vec<Recipient>,
}

impl ReportDefinition {
    /// Create an active, on-demand definition with no recipients.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ReportId::new(),
            name: name.into(),
            schedule: None,
            lifecycle: ReportLifecycle::Active,
            last_run_at: None,
            next_run_at: None,
            run_count: 0,
            max_runs: None,
            recipients: Vec::new(),
        }
    }

    pub fn with_schedule(mut self, schedule: ScheduleSpec) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_recipient(mut self, recipient: Recipient) -> Self {
        self.recipients.push(recipient);
        self
    }

    pub fn with_max_runs(mut self, max_runs: u32) -> Self {
        self.max_runs = Some(max_runs);
        self
    }

    pub fn active_recipients(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients.iter().filter(|r| r.is_active)
    }

    /// Whether the run budget is used up.
    pub fn runs_exhausted(&self) -> bool {
        self.max_runs.is_some_and(|max| self.run_count >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipient::ChannelTarget;

    #[test]
    fn active_recipients_filters_inactive() {
        let definition = ReportDefinition::new("weekly revenue")
            .with_recipient(Recipient::new(ChannelTarget::email("a@b.c").unwrap()))
            .with_recipient(Recipient::new(ChannelTarget::download()).deactivated());

        assert_eq!(definition.active_recipients().count(), 1);
    }

    #[test]
    fn run_budget() {
        let mut definition = ReportDefinition::new("bounded").with_max_runs(2);
        assert!(!definition.runs_exhausted());
        definition.run_count = 2;
        assert!(definition.runs_exhausted());
    }
}
