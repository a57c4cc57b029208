//! Append-only status ledger.
//!
//! Every execution transition and delivery attempt lands here as a new row;
//! no row is ever mutated or removed; corrections are new rows. The query
//! surface answers "where is this execution now" and "how did delivery go,
//! per recipient and in aggregate".

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use reportflow_core::{EngineError, EngineResult, ExecutionId, RecipientId, ReportId};
use reportflow_delivery::DeliveryLedger;
use reportflow_domain::{
    AggregateDeliveryStatus, ChannelKind, DeliveryAttempt, DeliveryAttemptStatus, ExecutionStatus,
    aggregate_status,
};

/// One ledger row: an execution moving between states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTransition {
    pub execution_id: ExecutionId,
    pub report_id: ReportId,
    pub from: Option<ExecutionStatus>,
    pub to: ExecutionStatus,
    pub at: DateTime<Utc>,
}

/// Latest known state of one execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStatusView {
    pub execution_id: ExecutionId,
    pub report_id: ReportId,
    pub status: ExecutionStatus,
    pub updated_at: DateTime<Utc>,
}

/// Latest delivery state for one recipient of an execution.
#[derive(Debug, Clone, Serialize)]
pub struct RecipientDeliveryView {
    pub recipient_id: RecipientId,
    pub channel: ChannelKind,
    /// Attempts made so far for this recipient.
    pub attempts: u32,
    pub status: DeliveryAttemptStatus,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Per-recipient and aggregate delivery state for one execution.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStatusView {
    pub execution_id: ExecutionId,
    pub aggregate: AggregateDeliveryStatus,
    pub per_recipient: Vec<RecipientDeliveryView>,
}

#[derive(Debug, Default)]
pub struct StatusTracker {
    transitions: RwLock<Vec<ExecutionTransition>>,
    deliveries: RwLock<Vec<DeliveryAttempt>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_execution_transition(&self, transition: ExecutionTransition) {
        debug!(
            execution_id = %transition.execution_id,
            report_id = %transition.report_id,
            from = transition.from.as_ref().map(|s| s.name()),
            to = transition.to.name(),
            "execution transition"
        );
        self.transitions.write().unwrap().push(transition);
    }

    pub fn execution_status(&self, execution_id: ExecutionId) -> EngineResult<ExecutionStatusView> {
        let transitions = self.transitions.read().unwrap();
        let last = transitions
            .iter()
            .rev()
            .find(|t| t.execution_id == execution_id)
            .ok_or_else(|| EngineError::not_found(format!("execution {execution_id}")))?;

        Ok(ExecutionStatusView {
            execution_id,
            report_id: last.report_id,
            status: last.to.clone(),
            updated_at: last.at,
        })
    }

    /// Full transition history of one execution, oldest first.
    pub fn execution_history(&self, execution_id: ExecutionId) -> Vec<ExecutionTransition> {
        self.transitions
            .read()
            .unwrap()
            .iter()
            .filter(|t| t.execution_id == execution_id)
            .cloned()
            .collect()
    }

    /// Delivery attempt rows of one execution, in append order.
    pub fn delivery_attempts(&self, execution_id: ExecutionId) -> Vec<DeliveryAttempt> {
        self.deliveries
            .read()
            .unwrap()
            .iter()
            .filter(|a| a.execution_id == execution_id)
            .cloned()
            .collect()
    }

    pub fn delivery_status(&self, execution_id: ExecutionId) -> EngineResult<DeliveryStatusView> {
        let current = self.execution_status(execution_id)?;

        let rows = self.deliveries.read().unwrap();
        let mut latest: HashMap<RecipientId, &DeliveryAttempt> = HashMap::new();
        for row in rows.iter().filter(|r| r.execution_id == execution_id) {
            latest
                .entry(row.recipient_id)
                .and_modify(|existing| {
                    if row.attempt >= existing.attempt {
                        *existing = row;
                    }
                })
                .or_insert(row);
        }

        let mut per_recipient: Vec<RecipientDeliveryView> = latest
            .values()
            .map(|row| RecipientDeliveryView {
                recipient_id: row.recipient_id,
                channel: row.channel,
                attempts: row.attempt,
                status: row.status.clone(),
                last_error: row.error.clone(),
                updated_at: row.at,
            })
            .collect();
        per_recipient.sort_by(|a, b| a.recipient_id.as_uuid().cmp(b.recipient_id.as_uuid()));

        // no rows yet: settled only if the execution completed with nobody
        // to deliver to
        let aggregate = if per_recipient.is_empty() {
            match current.status {
                ExecutionStatus::Completed => AggregateDeliveryStatus::Delivered,
                _ => AggregateDeliveryStatus::Pending,
            }
        } else {
            aggregate_status(per_recipient.iter().map(|v| &v.status))
        };

        Ok(DeliveryStatusView {
            execution_id,
            aggregate,
            per_recipient,
        })
    }
}

impl DeliveryLedger for StatusTracker {
    fn record_delivery_attempt(&self, attempt: DeliveryAttempt) {
        self.deliveries.write().unwrap().push(attempt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap()
    }

    fn transition(
        execution_id: ExecutionId,
        report_id: ReportId,
        from: Option<ExecutionStatus>,
        to: ExecutionStatus,
        minute: u32,
    ) -> ExecutionTransition {
        ExecutionTransition {
            execution_id,
            report_id,
            from,
            to,
            at: at(minute),
        }
    }

    #[test]
    fn status_follows_the_latest_transition() {
        let tracker = StatusTracker::new();
        let execution_id = ExecutionId::new();
        let report_id = ReportId::new();

        tracker.record_execution_transition(transition(
            execution_id,
            report_id,
            None,
            ExecutionStatus::Queued,
            0,
        ));
        tracker.record_execution_transition(transition(
            execution_id,
            report_id,
            Some(ExecutionStatus::Queued),
            ExecutionStatus::Running,
            1,
        ));

        let view = tracker.execution_status(execution_id).unwrap();
        assert_eq!(view.status, ExecutionStatus::Running);
        assert_eq!(view.updated_at, at(1));
        assert_eq!(tracker.execution_history(execution_id).len(), 2);
    }

    #[test]
    fn unknown_execution_is_not_found() {
        let tracker = StatusTracker::new();
        assert!(matches!(
            tracker.execution_status(ExecutionId::new()),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            tracker.delivery_status(ExecutionId::new()),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn delivery_rollup_uses_latest_attempt_per_recipient() {
        let tracker = StatusTracker::new();
        let execution_id = ExecutionId::new();
        let report_id = ReportId::new();
        tracker.record_execution_transition(transition(
            execution_id,
            report_id,
            None,
            ExecutionStatus::Completed,
            0,
        ));

        let webhook = RecipientId::new();
        let email = RecipientId::new();
        for (recipient, channel, attempt, status) in [
            (webhook, ChannelKind::Webhook, 1, DeliveryAttemptStatus::FailedRetrying),
            (email, ChannelKind::Email, 1, DeliveryAttemptStatus::Delivered),
            (webhook, ChannelKind::Webhook, 2, DeliveryAttemptStatus::FailedPermanent),
        ] {
            tracker.record_delivery_attempt(DeliveryAttempt::new(
                execution_id,
                recipient,
                channel,
                attempt,
                status,
                at(attempt),
            ));
        }

        let view = tracker.delivery_status(execution_id).unwrap();
        assert_eq!(view.aggregate, AggregateDeliveryStatus::Partial);
        assert_eq!(view.per_recipient.len(), 2);

        let webhook_view = view
            .per_recipient
            .iter()
            .find(|v| v.recipient_id == webhook)
            .unwrap();
        assert_eq!(webhook_view.attempts, 2);
        assert_eq!(webhook_view.status, DeliveryAttemptStatus::FailedPermanent);
    }

    #[test]
    fn completed_execution_with_no_recipients_is_delivered() {
        let tracker = StatusTracker::new();
        let execution_id = ExecutionId::new();
        tracker.record_execution_transition(transition(
            execution_id,
            ReportId::new(),
            None,
            ExecutionStatus::Completed,
            0,
        ));

        let view = tracker.delivery_status(execution_id).unwrap();
        assert_eq!(view.aggregate, AggregateDeliveryStatus::Delivered);
        assert!(view.per_recipient.is_empty());
    }

    #[test]
    fn running_execution_delivery_is_pending() {
        let tracker = StatusTracker::new();
        let execution_id = ExecutionId::new();
        tracker.record_execution_transition(transition(
            execution_id,
            ReportId::new(),
            None,
            ExecutionStatus::Running,
            0,
        ));

        let view = tracker.delivery_status(execution_id).unwrap();
        assert_eq!(view.aggregate, AggregateDeliveryStatus::Pending);
    }
}
