//! Enqueue/cancel orchestration and retry disposition.
//!
//! Composes the queue, ledger, and retry policy; no IO of its own. Every
//! state change it makes lands on the status ledger.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use reportflow_core::{Clock, EngineError, EngineResult, ExecutionId, ReportId, RetryPolicy};
use reportflow_domain::{Execution, ExecutionStatus, Priority, ReportDefinition};

use crate::queue::{CancelOutcome, ExecutionQueue};
use crate::tracker::{ExecutionTransition, StatusTracker};

/// What happened to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Requeued with a backoff delay.
    Retrying { delay: std::time::Duration },
    /// Terminal: the retry bound is exhausted or the failure was permanent.
    Exhausted,
}

pub struct Dispatcher {
    queue: Arc<ExecutionQueue>,
    tracker: Arc<StatusTracker>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<ExecutionQueue>,
        tracker: Arc<StatusTracker>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            tracker,
            retry,
            clock,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Queue a new execution for an active definition.
    pub fn enqueue(
        &self,
        definition: &ReportDefinition,
        parameters: JsonValue,
        priority: Priority,
    ) -> EngineResult<ExecutionId> {
        if !definition.lifecycle.is_active() {
            return Err(EngineError::validation(format!(
                "report {} is not active",
                definition.id
            )));
        }

        let now = self.clock.now();
        let execution = self
            .queue
            .enqueue(definition.id, parameters, priority, now)?;
        self.tracker.record_execution_transition(ExecutionTransition {
            execution_id: execution.id,
            report_id: definition.id,
            from: None,
            to: ExecutionStatus::Queued,
            at: now,
        });
        info!(
            report_id = %definition.id,
            execution_id = %execution.id,
            priority = ?priority,
            "execution queued"
        );
        Ok(execution.id)
    }

    /// Cancel the report's in-flight execution: queued work is dropped on the
    /// spot; a running attempt finishes but its result is discarded.
    pub fn cancel(&self, report_id: ReportId) -> CancelOutcome {
        let outcome = self.queue.cancel(report_id, self.clock.now());
        match &outcome {
            CancelOutcome::CancelledQueued(execution) => {
                self.record_cancelled_queued(execution);
            }
            CancelOutcome::CancelRequested(execution_id) => {
                info!(report_id = %report_id, execution_id = %execution_id, "cancellation requested for running attempt");
            }
            CancelOutcome::NotInFlight => {}
        }
        outcome
    }

    /// Cancel only queued-not-started work (definition deactivation).
    pub fn cancel_if_queued(&self, report_id: ReportId) -> Option<ExecutionId> {
        let execution = self.queue.cancel_if_queued(report_id, self.clock.now())?;
        self.record_cancelled_queued(&execution);
        Some(execution.id)
    }

    fn record_cancelled_queued(&self, execution: &Execution) {
        self.tracker.record_execution_transition(ExecutionTransition {
            execution_id: execution.id,
            report_id: execution.report_id,
            from: Some(ExecutionStatus::Queued),
            to: ExecutionStatus::Cancelled,
            at: self.clock.now(),
        });
        info!(
            report_id = %execution.report_id,
            execution_id = %execution.id,
            "queued execution cancelled"
        );
    }

    /// Decide what happens after a failed attempt: requeue with backoff while
    /// the bound allows and the failure was retryable, otherwise fail
    /// terminally.
    pub(crate) fn dispose_failure(
        &self,
        mut execution: Execution,
        error: String,
        retryable: bool,
    ) -> FailureDisposition {
        let now = self.clock.now();
        let attempts = execution.attempt;
        let failed = ExecutionStatus::Failed {
            error: error.clone(),
            attempts,
        };

        if retryable && self.retry.should_retry(attempts) {
            self.tracker.record_execution_transition(ExecutionTransition {
                execution_id: execution.id,
                report_id: execution.report_id,
                from: Some(ExecutionStatus::Running),
                to: failed.clone(),
                at: now,
            });
            self.tracker.record_execution_transition(ExecutionTransition {
                execution_id: execution.id,
                report_id: execution.report_id,
                from: Some(failed),
                to: ExecutionStatus::Queued,
                at: now,
            });

            let delay = self
                .retry
                .delay_for_attempt(attempts, execution.id.jitter_seed());
            warn!(
                execution_id = %execution.id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "attempt failed, requeued with backoff"
            );
            execution.mark_retrying(error.as_str());
            let not_before = now + chrono::Duration::from_std(delay).unwrap_or_default();
            self.queue.requeue(execution, not_before);
            FailureDisposition::Retrying { delay }
        } else {
            execution.mark_failed(error.as_str(), now);
            self.tracker.record_execution_transition(ExecutionTransition {
                execution_id: execution.id,
                report_id: execution.report_id,
                from: Some(ExecutionStatus::Running),
                to: execution.status.clone(),
                at: now,
            });
            self.queue.finish(&execution);
            warn!(
                execution_id = %execution.id,
                attempts,
                error = %error,
                "execution failed terminally"
            );
            FailureDisposition::Exhausted
        }
    }
}
