//! Bounded execution queue with per-report single-flight reservations.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use reportflow_core::{EngineError, EngineResult, ExecutionId, ReportId};
use reportflow_domain::{Execution, ExecutionStatus, Priority};

/// Outcome of a cancellation request.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// Dropped from the queue before it started; it will never run.
    CancelledQueued(Execution),
    /// The running attempt is allowed to finish, but its result is discarded
    /// and never delivered.
    CancelRequested(ExecutionId),
    /// No non-terminal execution exists for this report.
    NotInFlight,
}

#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    execution_id: ExecutionId,
    priority: Priority,
    seq: u64,
    /// Backoff gate: the entry is not claimable before this instant.
    not_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<QueueEntry>,
    executions: HashMap<ExecutionId, Execution>,
    reservations: HashMap<ReportId, ExecutionId>,
    next_seq: u64,
}

/// The single shared mutable structure of the engine. All mutating access is
/// serialized behind one mutex.
///
/// The reservation map, not the entry list, is the authoritative
/// single-flight lock: it is taken atomically at enqueue time and released
/// only when the execution reaches a terminal state, so a report stays
/// reserved through retries and running attempts.
#[derive(Debug)]
pub struct ExecutionQueue {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl ExecutionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    /// Reserve the report and queue a new execution.
    ///
    /// Fails fast with `Concurrency` while a non-terminal execution exists
    /// for the report, and with `ResourceExhausted` once the backlog is at
    /// capacity, so the queue never grows unbounded.
    pub fn enqueue(
        &self,
        report_id: ReportId,
        parameters: JsonValue,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> EngineResult<Execution> {
        let mut inner = self.inner.lock().unwrap();

        if inner.reservations.contains_key(&report_id) {
            return Err(EngineError::concurrency(format!(
                "report {report_id} already has an execution in flight"
            )));
        }
        if inner.entries.len() >= self.capacity {
            return Err(EngineError::resource_exhausted(format!(
                "backlog at capacity ({})",
                self.capacity
            )));
        }

        let execution = Execution::new(report_id, parameters, priority, now);
        let entry = QueueEntry {
            execution_id: execution.id,
            priority,
            seq: inner.next_seq,
            not_before: None,
        };
        inner.next_seq += 1;
        inner.entries.push(entry);
        inner.reservations.insert(report_id, execution.id);
        inner.executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    /// Claim the next ready entry and mark it running: highest priority tier
    /// first, FIFO within a tier. Entries under a backoff gate are skipped
    /// until due.
    pub fn claim_next(&self, now: DateTime<Utc>) -> Option<Execution> {
        let mut inner = self.inner.lock().unwrap();

        let index = inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.not_before.is_some_and(|t| t > now))
            .min_by_key(|(_, e)| (e.priority, e.seq))
            .map(|(index, _)| index)?;

        let entry = inner.entries.swap_remove(index);
        let execution = inner.executions.get_mut(&entry.execution_id)?;
        execution.mark_running(now);
        Some(execution.clone())
    }

    /// Put a transiently failed execution back in line, claimable from
    /// `not_before`. The report's reservation stays held; retries do not
    /// count against the backlog capacity.
    pub fn requeue(&self, execution: Execution, not_before: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        let entry = QueueEntry {
            execution_id: execution.id,
            priority: execution.priority,
            seq: inner.next_seq,
            not_before: Some(not_before),
        };
        inner.next_seq += 1;
        inner.entries.push(entry);
        inner.executions.insert(execution.id, execution);
    }

    /// Drop a terminal execution and release the report's reservation.
    pub fn finish(&self, execution: &Execution) {
        debug_assert!(execution.is_terminal());
        let mut inner = self.inner.lock().unwrap();
        inner.executions.remove(&execution.id);
        inner.reservations.remove(&execution.report_id);
    }

    /// Cooperative cancellation flag, checked by workers at attempt
    /// boundaries.
    pub fn cancel_requested(&self, execution_id: ExecutionId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .executions
            .get(&execution_id)
            .is_some_and(|e| e.cancel_requested)
    }

    /// Cancel the report's in-flight execution, if any: a queued entry is
    /// dropped on the spot, a running attempt gets its discard flag set.
    pub fn cancel(&self, report_id: ReportId, now: DateTime<Utc>) -> CancelOutcome {
        self.cancel_impl(report_id, now, true)
    }

    /// Cancel only if the execution has not started yet (used when a
    /// definition is deactivated: the running attempt may finish).
    pub fn cancel_if_queued(&self, report_id: ReportId, now: DateTime<Utc>) -> Option<Execution> {
        match self.cancel_impl(report_id, now, false) {
            CancelOutcome::CancelledQueued(execution) => Some(execution),
            _ => None,
        }
    }

    fn cancel_impl(&self, report_id: ReportId, now: DateTime<Utc>, flag_running: bool) -> CancelOutcome {
        let mut inner = self.inner.lock().unwrap();

        let Some(&execution_id) = inner.reservations.get(&report_id) else {
            return CancelOutcome::NotInFlight;
        };
        let running = inner
            .executions
            .get(&execution_id)
            .is_some_and(|e| matches!(e.status, ExecutionStatus::Running));

        if running {
            if flag_running {
                if let Some(execution) = inner.executions.get_mut(&execution_id) {
                    execution.cancel_requested = true;
                }
                return CancelOutcome::CancelRequested(execution_id);
            }
            return CancelOutcome::NotInFlight;
        }

        inner.entries.retain(|e| e.execution_id != execution_id);
        inner.reservations.remove(&report_id);
        match inner.executions.remove(&execution_id) {
            Some(mut execution) => {
                execution.mark_cancelled(now);
                CancelOutcome::CancelledQueued(execution)
            }
            None => CancelOutcome::NotInFlight,
        }
    }

    /// Queued (not running) entries, the number bounded by capacity.
    pub fn backlog(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Reports currently holding a single-flight reservation.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().unwrap().reservations.len()
    }

    pub fn get(&self, execution_id: ExecutionId) -> Option<Execution> {
        self.inner.lock().unwrap().executions.get(&execution_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn enqueue_and_claim() {
        let queue = ExecutionQueue::new(8);
        let report = ReportId::new();

        let queued = queue.enqueue(report, json!({}), Priority::Normal, t0()).unwrap();
        assert_eq!(queue.backlog(), 1);

        let claimed = queue.claim_next(t0()).unwrap();
        assert_eq!(claimed.id, queued.id);
        assert_eq!(claimed.status, ExecutionStatus::Running);
        assert_eq!(claimed.attempt, 1);
        assert_eq!(queue.backlog(), 0);

        assert!(queue.claim_next(t0()).is_none());
    }

    #[test]
    fn second_enqueue_is_rejected_while_in_flight() {
        let queue = ExecutionQueue::new(8);
        let report = ReportId::new();

        queue.enqueue(report, json!({}), Priority::Normal, t0()).unwrap();
        // still queued
        assert!(matches!(
            queue.enqueue(report, json!({}), Priority::Normal, t0()),
            Err(EngineError::Concurrency(_))
        ));

        let mut claimed = queue.claim_next(t0()).unwrap();
        // running
        assert!(matches!(
            queue.enqueue(report, json!({}), Priority::Normal, t0()),
            Err(EngineError::Concurrency(_))
        ));

        // a terminal outcome releases the reservation
        claimed.mark_completed(
            reportflow_domain::GeneratedReport {
                artifacts: Vec::new(),
                record_count: 0,
                data_size: 0,
            },
            t0(),
        );
        queue.finish(&claimed);
        assert!(queue.enqueue(report, json!({}), Priority::Normal, t0()).is_ok());
    }

    #[test]
    fn backlog_capacity_fails_fast() {
        let queue = ExecutionQueue::new(2);
        queue.enqueue(ReportId::new(), json!({}), Priority::Normal, t0()).unwrap();
        queue.enqueue(ReportId::new(), json!({}), Priority::Normal, t0()).unwrap();

        assert!(matches!(
            queue.enqueue(ReportId::new(), json!({}), Priority::Normal, t0()),
            Err(EngineError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn priority_then_fifo_ordering() {
        let queue = ExecutionQueue::new(8);
        let low = queue.enqueue(ReportId::new(), json!({}), Priority::Low, t0()).unwrap();
        let normal_1 = queue.enqueue(ReportId::new(), json!({}), Priority::Normal, t0()).unwrap();
        let high = queue.enqueue(ReportId::new(), json!({}), Priority::High, t0()).unwrap();
        let normal_2 = queue.enqueue(ReportId::new(), json!({}), Priority::Normal, t0()).unwrap();

        let order: Vec<ExecutionId> = std::iter::from_fn(|| queue.claim_next(t0()).map(|e| e.id)).collect();
        assert_eq!(order, vec![high.id, normal_1.id, normal_2.id, low.id]);
    }

    #[test]
    fn backoff_gate_defers_claims() {
        let queue = ExecutionQueue::new(8);
        let report = ReportId::new();
        queue.enqueue(report, json!({}), Priority::Normal, t0()).unwrap();

        let mut claimed = queue.claim_next(t0()).unwrap();
        claimed.mark_retrying("transient");
        let eligible_at = t0() + chrono::Duration::seconds(30);
        queue.requeue(claimed, eligible_at);

        assert!(queue.claim_next(t0()).is_none());
        assert!(queue.claim_next(eligible_at - chrono::Duration::seconds(1)).is_none());

        let retried = queue.claim_next(eligible_at).unwrap();
        assert_eq!(retried.attempt, 2);
    }

    #[test]
    fn cancel_queued_drops_the_entry() {
        let queue = ExecutionQueue::new(8);
        let report = ReportId::new();
        queue.enqueue(report, json!({}), Priority::Normal, t0()).unwrap();

        match queue.cancel(report, t0()) {
            CancelOutcome::CancelledQueued(execution) => {
                assert_eq!(execution.status, ExecutionStatus::Cancelled);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        assert!(queue.claim_next(t0()).is_none());
        assert_eq!(queue.in_flight(), 0);
        // reservation released: the report can be enqueued again
        assert!(queue.enqueue(report, json!({}), Priority::Normal, t0()).is_ok());
    }

    #[test]
    fn cancel_running_sets_the_discard_flag() {
        let queue = ExecutionQueue::new(8);
        let report = ReportId::new();
        queue.enqueue(report, json!({}), Priority::Normal, t0()).unwrap();
        let claimed = queue.claim_next(t0()).unwrap();

        match queue.cancel(report, t0()) {
            CancelOutcome::CancelRequested(id) => assert_eq!(id, claimed.id),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(queue.cancel_requested(claimed.id));
        // the reservation stays held until the worker finishes
        assert_eq!(queue.in_flight(), 1);
    }

    #[test]
    fn cancel_if_queued_leaves_running_work_alone() {
        let queue = ExecutionQueue::new(8);
        let report = ReportId::new();
        queue.enqueue(report, json!({}), Priority::Normal, t0()).unwrap();
        let claimed = queue.claim_next(t0()).unwrap();

        assert!(queue.cancel_if_queued(report, t0()).is_none());
        assert!(!queue.cancel_requested(claimed.id));
    }

    #[test]
    fn cancel_unknown_report_is_not_in_flight() {
        let queue = ExecutionQueue::new(8);
        assert!(matches!(
            queue.cancel(ReportId::new(), t0()),
            CancelOutcome::NotInFlight
        ));
    }
}
