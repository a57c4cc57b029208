//! Engine assembly and exposed operations.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reportflow_core::{Clock, EngineError, EngineResult, ExecutionId, ReportId, RetryPolicy};
use reportflow_delivery::DeliveryRouter;
use reportflow_domain::{Priority, ReportLifecycle, next_run_for};

use crate::definitions::DefinitionStore;
use crate::dispatcher::Dispatcher;
use crate::generate::ReportGenerator;
use crate::queue::{CancelOutcome, ExecutionQueue};
use crate::tracker::{DeliveryStatusView, ExecutionStatusView, StatusTracker};
use crate::worker::{WorkerPool, WorkerPoolConfig, WorkerPoolHandle};

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded backlog; enqueues beyond this fail fast.
    pub queue_capacity: usize,
    /// Attempt retry policy (default: 3 retries, 2s/4s/8s with jitter).
    pub retry: RetryPolicy,
    pub worker: WorkerPoolConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 128,
            retry: RetryPolicy::default(),
            worker: WorkerPoolConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_worker(mut self, worker: WorkerPoolConfig) -> Self {
        self.worker = worker;
        self
    }
}

/// Handle to a running schedule ticker.
#[derive(Debug)]
pub struct TickerHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl TickerHandle {
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

/// The assembled engine: queue, dispatcher, worker pool, status tracker.
///
/// An explicit, constructible object; whoever assembles it owns its
/// lifecycle (start, drain, shutdown). Nothing here is global state.
pub struct ReportEngine {
    definitions: Arc<dyn DefinitionStore>,
    queue: Arc<ExecutionQueue>,
    tracker: Arc<StatusTracker>,
    dispatcher: Arc<Dispatcher>,
    pool: Arc<WorkerPool>,
    clock: Arc<dyn Clock>,
}

impl ReportEngine {
    pub fn new(
        config: EngineConfig,
        definitions: Arc<dyn DefinitionStore>,
        generator: Arc<dyn ReportGenerator>,
        router: Arc<DeliveryRouter>,
        tracker: Arc<StatusTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queue = Arc::new(ExecutionQueue::new(config.queue_capacity));
        let dispatcher = Arc::new(Dispatcher::new(
            queue.clone(),
            tracker.clone(),
            config.retry.clone(),
            clock.clone(),
        ));
        let pool = Arc::new(WorkerPool::new(
            queue.clone(),
            dispatcher.clone(),
            tracker.clone(),
            definitions.clone(),
            generator,
            router,
            clock.clone(),
            config.worker,
        ));

        Self {
            definitions,
            queue,
            tracker,
            dispatcher,
            pool,
            clock,
        }
    }

    /// Spawn the worker pool. The returned handle drains it gracefully.
    pub fn start(&self) -> WorkerPoolHandle {
        self.pool.spawn()
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    pub fn queue(&self) -> &Arc<ExecutionQueue> {
        &self.queue
    }

    /// Queue an on-demand execution.
    pub fn enqueue_execution(
        &self,
        report_id: ReportId,
        parameters: JsonValue,
        priority: Priority,
    ) -> EngineResult<ExecutionId> {
        let definition = self.definitions.get(report_id)?;
        self.dispatcher.enqueue(&definition, parameters, priority)
    }

    pub fn execution_status(&self, execution_id: ExecutionId) -> EngineResult<ExecutionStatusView> {
        self.tracker.execution_status(execution_id)
    }

    pub fn delivery_status(&self, execution_id: ExecutionId) -> EngineResult<DeliveryStatusView> {
        self.tracker.delivery_status(execution_id)
    }

    /// Pause a report: no further scheduled runs, and a queued-but-not-started
    /// execution is cancelled. A running attempt is allowed to finish.
    pub fn pause(&self, report_id: ReportId) -> EngineResult<()> {
        self.definitions.set_lifecycle(report_id, ReportLifecycle::Paused)?;
        self.definitions.set_next_run(report_id, None)?;
        if let Some(execution_id) = self.dispatcher.cancel_if_queued(report_id) {
            debug!(report_id = %report_id, execution_id = %execution_id, "queued execution cancelled on pause");
        }
        info!(report_id = %report_id, "report paused");
        Ok(())
    }

    /// Resume a paused report. The next run is recomputed strictly from the
    /// current clock; the stale pre-pause `next_run_at` is never replayed.
    pub fn resume(&self, report_id: ReportId) -> EngineResult<()> {
        let mut definition = self.definitions.get(report_id)?;
        if matches!(definition.lifecycle, ReportLifecycle::Retired) {
            return Err(EngineError::validation(format!(
                "report {report_id} is retired"
            )));
        }

        self.definitions
            .set_lifecycle(report_id, ReportLifecycle::Active)?;
        definition.lifecycle = ReportLifecycle::Active;
        definition.next_run_at = None;

        let next = next_run_for(&definition, self.clock.now());
        self.definitions.set_next_run(report_id, next)?;
        info!(report_id = %report_id, next_run_at = ?next, "report resumed");
        Ok(())
    }

    /// Retire a report permanently. Queued work is cancelled; it can never
    /// be resumed or run again.
    pub fn retire(&self, report_id: ReportId) -> EngineResult<()> {
        self.definitions
            .set_lifecycle(report_id, ReportLifecycle::Retired)?;
        self.definitions.set_next_run(report_id, None)?;
        self.dispatcher.cancel_if_queued(report_id);
        info!(report_id = %report_id, "report retired");
        Ok(())
    }

    /// Cancel the report's in-flight execution, if any.
    pub fn cancel(&self, report_id: ReportId) -> EngineResult<CancelOutcome> {
        self.definitions.get(report_id)?;
        Ok(self.dispatcher.cancel(report_id))
    }

    /// One scheduler tick: enqueue every scheduled definition whose next run
    /// is due and advance its `next_run_at`.
    pub fn run_due(&self) -> Vec<ExecutionId> {
        let now = self.clock.now();
        let mut queued = Vec::new();

        for definition in self.definitions.list() {
            if definition.schedule.is_none() || !definition.lifecycle.is_active() {
                continue;
            }

            match definition.next_run_at {
                None => {
                    // first sighting: compute and store the initial tick
                    if let Some(next) = next_run_for(&definition, now) {
                        if let Err(e) = self.definitions.set_next_run(definition.id, Some(next)) {
                            warn!(report_id = %definition.id, error = %e, "failed to store next run");
                        }
                    }
                }
                Some(due) if due <= now => {
                    match self
                        .dispatcher
                        .enqueue(&definition, serde_json::json!({}), Priority::Normal)
                    {
                        Ok(execution_id) => queued.push(execution_id),
                        Err(EngineError::Concurrency(_)) => {
                            // the prior run is still in flight; this tick is
                            // skipped, never run twice concurrently
                            debug!(report_id = %definition.id, "tick skipped, execution in flight");
                        }
                        Err(e) => {
                            warn!(report_id = %definition.id, error = %e, "scheduled enqueue failed");
                        }
                    }
                    let next = next_run_for(&definition, now);
                    if let Err(e) = self.definitions.set_next_run(definition.id, next) {
                        warn!(report_id = %definition.id, error = %e, "failed to advance next run");
                    }
                }
                Some(_) => {}
            }
        }

        queued
    }

    /// Periodic trigger: consult the schedule calculator on an interval and
    /// enqueue whatever is due.
    pub fn spawn_ticker(self: &Arc<Self>, interval: Duration) -> TickerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(self);

        let join = tokio::spawn(async move {
            info!("schedule ticker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {
                        let queued = engine.run_due();
                        if !queued.is_empty() {
                            debug!(count = queued.len(), "tick enqueued due reports");
                        }
                    }
                }
            }
            info!("schedule ticker stopped");
        });

        TickerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}
