//! Execution worker pool.
//!
//! A fixed-size set of tokio workers, each looping: shutdown check → claim
//! the next ready execution → run one attempt. Workers block only on the
//! generation collaborator (bounded by the attempt timeout) and on delivery
//! fanout (each outbound call bounded by its channel's timeout). Shutdown is
//! graceful: in-flight attempts finish, nothing is silently dropped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use reportflow_core::Clock;
use reportflow_delivery::DeliveryRouter;
use reportflow_domain::{Execution, ExecutionStatus, GeneratedReport, ReportDefinition, next_run_for};

use crate::definitions::DefinitionStore;
use crate::dispatcher::{Dispatcher, FailureDisposition};
use crate::generate::{GenerationError, ReportGenerator};
use crate::queue::ExecutionQueue;
use crate::tracker::{ExecutionTransition, StatusTracker};

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// How often an idle worker re-checks the queue
    pub poll_interval: Duration,
    /// Per-attempt generation timeout; exceeding it counts as a transient
    /// failure
    pub attempt_timeout: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(300),
            name: "report-worker".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PoolStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed_transient: u64,
    pub failed_terminal: u64,
    pub cancelled: u64,
    pub current_running: usize,
}

/// Handle to a running pool.
#[derive(Debug)]
pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<PoolStats>>,
}

impl WorkerPoolHandle {
    /// Request graceful shutdown and wait for every worker to stop. In-flight
    /// attempts run to completion.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for join in self.joins.drain(..) {
            let _ = join.await;
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.lock().unwrap().clone()
    }
}

enum AttemptOutcome {
    Succeeded {
        definition: ReportDefinition,
        report: GeneratedReport,
    },
    Failed {
        error: String,
        retryable: bool,
    },
}

pub struct WorkerPool {
    queue: Arc<ExecutionQueue>,
    dispatcher: Arc<Dispatcher>,
    tracker: Arc<StatusTracker>,
    definitions: Arc<dyn DefinitionStore>,
    generator: Arc<dyn ReportGenerator>,
    router: Arc<DeliveryRouter>,
    clock: Arc<dyn Clock>,
    config: WorkerPoolConfig,
    stats: Arc<Mutex<PoolStats>>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<ExecutionQueue>,
        dispatcher: Arc<Dispatcher>,
        tracker: Arc<StatusTracker>,
        definitions: Arc<dyn DefinitionStore>,
        generator: Arc<dyn ReportGenerator>,
        router: Arc<DeliveryRouter>,
        clock: Arc<dyn Clock>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            tracker,
            definitions,
            generator,
            router,
            clock,
            config,
            stats: Arc::new(Mutex::new(PoolStats::default())),
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.lock().unwrap().clone()
    }

    /// Spawn the fixed-size worker set.
    pub fn spawn(self: &Arc<Self>) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let joins = (0..self.config.workers.max(1))
            .map(|index| {
                let pool = Arc::clone(self);
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move { pool.worker_loop(index, shutdown).await })
            })
            .collect();

        WorkerPoolHandle {
            shutdown: shutdown_tx,
            joins,
            stats: self.stats.clone(),
        }
    }

    async fn worker_loop(&self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        info!(worker, pool = %self.config.name, "execution worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.queue.claim_next(self.clock.now()) {
                Some(execution) => self.run_claimed(execution).await,
                None => {
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        info!(worker, pool = %self.config.name, "execution worker stopped");
    }

    /// Claim and run at most one ready execution; returns whether anything
    /// was claimed. Lets tests drive attempts synchronously.
    pub async fn run_once(&self) -> bool {
        match self.queue.claim_next(self.clock.now()) {
            Some(execution) => {
                self.run_claimed(execution).await;
                true
            }
            None => false,
        }
    }

    async fn run_claimed(&self, mut execution: Execution) {
        {
            let mut stats = self.stats.lock().unwrap();
            stats.current_running += 1;
        }

        let started_at = execution.started_at.unwrap_or_else(|| self.clock.now());
        self.tracker.record_execution_transition(ExecutionTransition {
            execution_id: execution.id,
            report_id: execution.report_id,
            from: Some(ExecutionStatus::Queued),
            to: ExecutionStatus::Running,
            at: started_at,
        });
        debug!(
            execution_id = %execution.id,
            report_id = %execution.report_id,
            attempt = execution.attempt,
            "attempt started"
        );

        let outcome = match self.definitions.get(execution.report_id) {
            Ok(definition) => {
                let generated = tokio::time::timeout(
                    self.config.attempt_timeout,
                    self.generator.generate(&definition, &execution.parameters),
                )
                .await;

                match generated {
                    Err(_) => AttemptOutcome::Failed {
                        error: format!(
                            "generation timed out after {}ms",
                            self.config.attempt_timeout.as_millis()
                        ),
                        retryable: true,
                    },
                    Ok(Err(GenerationError::Transient(e))) => AttemptOutcome::Failed {
                        error: e,
                        retryable: true,
                    },
                    Ok(Err(GenerationError::Permanent(e))) => AttemptOutcome::Failed {
                        error: e,
                        retryable: false,
                    },
                    Ok(Ok(report)) => AttemptOutcome::Succeeded { definition, report },
                }
            }
            Err(e) => AttemptOutcome::Failed {
                error: e.to_string(),
                retryable: false,
            },
        };

        // safe boundary: a cancel that landed while the attempt ran discards
        // its result (never delivered) and stops any retry
        if self.queue.cancel_requested(execution.id) {
            let now = self.clock.now();
            execution.mark_cancelled(now);
            self.tracker.record_execution_transition(ExecutionTransition {
                execution_id: execution.id,
                report_id: execution.report_id,
                from: Some(ExecutionStatus::Running),
                to: ExecutionStatus::Cancelled,
                at: now,
            });
            self.queue.finish(&execution);
            info!(execution_id = %execution.id, "execution cancelled, result discarded");

            let mut stats = self.stats.lock().unwrap();
            stats.cancelled += 1;
            stats.processed += 1;
            stats.current_running = stats.current_running.saturating_sub(1);
            return;
        }

        match outcome {
            AttemptOutcome::Succeeded { definition, report } => {
                let now = self.clock.now();
                execution.mark_completed(report, now);
                self.tracker.record_execution_transition(ExecutionTransition {
                    execution_id: execution.id,
                    report_id: execution.report_id,
                    from: Some(ExecutionStatus::Running),
                    to: ExecutionStatus::Completed,
                    at: now,
                });
                self.queue.finish(&execution);
                self.write_back_schedule(&definition);
                info!(
                    execution_id = %execution.id,
                    report_id = %execution.report_id,
                    artifacts = execution.artifacts.len(),
                    "execution completed"
                );

                {
                    let mut stats = self.stats.lock().unwrap();
                    stats.succeeded += 1;
                }

                self.router.deliver(&definition, &execution).await;
            }
            AttemptOutcome::Failed { error, retryable } => {
                let disposition = self.dispatcher.dispose_failure(execution, error, retryable);
                let mut stats = self.stats.lock().unwrap();
                match disposition {
                    FailureDisposition::Retrying { .. } => stats.failed_transient += 1,
                    FailureDisposition::Exhausted => stats.failed_terminal += 1,
                }
            }
        }

        let mut stats = self.stats.lock().unwrap();
        stats.processed += 1;
        stats.current_running = stats.current_running.saturating_sub(1);
    }

    /// Completed-run bookkeeping on the definition store: `run_count` bump,
    /// `last_run_at`, and the next scheduled tick computed against the
    /// updated run count.
    fn write_back_schedule(&self, definition: &ReportDefinition) {
        let now = self.clock.now();
        let mut updated = definition.clone();
        updated.run_count += 1;
        updated.last_run_at = Some(now);
        let next = next_run_for(&updated, now);

        if let Err(e) = self.definitions.record_run(definition.id, now, next) {
            error!(
                report_id = %definition.id,
                error = %e,
                "failed to write back schedule state"
            );
        }
    }
}
