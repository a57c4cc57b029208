//! `reportflow-engine`: the execution queue, worker pool, status ledger, and
//! engine facade.
//!
//! The engine is an explicit, constructible assembly (no global queue
//! singleton): whoever builds a [`ReportEngine`] owns its lifecycle: start,
//! drain, shutdown.

pub mod definitions;
pub mod dispatcher;
pub mod generate;
pub mod queue;
pub mod service;
pub mod tracker;
pub mod worker;

pub use definitions::{DefinitionStore, InMemoryDefinitionStore};
pub use dispatcher::{Dispatcher, FailureDisposition};
pub use generate::{GenerationError, ReportGenerator};
pub use queue::{CancelOutcome, ExecutionQueue};
pub use service::{EngineConfig, ReportEngine, TickerHandle};
pub use tracker::{
    DeliveryStatusView, ExecutionStatusView, ExecutionTransition, RecipientDeliveryView,
    StatusTracker,
};
pub use worker::{PoolStats, WorkerPool, WorkerPoolConfig, WorkerPoolHandle};
