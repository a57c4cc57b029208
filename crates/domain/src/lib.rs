//! `reportflow-domain`: report definitions, schedules, executions, and
//! delivery state.
//!
//! Pure domain model: no IO, no internal clock reads. Time enters only as
//! explicit arguments, so everything here reproduces exactly in tests.

pub mod delivery;
pub mod execution;
pub mod recipient;
pub mod report;
pub mod schedule;

pub use delivery::{
    AggregateDeliveryStatus, DeliveryAttempt, DeliveryAttemptStatus, aggregate_status,
};
pub use execution::{
    Artifact, ArtifactFormat, Execution, ExecutionStatus, GeneratedReport, Priority,
};
pub use recipient::{ChannelKind, ChannelTarget, Recipient};
pub use report::{ReportDefinition, ReportLifecycle};
pub use schedule::{Frequency, ScheduleSpec, next_run_for};
