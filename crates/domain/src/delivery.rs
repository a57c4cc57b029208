//! Delivery attempts and the per-execution aggregate rollup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reportflow_core::{ExecutionId, RecipientId};

use crate::recipient::ChannelKind;

/// Status of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryAttemptStatus {
    /// Dispatch not yet resolved
    Pending,
    /// The channel accepted the delivery
    Delivered,
    /// Failed, another attempt is coming
    FailedRetrying,
    /// Failed with no further retries
    FailedPermanent,
}

impl DeliveryAttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryAttemptStatus::Delivered | DeliveryAttemptStatus::FailedPermanent
        )
    }
}

/// One row in the per-(execution, recipient) attempt sequence.
///
/// Rows are append-only: a retry appends a new row, never rewrites one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub execution_id: ExecutionId,
    pub recipient_id: RecipientId,
    pub channel: ChannelKind,
    /// 1-indexed position in this recipient's attempt sequence.
    pub attempt: u32,
    pub status: DeliveryAttemptStatus,
    pub at: DateTime<Utc>,
    pub error: Option<String>,
    /// Channel-specific note, e.g. the issued download URL.
    pub detail: Option<String>,
}

impl DeliveryAttempt {
    pub fn new(
        execution_id: ExecutionId,
        recipient_id: RecipientId,
        channel: ChannelKind,
        attempt: u32,
        status: DeliveryAttemptStatus,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            execution_id,
            recipient_id,
            channel,
            attempt,
            status,
            at,
            error: None,
            detail: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Aggregate delivery outcome for one execution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateDeliveryStatus {
    /// Some recipient still has retries outstanding
    Pending,
    /// Every active recipient's latest attempt is delivered
    Delivered,
    /// A mix of delivered and permanently failed recipients
    Partial,
    /// Every recipient permanently failed
    Failed,
}

/// Roll the latest per-recipient statuses up into one aggregate.
///
/// An empty input (no active recipients) is vacuously `Delivered`.
pub fn aggregate_status<'a>(
    latest_per_recipient: impl IntoIterator<Item = &'a DeliveryAttemptStatus>,
) -> AggregateDeliveryStatus {
    let mut total = 0usize;
    let mut delivered = 0usize;
    let mut permanent = 0usize;

    for status in latest_per_recipient {
        total += 1;
        match status {
            DeliveryAttemptStatus::Delivered => delivered += 1,
            DeliveryAttemptStatus::FailedPermanent => permanent += 1,
            DeliveryAttemptStatus::Pending | DeliveryAttemptStatus::FailedRetrying => {}
        }
    }

    if delivered == total {
        AggregateDeliveryStatus::Delivered
    } else if permanent == total {
        AggregateDeliveryStatus::Failed
    } else if delivered + permanent == total {
        AggregateDeliveryStatus::Partial
    } else {
        AggregateDeliveryStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use DeliveryAttemptStatus::*;

    #[test]
    fn all_delivered() {
        assert_eq!(
            aggregate_status([&Delivered, &Delivered]),
            AggregateDeliveryStatus::Delivered
        );
    }

    #[test]
    fn mixed_outcomes_are_partial() {
        assert_eq!(
            aggregate_status([&Delivered, &FailedPermanent]),
            AggregateDeliveryStatus::Partial
        );
    }

    #[test]
    fn all_permanent_failures() {
        assert_eq!(
            aggregate_status([&FailedPermanent, &FailedPermanent]),
            AggregateDeliveryStatus::Failed
        );
    }

    #[test]
    fn outstanding_retries_stay_pending() {
        assert_eq!(
            aggregate_status([&Delivered, &FailedRetrying]),
            AggregateDeliveryStatus::Pending
        );
        assert_eq!(
            aggregate_status([&Pending, &FailedPermanent]),
            AggregateDeliveryStatus::Pending
        );
    }

    #[test]
    fn no_recipients_is_vacuously_delivered() {
        assert_eq!(aggregate_status([]), AggregateDeliveryStatus::Delivered);
    }
}
