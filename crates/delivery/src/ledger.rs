//! Delivery ledger contract.

use reportflow_domain::DeliveryAttempt;

/// Append-only sink for delivery attempts.
///
/// Implemented by the status tracker. Adapters append one row per attempt,
/// success or failure; rows are never mutated or removed; corrections are
/// new rows.
pub trait DeliveryLedger: Send + Sync {
    fn record_delivery_attempt(&self, attempt: DeliveryAttempt);
}
