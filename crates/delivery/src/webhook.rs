//! Webhook channel: signed JSON manifest POSTs with bounded retry.
//!
//! Timeouts and 5xx responses are transient and retried under the channel's
//! backoff policy. A 4xx response signals misconfiguration, not transience,
//! and fails permanently on the spot.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use reportflow_core::{ExecutionId, ReportId, RetryPolicy};
use reportflow_domain::{ArtifactFormat, DeliveryAttemptStatus, Execution};
use reportflow_signer::UrlSigner;

use crate::router::DeliveryContext;
use crate::transport::{HttpClient, TransportError};

/// Header carrying the hex HMAC of the exact request body.
pub const SIGNATURE_HEADER: &str = "x-reportflow-signature";

/// The documented webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookManifest {
    pub event: String,
    pub report_id: ReportId,
    pub execution_id: ExecutionId,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub files: Vec<ManifestFile>,
    pub results: ManifestResults,
    pub metadata: ManifestMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    pub filename: String,
    pub format: ArtifactFormat,
    pub size: u64,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResults {
    pub record_count: u64,
    pub data_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMetadata {
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

enum Verdict {
    Delivered,
    Transient(String),
    Permanent(String),
}

pub(crate) struct WebhookChannel {
    http: Arc<dyn HttpClient>,
    signer: Arc<UrlSigner>,
    timeout: StdDuration,
    retry: RetryPolicy,
    link_ttl: chrono::Duration,
}

impl WebhookChannel {
    pub(crate) fn new(
        http: Arc<dyn HttpClient>,
        signer: Arc<UrlSigner>,
        timeout: StdDuration,
        retry: RetryPolicy,
        link_ttl: chrono::Duration,
    ) -> Self {
        Self {
            http,
            signer,
            timeout,
            retry,
            link_ttl,
        }
    }

    pub(crate) async fn deliver(&self, ctx: &DeliveryContext<'_>, url: &str) {
        let manifest = self.build_manifest(ctx);
        let payload = match serde_json::to_string(&manifest) {
            Ok(payload) => payload,
            Err(e) => {
                ctx.record(
                    1,
                    DeliveryAttemptStatus::FailedPermanent,
                    Some(format!("manifest serialization failed: {e}")),
                    None,
                );
                return;
            }
        };
        // signature over the canonical payload, the exact bytes on the wire
        let signature = self.signer.sign_payload(payload.as_bytes());
        let headers = [(SIGNATURE_HEADER, signature)];

        let bound = self.retry.attempt_bound();
        for attempt in 1..=bound {
            let outcome =
                tokio::time::timeout(self.timeout, self.http.post_json(url, &payload, &headers))
                    .await;

            let verdict = match outcome {
                Err(_) => Verdict::Transient("request timed out".to_string()),
                Ok(Err(TransportError::Timeout)) => {
                    Verdict::Transient("request timed out".to_string())
                }
                Ok(Err(TransportError::Network(e))) => Verdict::Transient(e),
                Ok(Ok(status)) if status.is_success() => Verdict::Delivered,
                Ok(Ok(status)) if status.is_client_error() => {
                    Verdict::Permanent(format!("endpoint returned {status}"))
                }
                Ok(Ok(status)) => Verdict::Transient(format!("endpoint returned {status}")),
            };

            match verdict {
                Verdict::Delivered => {
                    ctx.record(attempt, DeliveryAttemptStatus::Delivered, None, None);
                    return;
                }
                Verdict::Permanent(error) => {
                    warn!(
                        execution_id = %ctx.execution.id,
                        url,
                        error = %error,
                        "webhook failed permanently"
                    );
                    ctx.record(
                        attempt,
                        DeliveryAttemptStatus::FailedPermanent,
                        Some(error),
                        None,
                    );
                    return;
                }
                Verdict::Transient(error) if attempt < bound => {
                    ctx.record(
                        attempt,
                        DeliveryAttemptStatus::FailedRetrying,
                        Some(error),
                        None,
                    );
                    let delay = self
                        .retry
                        .delay_for_attempt(attempt, ctx.execution.id.jitter_seed());
                    tokio::time::sleep(delay).await;
                }
                Verdict::Transient(error) => {
                    warn!(
                        execution_id = %ctx.execution.id,
                        url,
                        attempts = bound,
                        error = %error,
                        "webhook retry bound exhausted"
                    );
                    ctx.record(
                        attempt,
                        DeliveryAttemptStatus::FailedPermanent,
                        Some(error),
                        None,
                    );
                    return;
                }
            }
        }
    }

    fn build_manifest(&self, ctx: &DeliveryContext<'_>) -> WebhookManifest {
        let execution: &Execution = ctx.execution;
        let now = ctx.clock.now();

        let files = execution
            .artifacts
            .iter()
            .map(|artifact| ManifestFile {
                filename: artifact.filename.clone(),
                format: artifact.format,
                size: artifact.size_bytes,
                download_url: self.signer.issue(&artifact.location, self.link_ttl, now),
            })
            .collect();

        WebhookManifest {
            event: "report.completed".to_string(),
            report_id: execution.report_id,
            execution_id: execution.id,
            status: execution.status.name().to_ascii_lowercase(),
            completed_at: execution.completed_at,
            files,
            results: ManifestResults {
                record_count: execution.record_count,
                data_size: execution.data_size,
            },
            metadata: ManifestMetadata {
                duration_ms: execution.duration_ms().unwrap_or(0),
                timestamp: now,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_serializes_to_documented_shape() {
        let manifest = WebhookManifest {
            event: "report.completed".into(),
            report_id: ReportId::new(),
            execution_id: ExecutionId::new(),
            status: "completed".into(),
            completed_at: None,
            files: vec![ManifestFile {
                filename: "june.pdf".into(),
                format: ArtifactFormat::Pdf,
                size: 1234,
                download_url: "https://files.example.com/a?expires=1&signature=00".into(),
            }],
            results: ManifestResults {
                record_count: 42,
                data_size: 1234,
            },
            metadata: ManifestMetadata {
                duration_ms: 1500,
                timestamp: Utc::now(),
            },
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&manifest).unwrap()).unwrap();

        assert_eq!(json["event"], "report.completed");
        assert!(json["reportId"].is_string());
        assert!(json["executionId"].is_string());
        assert_eq!(json["files"][0]["filename"], "june.pdf");
        assert_eq!(json["files"][0]["format"], "pdf");
        assert!(json["files"][0]["downloadUrl"].is_string());
        assert_eq!(json["results"]["recordCount"], 42);
        assert_eq!(json["results"]["dataSize"], 1234);
        assert_eq!(json["metadata"]["durationMs"], 1500);
    }
}
