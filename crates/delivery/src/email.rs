//! Email channel: inline attachments under the size threshold, signed links
//! otherwise.

use std::sync::Arc;

use chrono::Duration;
use tracing::warn;

use reportflow_domain::DeliveryAttemptStatus;
use reportflow_signer::UrlSigner;

use crate::router::DeliveryContext;
use crate::transport::{BlobStore, EmailAttachment, EmailMessage, MailTransport, TransportError};

pub(crate) struct EmailChannel {
    transport: Arc<dyn MailTransport>,
    blobs: Arc<dyn BlobStore>,
    signer: Arc<UrlSigner>,
    inline_limit_bytes: u64,
    link_ttl: Duration,
}

impl EmailChannel {
    pub(crate) fn new(
        transport: Arc<dyn MailTransport>,
        blobs: Arc<dyn BlobStore>,
        signer: Arc<UrlSigner>,
        inline_limit_bytes: u64,
        link_ttl: Duration,
    ) -> Self {
        Self {
            transport,
            blobs,
            signer,
            inline_limit_bytes,
            link_ttl,
        }
    }

    /// Send the report email, with one internal retry on transport failure.
    pub(crate) async fn deliver(&self, ctx: &DeliveryContext<'_>, address: &str) {
        for attempt in 1..=2u32 {
            match self.send_once(ctx, address).await {
                Ok(()) => {
                    ctx.record(attempt, DeliveryAttemptStatus::Delivered, None, None);
                    return;
                }
                Err(e) if attempt == 1 => {
                    warn!(
                        execution_id = %ctx.execution.id,
                        error = %e,
                        "email send failed, retrying once"
                    );
                    ctx.record(
                        attempt,
                        DeliveryAttemptStatus::FailedRetrying,
                        Some(e.to_string()),
                        None,
                    );
                }
                Err(e) => {
                    ctx.record(
                        attempt,
                        DeliveryAttemptStatus::FailedPermanent,
                        Some(e.to_string()),
                        None,
                    );
                }
            }
        }
    }

    async fn send_once(&self, ctx: &DeliveryContext<'_>, address: &str) -> Result<(), TransportError> {
        let execution = ctx.execution;
        let inline = execution.data_size <= self.inline_limit_bytes;

        let mut body = format!(
            "Your report \"{}\" is ready: {} file(s), {} record(s).\n",
            ctx.definition.name,
            execution.artifacts.len(),
            execution.record_count,
        );

        let mut attachments = Vec::new();
        if inline {
            for artifact in &execution.artifacts {
                let bytes = self.blobs.fetch(&artifact.location).await?;
                attachments.push(EmailAttachment {
                    filename: artifact.filename.clone(),
                    content_type: artifact.format.mime_type().to_string(),
                    bytes,
                });
            }
        } else {
            body.push_str("\nDownload links:\n");
            for artifact in &execution.artifacts {
                let url = self
                    .signer
                    .issue(&artifact.location, self.link_ttl, ctx.clock.now());
                body.push_str(&format!("  {}: {}\n", artifact.filename, url));
            }
        }

        self.transport
            .send(&EmailMessage {
                to: address.to_string(),
                subject: format!("Report ready: {}", ctx.definition.name),
                body,
                attachments,
            })
            .await
    }
}
