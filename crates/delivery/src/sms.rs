//! SMS channel: a short message around a signed download URL.

use std::sync::Arc;

use chrono::Duration;

use reportflow_domain::DeliveryAttemptStatus;
use reportflow_signer::UrlSigner;

use crate::router::DeliveryContext;
use crate::transport::{SmsMessage, SmsTransport};

pub(crate) struct SmsChannel {
    transport: Arc<dyn SmsTransport>,
    signer: Arc<UrlSigner>,
    link_ttl: Duration,
    length_budget: usize,
}

impl SmsChannel {
    pub(crate) fn new(
        transport: Arc<dyn SmsTransport>,
        signer: Arc<UrlSigner>,
        link_ttl: Duration,
        length_budget: usize,
    ) -> Self {
        Self {
            transport,
            signer,
            link_ttl,
            length_budget,
        }
    }

    /// Single attempt, no retry beyond the transport's own.
    pub(crate) async fn deliver(&self, ctx: &DeliveryContext<'_>, number: &str) {
        let url = self.signer.issue(
            &format!("executions/{}", ctx.execution.id),
            self.link_ttl,
            ctx.clock.now(),
        );
        let body = self.compose(ctx, &url);

        match self
            .transport
            .send(&SmsMessage {
                to: number.to_string(),
                body,
            })
            .await
        {
            Ok(()) => ctx.record(1, DeliveryAttemptStatus::Delivered, None, Some(url)),
            Err(e) => ctx.record(
                1,
                DeliveryAttemptStatus::FailedPermanent,
                Some(e.to_string()),
                Some(url),
            ),
        }
    }

    /// Fit the message into the channel's length budget by dropping detail.
    /// The URL itself is never truncated.
    fn compose(&self, ctx: &DeliveryContext<'_>, url: &str) -> String {
        let hours = self.link_ttl.num_hours();
        let full = format!(
            "{}: report ready ({} files, {} records). {} (expires in {}h)",
            ctx.definition.name,
            ctx.execution.artifacts.len(),
            ctx.execution.record_count,
            url,
            hours,
        );
        if full.chars().count() <= self.length_budget {
            return full;
        }

        format!("Report ready: {url}")
    }
}
