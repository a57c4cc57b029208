//! Fanout of a completed execution to its recipients.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use futures::future;
use tracing::debug;

use reportflow_core::{Clock, RetryPolicy};
use reportflow_domain::{
    ChannelTarget, DeliveryAttempt, DeliveryAttemptStatus, Execution, Recipient, ReportDefinition,
};
use reportflow_signer::UrlSigner;

use crate::download::DownloadChannel;
use crate::email::EmailChannel;
use crate::ledger::DeliveryLedger;
use crate::sms::SmsChannel;
use crate::transport::{BlobStore, HttpClient, MailTransport, SmsTransport};
use crate::webhook::WebhookChannel;

/// Per-channel tuning. Defaults follow the channel table: email attaches
/// inline under 10 MiB, SMS links live 24h, webhooks time out after 10s and
/// retry twice (1s then 2s) before failing permanently.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Attach artifacts inline when their aggregate size is at or under this.
    pub email_inline_limit_bytes: u64,
    pub email_link_ttl: Duration,
    pub sms_link_ttl: Duration,
    /// Character budget of the SMS channel.
    pub sms_length_budget: usize,
    pub webhook_timeout: StdDuration,
    pub webhook_retry: RetryPolicy,
    pub webhook_link_ttl: Duration,
    pub download_link_ttl: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            email_inline_limit_bytes: 10 * 1024 * 1024,
            email_link_ttl: Duration::hours(72),
            sms_link_ttl: Duration::hours(24),
            sms_length_budget: 160,
            webhook_timeout: StdDuration::from_secs(10),
            webhook_retry: RetryPolicy {
                max_retries: 2,
                base_delay: StdDuration::from_secs(1),
                max_delay: StdDuration::from_secs(30),
                jitter: 0.0,
                ..Default::default()
            },
            webhook_link_ttl: Duration::hours(72),
            download_link_ttl: Duration::days(7),
        }
    }
}

impl DeliveryConfig {
    pub fn with_email_inline_limit(mut self, bytes: u64) -> Self {
        self.email_inline_limit_bytes = bytes;
        self
    }

    pub fn with_sms_length_budget(mut self, budget: usize) -> Self {
        self.sms_length_budget = budget;
        self
    }

    pub fn with_webhook_timeout(mut self, timeout: StdDuration) -> Self {
        self.webhook_timeout = timeout;
        self
    }

    pub fn with_webhook_retry(mut self, retry: RetryPolicy) -> Self {
        self.webhook_retry = retry;
        self
    }
}

/// The outbound collaborators the router fans out through.
#[derive(Clone)]
pub struct Transports {
    pub mail: Arc<dyn MailTransport>,
    pub sms: Arc<dyn SmsTransport>,
    pub http: Arc<dyn HttpClient>,
    pub blobs: Arc<dyn BlobStore>,
}

/// Everything one recipient's delivery needs, bundled for the adapters.
pub(crate) struct DeliveryContext<'a> {
    pub definition: &'a ReportDefinition,
    pub execution: &'a Execution,
    pub recipient: &'a Recipient,
    pub ledger: &'a dyn DeliveryLedger,
    pub clock: &'a dyn Clock,
}

impl DeliveryContext<'_> {
    /// Append one attempt row for this recipient.
    pub fn record(
        &self,
        attempt: u32,
        status: DeliveryAttemptStatus,
        error: Option<String>,
        detail: Option<String>,
    ) {
        let mut row = DeliveryAttempt::new(
            self.execution.id,
            self.recipient.id,
            self.recipient.kind(),
            attempt,
            status,
            self.clock.now(),
        );
        row.error = error;
        row.detail = detail;

        debug!(
            execution_id = %self.execution.id,
            recipient_id = %self.recipient.id,
            channel = %row.channel,
            attempt,
            status = ?row.status,
            "delivery attempt recorded"
        );
        self.ledger.record_delivery_attempt(row);
    }
}

/// Routes a completed execution to each active recipient's channel adapter.
pub struct DeliveryRouter {
    email: EmailChannel,
    sms: SmsChannel,
    webhook: WebhookChannel,
    download: DownloadChannel,
    ledger: Arc<dyn DeliveryLedger>,
    clock: Arc<dyn Clock>,
}

impl DeliveryRouter {
    pub fn new(
        config: DeliveryConfig,
        signer: Arc<UrlSigner>,
        transports: Transports,
        ledger: Arc<dyn DeliveryLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            email: EmailChannel::new(
                transports.mail,
                transports.blobs,
                signer.clone(),
                config.email_inline_limit_bytes,
                config.email_link_ttl,
            ),
            sms: SmsChannel::new(
                transports.sms,
                signer.clone(),
                config.sms_link_ttl,
                config.sms_length_budget,
            ),
            webhook: WebhookChannel::new(
                transports.http,
                signer.clone(),
                config.webhook_timeout,
                config.webhook_retry,
                config.webhook_link_ttl,
            ),
            download: DownloadChannel::new(signer, config.download_link_ttl),
            ledger,
            clock,
        }
    }

    /// Fan a completed execution out to every active recipient.
    ///
    /// Recipients are dispatched concurrently and independently: the failure
    /// or success of one never touches another's attempt sequence, and a slow
    /// recipient cannot stall the others (each outbound call carries its own
    /// timeout).
    pub async fn deliver(&self, definition: &ReportDefinition, execution: &Execution) {
        let dispatches: Vec<_> = definition
            .active_recipients()
            .map(|recipient| self.deliver_one(definition, execution, recipient))
            .collect();
        future::join_all(dispatches).await;
    }

    async fn deliver_one(
        &self,
        definition: &ReportDefinition,
        execution: &Execution,
        recipient: &Recipient,
    ) {
        let ctx = DeliveryContext {
            definition,
            execution,
            recipient,
            ledger: self.ledger.as_ref(),
            clock: self.clock.as_ref(),
        };

        match &recipient.target {
            ChannelTarget::Email { address } => self.email.deliver(&ctx, address).await,
            ChannelTarget::Sms { number } => self.sms.deliver(&ctx, number).await,
            ChannelTarget::Webhook { url } => self.webhook.deliver(&ctx, url).await,
            ChannelTarget::Download => self.download.deliver(&ctx),
        }
    }
}
