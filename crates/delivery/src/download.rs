//! Download channel: pull-only.
//!
//! No push action is taken; the artifacts stay addressable through signed
//! URLs. One `Delivered` row is recorded so the execution's aggregate status
//! can settle, with the issued URLs in the row's detail.

use std::sync::Arc;

use chrono::Duration;

use reportflow_domain::DeliveryAttemptStatus;
use reportflow_signer::UrlSigner;

use crate::router::DeliveryContext;

pub(crate) struct DownloadChannel {
    signer: Arc<UrlSigner>,
    link_ttl: Duration,
}

impl DownloadChannel {
    pub(crate) fn new(signer: Arc<UrlSigner>, link_ttl: Duration) -> Self {
        Self { signer, link_ttl }
    }

    pub(crate) fn deliver(&self, ctx: &DeliveryContext<'_>) {
        let now = ctx.clock.now();
        let urls: Vec<String> = ctx
            .execution
            .artifacts
            .iter()
            .map(|artifact| self.signer.issue(&artifact.location, self.link_ttl, now))
            .collect();

        ctx.record(
            1,
            DeliveryAttemptStatus::Delivered,
            None,
            Some(urls.join(" ")),
        );
    }
}
