//! `reportflow-delivery`: multi-channel fanout of completed executions.
//!
//! One completed execution fans out to every active recipient concurrently
//! and independently through a channel adapter (email, SMS, webhook,
//! download). Each adapter owns its channel's retry/timeout policy and
//! appends one [`reportflow_domain::DeliveryAttempt`] per attempt, success or
//! failure, through the [`DeliveryLedger`].

pub mod download;
pub mod email;
pub mod ledger;
pub mod reqwest_client;
pub mod router;
pub mod sms;
pub mod transport;
pub mod webhook;

pub use ledger::DeliveryLedger;
pub use reqwest_client::ReqwestHttpClient;
pub use router::{DeliveryConfig, DeliveryRouter, Transports};
pub use transport::{
    BlobStore, EmailAttachment, EmailMessage, HttpClient, HttpStatus, MailTransport, SmsMessage,
    SmsTransport, TransportError,
};
pub use webhook::{ManifestFile, ManifestMetadata, ManifestResults, SIGNATURE_HEADER, WebhookManifest};
