//! Outbound transport contracts.
//!
//! The engine consumes mail, SMS, HTTP, and blob storage as opaque
//! collaborators: each is a single send-and-get-outcome call, bounded by its
//! own timeout. No transport error ever escapes the delivery layer raw.

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single transport call.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("transport timeout")]
    Timeout,
    #[error("network failure: {0}")]
    Network(String),
}

/// Fully assembled outbound email.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<EmailAttachment>,
}

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

/// Minimal response view the webhook channel needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpStatus(pub u16);

impl HttpStatus {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.0)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.0)
    }
}

impl std::fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError>;
}

#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, message: &SmsMessage) -> Result<(), TransportError>;
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POST a JSON body; returns the response status.
    async fn post_json(
        &self,
        url: &str,
        body: &str,
        headers: &[(&str, String)],
    ) -> Result<HttpStatus, TransportError>;
}

/// Read side of the blob/object store artifacts live in.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the bytes behind an opaque artifact location.
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, TransportError>;
}
