//! Delivery recipients and channel addressing.

use serde::{Deserialize, Serialize};

use reportflow_core::{EngineError, EngineResult, RecipientId};

/// Channel discriminant, used for routing and ledger rows.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Sms,
    Webhook,
    Download,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Download => "download",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel-specific target address.
///
/// Each variant carries exactly the fields its channel requires; required
/// fields are checked by the constructors, so a constructed target is always
/// routable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ChannelTarget {
    Email { address: String },
    Sms { number: String },
    Webhook { url: String },
    Download,
}

impl ChannelTarget {
    pub fn email(address: impl Into<String>) -> EngineResult<Self> {
        let address = address.into();
        if !address.contains('@') || address.starts_with('@') || address.ends_with('@') {
            return Err(EngineError::validation(format!(
                "invalid email address: {address:?}"
            )));
        }
        Ok(Self::Email { address })
    }

    pub fn sms(number: impl Into<String>) -> EngineResult<Self> {
        let number = number.into();
        let digits = number.strip_prefix('+').unwrap_or(&number);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(EngineError::validation(format!(
                "invalid phone number: {number:?}"
            )));
        }
        Ok(Self::Sms { number })
    }

    pub fn webhook(url: impl Into<String>) -> EngineResult<Self> {
        let url = url.into();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(EngineError::validation(format!(
                "webhook url must be http(s): {url:?}"
            )));
        }
        Ok(Self::Webhook { url })
    }

    pub fn download() -> Self {
        Self::Download
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelTarget::Email { .. } => ChannelKind::Email,
            ChannelTarget::Sms { .. } => ChannelKind::Sms,
            ChannelTarget::Webhook { .. } => ChannelKind::Webhook,
            ChannelTarget::Download => ChannelKind::Download,
        }
    }
}

/// A delivery target attached to a report definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub target: ChannelTarget,
    pub is_active: bool,
}

impl Recipient {
    pub fn new(target: ChannelTarget) -> Self {
        Self {
            id: RecipientId::new(),
            target,
            is_active: true,
        }
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn kind(&self) -> ChannelKind {
        self.target.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_check_required_fields() {
        assert!(ChannelTarget::email("ops@example.com").is_ok());
        assert!(ChannelTarget::email("nonsense").is_err());
        assert!(ChannelTarget::email("@example.com").is_err());

        assert!(ChannelTarget::sms("+254700000001").is_ok());
        assert!(ChannelTarget::sms("call me").is_err());

        assert!(ChannelTarget::webhook("https://hooks.example.com/r1").is_ok());
        assert!(ChannelTarget::webhook("ftp://example.com").is_err());
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            ChannelTarget::email("a@b.c").unwrap().kind(),
            ChannelKind::Email
        );
        assert_eq!(ChannelTarget::download().kind(), ChannelKind::Download);
    }
}
