//! Report generation collaborator contract.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use reportflow_domain::{GeneratedReport, ReportDefinition};

/// Failure of one generation attempt.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// Worth retrying under the attempt bound.
    #[error("transient generation failure: {0}")]
    Transient(String),
    /// Misconfiguration or bad input; retrying cannot help.
    #[error("permanent generation failure: {0}")]
    Permanent(String),
}

/// The external report renderer.
///
/// Produces the complete artifact set or a typed error, never a partial
/// set. The engine treats an attempt timeout identically to a `Transient`
/// error from this call.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(
        &self,
        definition: &ReportDefinition,
        parameters: &JsonValue,
    ) -> Result<GeneratedReport, GenerationError>;
}
