//! Fact source contracts.
//!
//! Sources are consulted once per request and never cache between requests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use faultline_dsl::Fact;
use thiserror::Error;

use crate::context::{Cancellation, RequestContext};

/// Field → value filter handed to log sources. Ordered so generated backend
/// queries are deterministic.
pub type Criteria = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("{url} returned status {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("invalid source configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Canceled(#[from] Cancellation),
}

impl SourceError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, SourceError::Canceled(_))
    }
}

#[async_trait]
pub trait LogFactSource: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    async fn fetch_logs(
        &self,
        ctx: &RequestContext,
        criteria: &Criteria,
    ) -> Result<Vec<Fact>, SourceError>;
}

#[async_trait]
pub trait TraceFactSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_traces(
        &self,
        ctx: &RequestContext,
        service_name: &str,
    ) -> Result<Vec<Fact>, SourceError>;
}
