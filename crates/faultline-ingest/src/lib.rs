//! Faultline ingest: telemetry → facts.
//!
//! - [`source`]: the [`LogFactSource`] / [`TraceFactSource`] contracts
//! - [`jaeger`]: spans and tags from the Jaeger query API
//! - [`elasticsearch`]: flattened log documents from a search index
//! - [`fixtures`]: canned and failing in-memory sources
//! - [`relationships`]: the static dependency graph and its `calls/2` facts
//! - [`context`]: per-request cancellation shared by all of the above

pub mod context;
pub mod elasticsearch;
pub mod fixtures;
pub mod jaeger;
pub mod relationships;
pub mod source;

pub use context::{Cancellation, RequestContext};
pub use elasticsearch::ElasticsearchLogSource;
pub use fixtures::{FailingSource, FixtureLogSource, FixtureTraceSource};
pub use jaeger::JaegerTraceSource;
pub use relationships::{
    ConfigError, RelationshipConfig, RelationshipFactGenerator, ServiceRelationship,
};
pub use source::{Criteria, LogFactSource, SourceError, TraceFactSource};
