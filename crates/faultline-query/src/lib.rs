//! Faultline query core.
//!
//! A request is a small rule program whose last clause is the question:
//!
//! ```text
//! gateway_crashed(T) :- logs(T, "api-gateway", 500, _).
//! gateway_crashed(T)
//! ```
//!
//! [`QueryOrchestrator::execute`] splits the text ([`request`]), gathers
//! facts from every source ([`aggregate`]), prepends the operator's base
//! rules ([`rules`]), evaluates on a blocking worker, and maps matching facts
//! back to the pattern's variable names ([`project`]). Nothing survives the
//! request.

pub mod aggregate;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod project;
pub mod request;
pub mod rules;

pub use aggregate::FactAggregator;
pub use error::{ErrorKind, QueryError, QueryShapeError};
pub use faultline_ingest::{Cancellation, RequestContext};
pub use model::{BindingValue, QueryRequest, QueryResponse, ResultBinding};
pub use orchestrator::{QueryOrchestrator, QueryServiceConfig, DEFAULT_TRACE_SERVICE};
pub use project::project;
pub use request::{parse_request, RequestProgram};
pub use rules::{assemble_program, BaseRules};
