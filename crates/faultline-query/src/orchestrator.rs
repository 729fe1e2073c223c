//! Per-request pipeline: parse → aggregate → assemble → evaluate → project.

use std::sync::Arc;
use std::time::{Duration, Instant};

use faultline_dsl::digest::program_digest_v1;
use faultline_engine::{Closure, EvalError, EvalLimits, Program, RuleEvaluator, SemiNaiveEvaluator};
use faultline_ingest::{
    Cancellation, LogFactSource, RelationshipConfig, RelationshipFactGenerator, RequestContext,
    TraceFactSource,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::aggregate::FactAggregator;
use crate::error::{ErrorKind, QueryError};
use crate::model::{QueryRequest, QueryResponse};
use crate::project::project;
use crate::request::parse_request;
use crate::rules::{assemble_program, BaseRules};

/// Service used for the trace fetch when none is configured.
pub const DEFAULT_TRACE_SERVICE: &str = "api-gateway";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryServiceConfig {
    /// Service name passed to the trace source on every request.
    pub trace_service: String,
    /// Upper bound on the evaluation step alone.
    pub eval_timeout: Option<Duration>,
    pub max_derived_facts: Option<usize>,
}

impl Default for QueryServiceConfig {
    fn default() -> Self {
        Self {
            trace_service: DEFAULT_TRACE_SERVICE.to_string(),
            eval_timeout: None,
            max_derived_facts: None,
        }
    }
}

/// Everything a request needs; built once at startup and shared read-only.
pub struct QueryOrchestrator {
    aggregator: FactAggregator,
    base_rules: BaseRules,
    evaluator: Arc<dyn RuleEvaluator>,
    config: QueryServiceConfig,
}

impl QueryOrchestrator {
    pub fn new(
        config: QueryServiceConfig,
        logs: Arc<dyn LogFactSource>,
        traces: Arc<dyn TraceFactSource>,
        relationships: Arc<RelationshipConfig>,
        base_rules: BaseRules,
    ) -> Self {
        let evaluator = SemiNaiveEvaluator::with_limits(EvalLimits {
            max_derived_facts: config.max_derived_facts,
        });
        let aggregator = FactAggregator::new(
            logs,
            traces,
            RelationshipFactGenerator::new(relationships),
            config.trace_service.clone(),
        );
        Self {
            aggregator,
            base_rules,
            evaluator: Arc::new(evaluator),
            config,
        }
    }

    /// Build from a pre-assembled aggregator (e.g. one with an unloaded
    /// relationship generator or custom criteria).
    pub fn from_parts(
        config: QueryServiceConfig,
        aggregator: FactAggregator,
        base_rules: BaseRules,
        evaluator: Arc<dyn RuleEvaluator>,
    ) -> Self {
        Self {
            aggregator,
            base_rules,
            evaluator,
            config,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &QueryServiceConfig {
        &self.config
    }

    pub fn base_rules(&self) -> &BaseRules {
        &self.base_rules
    }

    pub async fn execute(
        &self,
        ctx: &RequestContext,
        request: &QueryRequest,
    ) -> Result<QueryResponse, QueryError> {
        let digest = program_digest_v1(&request.query);
        let span = info_span!("query", digest = %digest);
        async {
            let started = Instant::now();
            let result = self.run(ctx, request).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(response) => info!(results = response.count, elapsed_ms, "query answered"),
                Err(e) if e.kind() == ErrorKind::InvalidInput => {
                    warn!(error = %e, elapsed_ms, "rejected query")
                }
                Err(e) => error!(error = %e, elapsed_ms, "query failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        request: &QueryRequest,
    ) -> Result<QueryResponse, QueryError> {
        // Parsed before any source is touched: a malformed request never
        // costs a fetch.
        let parsed = parse_request(&request.query)?;
        debug!(
            request_rules = parsed.rules.len(),
            pattern = %parsed.pattern,
            "parsed request"
        );

        let facts = self.aggregator.aggregate(ctx).await?;
        let program = assemble_program(&self.base_rules, parsed.rules, facts);
        debug!(
            rules = program.rules.len(),
            facts = program.facts.len(),
            "assembled program"
        );

        let closure = self.evaluate(ctx, program).await?;
        closure.check_pattern(&parsed.pattern)?;
        let matched = closure.matches(&parsed.pattern);
        let results = project(&parsed.pattern, &matched)?;
        Ok(QueryResponse::new(results))
    }

    /// Evaluate on the blocking pool; the request context (narrowed by the
    /// evaluation timeout) both races the task and is polled inside it.
    async fn evaluate(&self, ctx: &RequestContext, program: Program) -> Result<Closure, QueryError> {
        let eval_ctx = match self.config.eval_timeout {
            Some(timeout) => ctx.clone().with_timeout(timeout),
            None => ctx.clone(),
        };
        let evaluator = Arc::clone(&self.evaluator);
        let interrupt = eval_ctx.interrupt();
        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || evaluator.evaluate(&program, &interrupt));

        let outcome = eval_ctx
            .guard(task)
            .await?
            .map_err(|e| QueryError::Worker(e.to_string()))?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "evaluation step finished"
        );

        match outcome {
            Ok(closure) => Ok(closure),
            Err(EvalError::Interrupted) => Err(QueryError::Canceled(
                eval_ctx.check().err().unwrap_or(Cancellation::Canceled),
            )),
            Err(e) => Err(QueryError::Evaluation(e)),
        }
    }
}
