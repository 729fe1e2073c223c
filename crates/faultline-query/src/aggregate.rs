//! Collects one request's facts from every source.

use std::sync::Arc;
use std::time::Instant;

use faultline_dsl::Fact;
use faultline_ingest::{
    Criteria, LogFactSource, RelationshipFactGenerator, RequestContext, TraceFactSource,
};
use tracing::debug;

use crate::error::QueryError;

/// Fetches logs and traces concurrently and appends relationship facts.
///
/// The merged order is always logs, traces, relationships. Any failure
/// (including cancellation) fails the whole aggregation.
pub struct FactAggregator {
    logs: Arc<dyn LogFactSource>,
    traces: Arc<dyn TraceFactSource>,
    relationships: RelationshipFactGenerator,
    trace_service: String,
    criteria: Criteria,
}

impl FactAggregator {
    pub fn new(
        logs: Arc<dyn LogFactSource>,
        traces: Arc<dyn TraceFactSource>,
        relationships: RelationshipFactGenerator,
        trace_service: impl Into<String>,
    ) -> Self {
        Self {
            logs,
            traces,
            relationships,
            trace_service: trace_service.into(),
            criteria: Criteria::new(),
        }
    }

    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn trace_service(&self) -> &str {
        &self.trace_service
    }

    pub async fn aggregate(&self, ctx: &RequestContext) -> Result<Vec<Fact>, QueryError> {
        ctx.check()?;
        let started = Instant::now();
        let relationship_facts = self.relationships.generate()?;

        let logs = async {
            self.logs
                .fetch_logs(ctx, &self.criteria)
                .await
                .map_err(|error| QueryError::SourceFetch {
                    source_name: self.logs.name().to_string(),
                    error,
                })
        };
        let traces = async {
            self.traces
                .fetch_traces(ctx, &self.trace_service)
                .await
                .map_err(|error| QueryError::SourceFetch {
                    source_name: self.traces.name().to_string(),
                    error,
                })
        };
        // try_join drops the sibling fetch as soon as one side fails.
        let (log_facts, trace_facts) = ctx.guard(async { tokio::try_join!(logs, traces) }).await??;

        debug!(
            logs = log_facts.len(),
            traces = trace_facts.len(),
            relationships = relationship_facts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregated facts"
        );

        let mut facts =
            Vec::with_capacity(log_facts.len() + trace_facts.len() + relationship_facts.len());
        facts.extend(log_facts);
        facts.extend(trace_facts);
        facts.extend(relationship_facts);
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use faultline_dsl::Value;
    use faultline_ingest::{
        FixtureTraceSource, RelationshipConfig, ServiceRelationship, SourceError,
    };

    use super::*;

    /// Log source that answers only after `delay`, so traces always win the race.
    struct SlowLogSource {
        delay: Duration,
        finished: AtomicBool,
    }

    impl SlowLogSource {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                finished: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl LogFactSource for SlowLogSource {
        fn name(&self) -> &str {
            "slow-logs"
        }

        async fn fetch_logs(
            &self,
            ctx: &RequestContext,
            _criteria: &Criteria,
        ) -> Result<Vec<Fact>, SourceError> {
            ctx.guard(tokio::time::sleep(self.delay)).await?;
            self.finished.store(true, Ordering::SeqCst);
            Ok(vec![Fact::new("l", vec![Value::from("slow")])])
        }
    }

    fn aggregator(logs: Arc<SlowLogSource>) -> FactAggregator {
        let config = RelationshipConfig::new(vec![ServiceRelationship {
            service: "api-gateway".to_string(),
            depends_on: vec!["order-service".to_string()],
        }]);
        FactAggregator::new(
            logs,
            Arc::new(FixtureTraceSource::new(vec![Fact::new(
                "t",
                vec![Value::from("fast")],
            )])),
            RelationshipFactGenerator::new(Arc::new(config)),
            "api-gateway",
        )
    }

    #[tokio::test]
    async fn merged_order_ignores_completion_order() {
        let logs = Arc::new(SlowLogSource::new(Duration::from_millis(50)));
        let facts = aggregator(logs.clone())
            .aggregate(&RequestContext::new())
            .await
            .expect("aggregate");

        let predicates: Vec<&str> = facts.iter().map(|f| f.predicate.as_str()).collect();
        assert_eq!(predicates, ["l", "t", "calls"]);
        assert!(logs.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_mid_fetch_fails_the_aggregation() {
        let logs = Arc::new(SlowLogSource::new(Duration::from_secs(5)));
        let aggregator = aggregator(logs.clone());
        let ctx = RequestContext::new();

        let canceler = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceler.cancel();
        });

        let started = Instant::now();
        let err = aggregator.aggregate(&ctx).await.expect_err("canceled");
        assert!(err.is_canceled(), "err={err}");
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!logs.finished.load(Ordering::SeqCst));
    }
}
