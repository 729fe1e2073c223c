//! In-memory sources for the `test` environment and for tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use faultline_dsl::{Fact, Value};

use crate::context::RequestContext;
use crate::source::{Criteria, LogFactSource, SourceError, TraceFactSource};

fn strings_and_number(predicate: &str, head: &[&str], n: i64, tail: &[&str]) -> Fact {
    let mut args: Vec<Value> = head.iter().map(|s| Value::from(*s)).collect();
    args.push(Value::Number(n));
    args.extend(tail.iter().map(|s| Value::from(*s)));
    Fact::new(predicate, args)
}

/// Serves a fixed fact list and counts how often it was asked.
#[derive(Debug, Default)]
pub struct FixtureLogSource {
    facts: Vec<Fact>,
    invocations: AtomicUsize,
}

impl FixtureLogSource {
    pub fn new(facts: Vec<Fact>) -> Self {
        Self {
            facts,
            invocations: AtomicUsize::new(0),
        }
    }

    /// `logs(Service, Status, Message)` samples used by `--env test`.
    pub fn canned() -> Self {
        Self::new(vec![
            strings_and_number("logs", &["A"], 200, &["call to B"]),
            strings_and_number("logs", &["B"], 500, &["database error"]),
        ])
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogFactSource for FixtureLogSource {
    fn name(&self) -> &str {
        "fixture-logs"
    }

    async fn fetch_logs(
        &self,
        ctx: &RequestContext,
        _criteria: &Criteria,
    ) -> Result<Vec<Fact>, SourceError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        ctx.check()?;
        Ok(self.facts.clone())
    }
}

#[derive(Debug, Default)]
pub struct FixtureTraceSource {
    facts: Vec<Fact>,
    invocations: AtomicUsize,
}

impl FixtureTraceSource {
    pub fn new(facts: Vec<Fact>) -> Self {
        Self {
            facts,
            invocations: AtomicUsize::new(0),
        }
    }

    /// One two-span trace (`api-gateway` → `user-service` db query) used by
    /// `--env test`.
    pub fn canned() -> Self {
        Self::new(vec![
            strings_and_number(
                "span",
                &["t123", "spanA", "", "api-gateway", "GET /users"],
                150,
                &[],
            ),
            strings_and_number(
                "span",
                &["t123", "spanB", "spanA", "user-service", "db_query"],
                100,
                &[],
            ),
            Fact::new(
                "tag",
                ["t123", "spanA", "http.status_code", "200"]
                    .into_iter()
                    .map(Value::from)
                    .collect(),
            ),
        ])
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TraceFactSource for FixtureTraceSource {
    fn name(&self) -> &str {
        "fixture-traces"
    }

    async fn fetch_traces(
        &self,
        ctx: &RequestContext,
        _service_name: &str,
    ) -> Result<Vec<Fact>, SourceError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        ctx.check()?;
        Ok(self.facts.clone())
    }
}

/// Always fails with an HTTP-style error; usable as either source kind.
#[derive(Debug)]
pub struct FailingSource {
    message: String,
}

impl FailingSource {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn error(&self) -> SourceError {
        SourceError::Http {
            url: "fixture://failing".to_string(),
            message: self.message.clone(),
        }
    }
}

#[async_trait]
impl LogFactSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch_logs(
        &self,
        _ctx: &RequestContext,
        _criteria: &Criteria,
    ) -> Result<Vec<Fact>, SourceError> {
        Err(self.error())
    }
}

#[async_trait]
impl TraceFactSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch_traces(
        &self,
        _ctx: &RequestContext,
        _service_name: &str,
    ) -> Result<Vec<Fact>, SourceError> {
        Err(self.error())
    }
}
