//! Jaeger query API → `span/6` and `tag/4` facts.
//!
//! ```text
//! span(TraceID, SpanID, ParentSpanID, Service, Operation, DurationMs)
//! tag(TraceID, SpanID, Key, Value)
//! ```
//!
//! `ParentSpanID` is the span id of the first reference (`""` for roots).
//! Durations arrive in microseconds and are truncated to milliseconds.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use faultline_dsl::{Fact, Value};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::context::RequestContext;
use crate::source::{SourceError, TraceFactSource};

pub const SPAN_PREDICATE: &str = "span";
pub const TAG_PREDICATE: &str = "tag";

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JaegerResponse {
    #[serde(default)]
    pub data: Vec<JaegerTrace>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JaegerTrace {
    #[serde(rename = "traceID", default)]
    pub trace_id: String,
    #[serde(default)]
    pub spans: Vec<JaegerSpan>,
    #[serde(default)]
    pub processes: HashMap<String, JaegerProcess>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JaegerSpan {
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(rename = "spanID")]
    pub span_id: String,
    #[serde(rename = "operationName", default)]
    pub operation_name: String,
    #[serde(default)]
    pub references: Vec<JaegerReference>,
    /// Microseconds.
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub tags: Vec<JaegerTag>,
    #[serde(rename = "processID", default)]
    pub process_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JaegerReference {
    #[serde(rename = "refType", default)]
    pub ref_type: String,
    #[serde(rename = "spanID")]
    pub span_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JaegerTag {
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JaegerProcess {
    #[serde(rename = "serviceName")]
    pub service_name: String,
}

/// Tag values become strings regardless of their JSON type.
pub(crate) fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert a decoded response to facts, in trace/span/tag order.
pub fn trace_facts(response: &JaegerResponse) -> Vec<Fact> {
    let mut facts = Vec::new();
    for trace in &response.data {
        for span in &trace.spans {
            let Some(process) = trace.processes.get(&span.process_id) else {
                debug!(
                    trace_id = %span.trace_id,
                    span_id = %span.span_id,
                    process_id = %span.process_id,
                    "skipping span with unknown process"
                );
                continue;
            };
            let parent = span
                .references
                .first()
                .map(|r| r.span_id.as_str())
                .unwrap_or_default();

            facts.push(Fact::new(
                SPAN_PREDICATE,
                vec![
                    Value::from(span.trace_id.as_str()),
                    Value::from(span.span_id.as_str()),
                    Value::from(parent),
                    Value::from(process.service_name.as_str()),
                    Value::from(span.operation_name.as_str()),
                    Value::Number(span.duration / 1000),
                ],
            ));
            for tag in &span.tags {
                facts.push(Fact::new(
                    TAG_PREDICATE,
                    vec![
                        Value::from(span.trace_id.as_str()),
                        Value::from(span.span_id.as_str()),
                        Value::from(tag.key.as_str()),
                        Value::String(stringify(&tag.value)),
                    ],
                ));
            }
        }
    }
    facts
}

// ============================================================================
// Source
// ============================================================================

pub struct JaegerTraceSource {
    client: Client,
    base_url: String,
}

impl JaegerTraceSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| SourceError::Config(format!("invalid Jaeger URL `{base_url}`: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn traces_url(&self, service_name: &str) -> Result<Url, SourceError> {
        let mut url = Url::parse(&format!("{}/api/traces", self.base_url))
            .map_err(|e| SourceError::Config(e.to_string()))?;
        url.query_pairs_mut().append_pair("service", service_name);
        Ok(url)
    }
}

#[async_trait]
impl TraceFactSource for JaegerTraceSource {
    fn name(&self) -> &str {
        "jaeger"
    }

    async fn fetch_traces(
        &self,
        ctx: &RequestContext,
        service_name: &str,
    ) -> Result<Vec<Fact>, SourceError> {
        let url = self.traces_url(service_name)?;
        let shown = url.to_string();
        debug!(url = %shown, "fetching traces");

        let response = ctx
            .guard(self.client.get(url).send())
            .await?
            .map_err(|e| SourceError::Http {
                url: shown.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = ctx.guard(response.text()).await?.unwrap_or_default();
            warn!(url = %shown, status = status.as_u16(), "Jaeger returned an error status");
            return Err(SourceError::Status {
                url: shown,
                status: status.as_u16(),
                body,
            });
        }

        let decoded: JaegerResponse = ctx
            .guard(response.json())
            .await?
            .map_err(|e| SourceError::Decode {
                url: shown.clone(),
                message: e.to_string(),
            })?;

        let facts = trace_facts(&decoded);
        debug!(
            traces = decoded.data.len(),
            facts = facts.len(),
            "decoded Jaeger traces"
        );
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> JaegerResponse {
        serde_json::from_value(json!({
            "data": [{
                "traceID": "t123",
                "spans": [
                    {
                        "traceID": "t123",
                        "spanID": "spanA",
                        "operationName": "GET /users",
                        "references": [],
                        "startTime": 1,
                        "duration": 150_400,
                        "tags": [
                            {"key": "http.status_code", "type": "int64", "value": 200},
                            {"key": "error", "type": "bool", "value": false}
                        ],
                        "processID": "p1"
                    },
                    {
                        "traceID": "t123",
                        "spanID": "spanB",
                        "operationName": "db_query",
                        "references": [{"refType": "CHILD_OF", "traceID": "t123", "spanID": "spanA"}],
                        "duration": 100_000,
                        "tags": [],
                        "processID": "p2"
                    },
                    {
                        "traceID": "t123",
                        "spanID": "orphan",
                        "operationName": "lost",
                        "duration": 5,
                        "processID": "p9"
                    }
                ],
                "processes": {
                    "p1": {"serviceName": "api-gateway", "tags": []},
                    "p2": {"serviceName": "user-service"}
                }
            }]
        }))
        .expect("decode")
    }

    #[test]
    fn spans_and_tags_become_facts() {
        let rendered: Vec<String> = trace_facts(&sample()).iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                r#"span("t123", "spanA", "", "api-gateway", "GET /users", 150)"#,
                r#"tag("t123", "spanA", "http.status_code", "200")"#,
                r#"tag("t123", "spanA", "error", "false")"#,
                r#"span("t123", "spanB", "spanA", "user-service", "db_query", 100)"#,
            ]
        );
    }

    #[test]
    fn traces_url_encodes_the_service_name() {
        let source = JaegerTraceSource::new("http://jaeger:16686/", Duration::from_secs(1))
            .expect("source");
        let url = source.traces_url("api gateway").expect("url");
        assert_eq!(url.as_str(), "http://jaeger:16686/api/traces?service=api+gateway");
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = JaegerTraceSource::new("not a url", Duration::from_secs(1))
            .err()
            .expect("should fail");
        assert!(matches!(err, SourceError::Config(_)), "{err}");
    }
}
