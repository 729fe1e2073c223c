//! Elasticsearch search → `log.field/3` facts.
//!
//! Every hit's `_source` is flattened to `key → string` pairs (nested objects
//! joined with `.`, arrays kept as JSON text) and each pair becomes
//! `log.field(DocId, Key, Value)`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use faultline_dsl::{Fact, Value};
use reqwest::Client;
use serde_json::{json, Map};
use tracing::{debug, warn};
use url::Url;

use crate::context::RequestContext;
use crate::jaeger::stringify;
use crate::source::{Criteria, LogFactSource, SourceError};

pub const LOG_FIELD_PREDICATE: &str = "log.field";
pub const DEFAULT_INDEX: &str = "logs";

/// Search body for the given criteria (`match_all` when empty).
pub fn search_body(criteria: &Criteria) -> serde_json::Value {
    let query = if criteria.is_empty() {
        json!({ "match_all": {} })
    } else {
        let must: Vec<serde_json::Value> = criteria
            .iter()
            .map(|(field, value)| {
                let mut clause = Map::new();
                clause.insert(field.clone(), json!(value));
                json!({ "match": clause })
            })
            .collect();
        json!({ "bool": { "must": must } })
    };
    json!({ "query": query, "track_total_hits": true })
}

/// Flatten a document into sorted `dotted.key → value` pairs.
pub fn flatten_source(source: &Map<String, serde_json::Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(source, "", &mut out);
    out
}

fn flatten_into(
    object: &Map<String, serde_json::Value>,
    prefix: &str,
    out: &mut BTreeMap<String, String>,
) {
    for (key, value) in object {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            serde_json::Value::Object(inner) => flatten_into(inner, &path, out),
            serde_json::Value::Array(_) => {
                out.insert(path, value.to_string());
            }
            scalar => {
                out.insert(path, stringify(scalar));
            }
        }
    }
}

/// Convert a search response to facts. Hits without an `_id` or an object
/// `_source` are skipped.
pub fn log_facts(response: &serde_json::Value) -> Vec<Fact> {
    let Some(hits) = response
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(|h| h.as_array())
    else {
        return Vec::new();
    };

    let mut facts = Vec::new();
    for hit in hits {
        let (Some(doc_id), Some(source)) = (
            hit.get("_id").and_then(|v| v.as_str()),
            hit.get("_source").and_then(|v| v.as_object()),
        ) else {
            continue;
        };
        for (key, value) in flatten_source(source) {
            facts.push(Fact::new(
                LOG_FIELD_PREDICATE,
                vec![Value::from(doc_id), Value::String(key), Value::String(value)],
            ));
        }
    }
    facts
}

pub struct ElasticsearchLogSource {
    client: Client,
    base_url: String,
    index: String,
}

impl ElasticsearchLogSource {
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> Result<Self, SourceError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| {
            SourceError::Config(format!("invalid Elasticsearch URL `{base_url}`: {e}"))
        })?;
        if index.is_empty() || index.contains('/') {
            return Err(SourceError::Config(format!(
                "invalid Elasticsearch index `{index}`"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            index: index.to_string(),
        })
    }

    pub fn search_url(&self) -> String {
        format!("{}/{}/_search", self.base_url, self.index)
    }
}

#[async_trait]
impl LogFactSource for ElasticsearchLogSource {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn fetch_logs(
        &self,
        ctx: &RequestContext,
        criteria: &Criteria,
    ) -> Result<Vec<Fact>, SourceError> {
        let url = self.search_url();
        let body = search_body(criteria);
        debug!(url = %url, criteria = criteria.len(), "searching logs");

        let response = ctx
            .guard(self.client.post(&url).json(&body).send())
            .await?
            .map_err(|e| SourceError::Http {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = ctx.guard(response.text()).await?.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), "Elasticsearch returned an error status");
            return Err(SourceError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let decoded: serde_json::Value = ctx
            .guard(response.json())
            .await?
            .map_err(|e| SourceError::Decode {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let facts = log_facts(&decoded);
        debug!(facts = facts.len(), "decoded log hits");
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_criteria_match_everything() {
        assert_eq!(
            search_body(&Criteria::new()),
            json!({ "query": { "match_all": {} }, "track_total_hits": true })
        );
    }

    #[test]
    fn criteria_become_sorted_match_clauses() {
        let mut criteria = Criteria::new();
        criteria.insert("service".into(), "order-service".into());
        criteria.insert("level".into(), "error".into());
        assert_eq!(
            search_body(&criteria)["query"]["bool"]["must"],
            json!([
                { "match": { "level": "error" } },
                { "match": { "service": "order-service" } }
            ])
        );
    }

    #[test]
    fn nested_sources_flatten_with_dotted_keys() {
        let source = json!({
            "service": "order-service",
            "http": { "status": 500, "request": { "method": "POST" } },
            "tags": ["db", "timeout"],
            "retry": false
        });
        let flat = flatten_source(source.as_object().expect("object"));
        let pairs: Vec<(&str, &str)> = flat.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                ("http.request.method", "POST"),
                ("http.status", "500"),
                ("retry", "false"),
                ("service", "order-service"),
                ("tags", r#"["db","timeout"]"#),
            ]
        );
    }

    #[test]
    fn hits_without_id_or_source_are_skipped() {
        let response = json!({
            "hits": { "hits": [
                { "_id": "doc-1", "_source": { "level": "error" } },
                { "_source": { "level": "warn" } },
                { "_id": "doc-3", "_source": "not an object" }
            ]}
        });
        let rendered: Vec<String> = log_facts(&response).iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec![r#"log.field("doc-1", "level", "error")"#]);
        assert!(log_facts(&json!({})).is_empty());
    }
}
