//! Startup configuration shared by `serve`, `query` and `check`.
//!
//! Every flag has an environment fallback so the binary can be configured the
//! same way in a container as on a laptop.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, ValueEnum};
use faultline_ingest::{
    ElasticsearchLogSource, FixtureLogSource, FixtureTraceSource, JaegerTraceSource,
    LogFactSource, RelationshipConfig, TraceFactSource,
};
use faultline_query::{BaseRules, QueryOrchestrator, QueryServiceConfig, DEFAULT_TRACE_SERVICE};
use tracing::info;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ELASTICSEARCH_URL: &str = "http://localhost:9200";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Dev,
    Prod,
    /// In-memory fixture sources; no telemetry backend is contacted.
    Test,
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Deployment environment; `test` swaps in fixture sources.
    #[arg(long = "env", value_enum, env = "APP_ENV", default_value = "dev")]
    pub environment: Environment,

    /// Service dependency graph (`.yaml`/`.yml` → YAML, anything else → JSON).
    #[arg(
        long = "relationships",
        env = "RELATIONSHIP_CONFIG_PATH",
        default_value = "relationships.json"
    )]
    pub relationships: PathBuf,

    /// Jaeger query base URL (required unless `--env test`).
    #[arg(long, env = "JAEGER_QUERY_URL")]
    pub jaeger_url: Option<String>,

    #[arg(long, env = "ELASTICSEARCH_ADDRESS", default_value = DEFAULT_ELASTICSEARCH_URL)]
    pub elasticsearch_url: String,

    #[arg(long, default_value = faultline_ingest::elasticsearch::DEFAULT_INDEX)]
    pub elasticsearch_index: String,

    /// Service whose traces are fetched for every request.
    #[arg(long, env = "TRACE_SERVICE_NAME", default_value = DEFAULT_TRACE_SERVICE)]
    pub trace_service: String,

    /// Extra base rules appended to the built-in `depends_on` rules.
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Evaluation timeout (seconds). `0` disables the timeout.
    #[arg(long, default_value_t = 0)]
    pub eval_timeout_secs: u64,

    /// Per-request timeout for telemetry backends (seconds).
    #[arg(long, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Fail evaluation once rules derive more than this many facts.
    #[arg(long)]
    pub max_derived_facts: Option<usize>,
}

impl SourceArgs {
    pub fn service_config(&self) -> QueryServiceConfig {
        QueryServiceConfig {
            trace_service: self.trace_service.clone(),
            eval_timeout: (self.eval_timeout_secs > 0)
                .then(|| Duration::from_secs(self.eval_timeout_secs)),
            max_derived_facts: self.max_derived_facts,
        }
    }

    pub fn load_relationships(&self) -> Result<RelationshipConfig> {
        RelationshipConfig::load(&self.relationships).with_context(|| {
            format!(
                "failed to load relationship config from {}",
                self.relationships.display()
            )
        })
    }

    pub fn load_base_rules(&self) -> Result<BaseRules> {
        load_base_rules(self.rules.as_deref())
    }

    fn sources(&self) -> Result<(Arc<dyn LogFactSource>, Arc<dyn TraceFactSource>)> {
        if self.environment == Environment::Test {
            info!("using fixture telemetry sources");
            return Ok((
                Arc::new(FixtureLogSource::canned()),
                Arc::new(FixtureTraceSource::canned()),
            ));
        }

        let timeout = Duration::from_secs(self.http_timeout_secs.max(1));
        let jaeger_url = self
            .jaeger_url
            .as_deref()
            .ok_or_else(|| anyhow!("--jaeger-url (or JAEGER_QUERY_URL) is required"))?;
        let traces = JaegerTraceSource::new(jaeger_url, timeout)?;
        let logs = ElasticsearchLogSource::new(
            &self.elasticsearch_url,
            &self.elasticsearch_index,
            timeout,
        )?;
        info!(
            jaeger = %traces.base_url(),
            elasticsearch = %self.elasticsearch_url,
            index = %self.elasticsearch_index,
            "using remote telemetry sources"
        );
        Ok((Arc::new(logs), Arc::new(traces)))
    }

    /// Everything a request needs. Fails when the relationship config or the
    /// rules file cannot be loaded.
    pub fn build_orchestrator(&self) -> Result<QueryOrchestrator> {
        let relationships = Arc::new(self.load_relationships()?);
        let base_rules = self.load_base_rules()?;
        let (logs, traces) = self.sources()?;
        info!(
            environment = ?self.environment,
            base_rules = base_rules.len(),
            trace_service = %self.trace_service,
            "query service configured"
        );
        Ok(QueryOrchestrator::new(
            self.service_config(),
            logs,
            traces,
            relationships,
            base_rules,
        ))
    }
}

pub fn load_base_rules(path: Option<&Path>) -> Result<BaseRules> {
    let mut rules = BaseRules::standard();
    if let Some(path) = path {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rules file {}", path.display()))?;
        let added = rules
            .extend_from_text(&text)
            .with_context(|| format!("failed to parse rules file {}", path.display()))?;
        info!(path = %path.display(), added, "loaded extra base rules");
    }
    Ok(rules)
}

#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    /// Listen address (use `127.0.0.1:0` to auto-pick a free port).
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Port on all interfaces; ignored when `--listen` is given.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,
}

impl ListenArgs {
    pub fn address(&self) -> SocketAddr {
        self.listen.unwrap_or_else(|| {
            SocketAddr::from(([0, 0, 0, 0], self.port.unwrap_or(DEFAULT_PORT)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        sources: SourceArgs,
        #[command(flatten)]
        listen: ListenArgs,
    }

    #[test]
    fn explicit_listen_wins_over_port() {
        let h = Harness::parse_from(["t", "--listen", "127.0.0.1:9000", "--port", "1234"]);
        assert_eq!(h.listen.address(), "127.0.0.1:9000".parse::<SocketAddr>().expect("addr"));

        let h = Harness::parse_from(["t", "--port", "1234"]);
        assert_eq!(h.listen.address(), "0.0.0.0:1234".parse::<SocketAddr>().expect("addr"));
    }

    #[test]
    fn zero_eval_timeout_means_unbounded() {
        let h = Harness::parse_from(["t", "--eval-timeout-secs", "0", "--trace-service", "edge"]);
        let config = h.sources.service_config();
        assert_eq!(config.eval_timeout, None);
        assert_eq!(config.trace_service, "edge");

        let h = Harness::parse_from(["t", "--eval-timeout-secs", "3"]);
        assert_eq!(h.sources.service_config().eval_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn rules_file_extends_the_standard_rules() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("extra.dl");
        std::fs::write(&path, "crashed(S) :- logs(S, 500, _).\n").expect("write");
        let rules = load_base_rules(Some(&path)).expect("rules");
        assert_eq!(rules.len(), BaseRules::standard().len() + 1);

        std::fs::write(&path, "crashed(S) :- ").expect("write");
        assert!(load_base_rules(Some(&path)).is_err());
    }

    #[test]
    fn remote_sources_need_a_jaeger_url() {
        let h = Harness::parse_from(["t", "--env", "prod"]);
        if h.sources.jaeger_url.is_none() {
            assert!(h.sources.sources().is_err());
        }
    }
}
