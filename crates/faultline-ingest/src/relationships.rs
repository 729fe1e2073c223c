//! Static service dependency graph.
//!
//! Loaded once at startup; every request turns it into `calls/2` facts.
//!
//! ```yaml
//! relationships:
//!   - service: api-gateway
//!     depends_on: [order-service, user-service]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use faultline_dsl::{Fact, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Predicate emitted for every `(service, dependency)` pair.
pub const CALLS_PREDICATE: &str = "calls";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("relationship config not loaded")]
    NotLoaded,
    #[error("relationship config {} does not exist", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read relationship config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed relationship config {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRelationship {
    pub service: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub relationships: Vec<ServiceRelationship>,
}

impl RelationshipConfig {
    pub fn new(relationships: Vec<ServiceRelationship>) -> Self {
        Self { relationships }
    }

    /// Load from YAML (`.yaml` / `.yml`) or JSON (any other extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let malformed = |message: String| ConfigError::Malformed {
            path: path.to_path_buf(),
            message,
        };
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: RelationshipConfig = if is_yaml {
            serde_yaml::from_str(&text).map_err(|e| malformed(e.to_string()))?
        } else {
            serde_json::from_str(&text).map_err(|e| malformed(e.to_string()))?
        };
        config.validate().map_err(malformed)?;

        info!(
            path = %path.display(),
            services = config.relationships.len(),
            pairs = config.pair_count(),
            "loaded relationship config"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (i, rel) in self.relationships.iter().enumerate() {
            if rel.service.trim().is_empty() {
                return Err(format!("relationships[{i}] has an empty service name"));
            }
            if let Some(j) = rel.depends_on.iter().position(|d| d.trim().is_empty()) {
                return Err(format!(
                    "relationships[{i}].depends_on[{j}] ({}) is empty",
                    rel.service
                ));
            }
        }
        Ok(())
    }

    /// Total number of `(service, dependency)` pairs.
    pub fn pair_count(&self) -> usize {
        self.relationships.iter().map(|r| r.depends_on.len()).sum()
    }
}

/// Turns the loaded dependency graph into `calls(Service, Dependency)` facts.
#[derive(Debug, Clone, Default)]
pub struct RelationshipFactGenerator {
    config: Option<Arc<RelationshipConfig>>,
}

impl RelationshipFactGenerator {
    pub fn new(config: Arc<RelationshipConfig>) -> Self {
        Self {
            config: Some(config),
        }
    }

    /// A generator with no config; [`generate`](Self::generate) fails.
    pub fn unloaded() -> Self {
        Self { config: None }
    }

    pub fn config(&self) -> Option<&RelationshipConfig> {
        self.config.as_deref()
    }

    /// One fact per pair, in config order.
    pub fn generate(&self) -> Result<Vec<Fact>, ConfigError> {
        let config = self.config.as_ref().ok_or(ConfigError::NotLoaded)?;
        let mut facts = Vec::with_capacity(config.pair_count());
        for rel in &config.relationships {
            for dep in &rel.depends_on {
                facts.push(Fact::new(
                    CALLS_PREDICATE,
                    vec![Value::from(rel.service.as_str()), Value::from(dep.as_str())],
                ));
            }
        }
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(suffix: &str, text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("tempfile");
        file.write_all(text.as_bytes()).expect("write");
        file
    }

    #[test]
    fn loads_yaml_and_json_equivalently() {
        let yaml = write_config(
            ".yaml",
            "relationships:\n  - service: api-gateway\n    depends_on: [order-service, user-service]\n  - service: order-service\n    depends_on: [postgres]\n",
        );
        let json = write_config(
            ".json",
            r#"{"relationships":[{"service":"api-gateway","depends_on":["order-service","user-service"]},{"service":"order-service","depends_on":["postgres"]}]}"#,
        );
        let from_yaml = RelationshipConfig::load(yaml.path()).expect("yaml");
        let from_json = RelationshipConfig::load(json.path()).expect("json");
        assert_eq!(from_yaml, from_json);
        assert_eq!(from_yaml.pair_count(), 3);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = RelationshipConfig::load(dir.path().join("nope.json")).expect_err("missing");
        assert!(matches!(err, ConfigError::Missing { .. }), "{err}");
    }

    #[test]
    fn malformed_content_is_rejected() {
        let file = write_config(".json", r#"{"relationships": "api-gateway"}"#);
        let err = RelationshipConfig::load(file.path()).expect_err("malformed");
        assert!(matches!(err, ConfigError::Malformed { .. }), "{err}");

        let file = write_config(".yml", "relationships:\n  - service: \"\"\n    depends_on: [db]\n");
        let err = RelationshipConfig::load(file.path()).expect_err("empty service");
        assert!(err.to_string().contains("empty service name"), "{err}");
    }

    #[test]
    fn generator_emits_one_fact_per_pair_in_order() {
        let config = RelationshipConfig::new(vec![
            ServiceRelationship {
                service: "a".into(),
                depends_on: vec!["b".into(), "c".into()],
            },
            ServiceRelationship {
                service: "b".into(),
                depends_on: vec!["c".into()],
            },
            ServiceRelationship {
                service: "c".into(),
                depends_on: vec![],
            },
        ]);
        let facts = RelationshipFactGenerator::new(Arc::new(config))
            .generate()
            .expect("generate");
        let rendered: Vec<String> = facts.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                r#"calls("a", "b")"#,
                r#"calls("a", "c")"#,
                r#"calls("b", "c")"#
            ]
        );
    }

    #[test]
    fn unloaded_generator_fails() {
        let err = RelationshipFactGenerator::unloaded()
            .generate()
            .expect_err("not loaded");
        assert!(matches!(err, ConfigError::NotLoaded));
    }
}
