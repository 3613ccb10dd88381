//! Configuration for acquisition

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// One configured source, in priority order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSpec {
    /// URL built from the id, no resolver call
    Template {
        /// Source name used in the state store
        name: String,
        /// URL with `{id}` and `{suffix}` placeholders
        url: String,
        /// Only ids starting with this prefix are eligible; `{suffix}` is the rest
        #[serde(default, skip_serializing_if = "Option::is_none")]
        require_prefix: Option<String>,
    },
    /// Unpaywall open-access lookup
    Unpaywall {
        /// Source name used in the state store
        name: String,
        /// API base URL
        base_url: String,
        /// Contact email required by the API
        email: String,
    },
    /// Europe PMC REST search
    EuropePmc {
        /// Source name used in the state store
        name: String,
        /// REST base URL
        base_url: String,
        /// Base URL for rendered open-access PDFs
        render_url: String,
    },
    /// Semantic Scholar Graph API open-access lookup
    SemanticScholar {
        /// Source name used in the state store
        name: String,
        /// Graph API base URL
        base_url: String,
        /// Sent as `x-api-key`; anonymous access is heavily throttled
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
}

impl SourceSpec {
    /// Source name
    pub fn name(&self) -> &str {
        match self {
            SourceSpec::Template { name, .. }
            | SourceSpec::Unpaywall { name, .. }
            | SourceSpec::EuropePmc { name, .. }
            | SourceSpec::SemanticScholar { name, .. } => name,
        }
    }
}

/// Configuration for acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquireConfig {
    /// Outbound calls per second across all workers
    pub rate: f64,

    /// Burst size of the rate limiter
    pub burst: u32,

    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,

    /// Retries on the same URL after a transient failure
    pub transient_retries: u32,

    /// Base delay of the exponential backoff (milliseconds)
    pub backoff_ms: u64,

    /// User-Agent header
    pub user_agent: String,

    /// Largest response body accepted from a candidate URL (bytes)
    pub max_body_bytes: u64,

    /// Sources in priority order
    pub sources: Vec<SourceSpec>,
}

impl AcquireConfig {
    /// Get the request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get the backoff base as a Duration
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Configured source names, in priority order
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Burst derived from a worker count: `min(workers, rate × 10)`, at least 1
    pub fn derived_burst(rate: f64, workers: usize) -> u32 {
        let by_rate = (rate * 10.0).floor().max(1.0) as usize;
        workers.min(by_rate).max(1) as u32
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err("rate must be greater than 0".to_string());
        }
        if self.burst == 0 {
            return Err("burst must be at least 1".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".to_string());
        }
        if self.max_body_bytes < crate::validate::MIN_PDF_BYTES {
            return Err(format!(
                "max_body_bytes must be at least {}",
                crate::validate::MIN_PDF_BYTES
            ));
        }
        if self.sources.is_empty() {
            return Err("at least one source must be configured".to_string());
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name().trim().is_empty() {
                return Err("source name cannot be empty".to_string());
            }
            if !names.insert(source.name()) {
                return Err(format!("duplicate source name: {}", source.name()));
            }
            match source {
                SourceSpec::Template { name, url, .. } if !url.contains("{id}") && !url.contains("{suffix}") => {
                    return Err(format!("template source {} has no {{id}} or {{suffix}} placeholder", name));
                }
                SourceSpec::Unpaywall { name, email, .. } if !email.contains('@') => {
                    return Err(format!("unpaywall source {} needs a contact email", name));
                }
                SourceSpec::SemanticScholar { name, api_key: Some(key), .. } if key.trim().is_empty() => {
                    return Err(format!("semanticscholar source {} has an empty api_key", name));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn default_sources() -> Vec<SourceSpec> {
        vec![
            SourceSpec::Template {
                name: "primary".to_string(),
                url: "https://doi.org/{id}".to_string(),
                require_prefix: None,
            },
            SourceSpec::Template {
                name: "arxiv".to_string(),
                url: "https://arxiv.org/pdf/{suffix}".to_string(),
                require_prefix: Some("10.48550/arxiv.".to_string()),
            },
            SourceSpec::Template {
                name: "biorxiv".to_string(),
                url: "https://www.biorxiv.org/content/{id}.full.pdf".to_string(),
                require_prefix: Some("10.1101/".to_string()),
            },
            SourceSpec::EuropePmc {
                name: "europepmc".to_string(),
                base_url: "https://www.ebi.ac.uk/europepmc/webservices/rest".to_string(),
                render_url: "https://europepmc.org/articles".to_string(),
            },
            SourceSpec::SemanticScholar {
                name: "semanticscholar".to_string(),
                base_url: "https://api.semanticscholar.org/graph/v1".to_string(),
                api_key: None,
            },
        ]
    }
}

impl Default for AcquireConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            rate: 0.5,
            burst: 5,
            request_timeout_secs: 60,
            transient_retries: 2,
            backoff_ms: 500,
            user_agent: format!("quarry/{}", env!("CARGO_PKG_VERSION")),
            max_body_bytes: crate::http::DEFAULT_MAX_BODY_BYTES,
            sources: Self::default_sources(),
        }
    }
}

impl AcquireConfig {
    /// Aggressive preset: higher rate, fewer retries
    pub fn aggressive() -> Self {
        Self {
            rate: 2.0,
            burst: 10,
            request_timeout_secs: 30,
            transient_retries: 1,
            ..Self::default()
        }
    }

    /// Lenient preset: gentle on servers, patient with slow ones
    pub fn lenient() -> Self {
        Self {
            rate: 0.2,
            burst: 2,
            request_timeout_secs: 120,
            transient_retries: 4,
            backoff_ms: 1000,
            ..Self::default()
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(AcquireConfig::default().validate().is_ok());
        assert!(AcquireConfig::aggressive().validate().is_ok());
        assert!(AcquireConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_default_priority_order() {
        assert_eq!(
            AcquireConfig::default().source_names(),
            vec!["primary", "arxiv", "biorxiv", "europepmc", "semanticscholar"]
        );
    }

    #[test]
    fn test_invalid_rate() {
        let mut config = AcquireConfig::default();
        config.rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let mut config = AcquireConfig::default();
        let first = config.sources[0].clone();
        config.sources.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_burst() {
        assert_eq!(AcquireConfig::derived_burst(0.5, 8), 5);
        assert_eq!(AcquireConfig::derived_burst(2.0, 4), 4);
        assert_eq!(AcquireConfig::derived_burst(0.05, 4), 1);
    }

    #[test]
    fn test_sources_from_toml() {
        let config = AcquireConfig::from_toml(
            r#"
            rate = 1.0

            [[sources]]
            kind = "unpaywall"
            name = "unpaywall"
            base_url = "https://api.unpaywall.org"
            email = "ops@example.org"

            [[sources]]
            kind = "template"
            name = "arxiv"
            url = "https://arxiv.org/pdf/{suffix}"
            require_prefix = "10.48550/arxiv."
            "#,
        )
        .unwrap();

        assert_eq!(config.source_names(), vec!["unpaywall", "arxiv"]);
        assert_eq!(config.burst, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_semantic_scholar_from_toml() {
        let config = AcquireConfig::from_toml(
            r#"
            max_body_bytes = 1048576

            [[sources]]
            kind = "semanticscholar"
            name = "s2"
            base_url = "https://api.semanticscholar.org/graph/v1"
            api_key = "k"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.sources[0],
            SourceSpec::SemanticScholar {
                name: "s2".to_string(),
                base_url: "https://api.semanticscholar.org/graph/v1".to_string(),
                api_key: Some("k".to_string()),
            }
        );
        assert_eq!(config.max_body_bytes, 1_048_576);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tiny_body_cap_rejected() {
        let mut config = AcquireConfig::default();
        config.max_body_bytes = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AcquireConfig::default();
        let parsed = AcquireConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(config.sources, parsed.sources);
    }
}
