//! Configuration for the Extractor

use quarry_domain::EngineProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Placeholder replaced with the artifact path in engine commands
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// One configured extraction engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSpec {
    /// Engine name used in the state store
    pub name: String,

    /// Result file suffix
    #[serde(default)]
    pub suffix: String,

    /// Relative output quality
    #[serde(default)]
    pub fidelity: u8,

    /// Program and arguments; `{input}` is replaced with the PDF path
    pub command: Vec<String>,
}

impl EngineSpec {
    /// Artifact-level view of this engine
    pub fn profile(&self) -> EngineProfile {
        EngineProfile::new(self.name.clone(), self.suffix.clone(), self.fidelity)
    }
}

/// Configuration for the Extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Minimum total characters for an accepted result
    pub min_chars: usize,

    /// Minimum non-empty sections for an accepted result
    pub min_sections: usize,

    /// Minimum characters for lenient acceptance of a malformed PDF
    pub lenient_min_chars: usize,

    /// Engine used for the lenient check
    pub lenient_engine: String,

    /// Maximum time for a single engine call (seconds)
    pub extraction_timeout_secs: u64,

    /// Configured engines
    pub engines: Vec<EngineSpec>,
}

impl ExtractorConfig {
    /// Get the extraction timeout as a Duration
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    /// Artifact profiles of every configured engine
    pub fn profiles(&self) -> Vec<EngineProfile> {
        self.engines.iter().map(EngineSpec::profile).collect()
    }

    /// Look up an engine by name
    pub fn engine(&self, name: &str) -> Option<&EngineSpec> {
        self.engines.iter().find(|e| e.name == name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.min_chars == 0 && self.min_sections == 0 {
            return Err("min_chars and min_sections cannot both be 0".to_string());
        }
        if self.extraction_timeout_secs == 0 {
            return Err("extraction_timeout_secs must be greater than 0".to_string());
        }
        if self.engines.is_empty() {
            return Err("at least one engine must be configured".to_string());
        }

        let mut names = HashSet::new();
        let mut suffixes = HashSet::new();
        for engine in &self.engines {
            if engine.name.trim().is_empty() {
                return Err("engine name cannot be empty".to_string());
            }
            if !names.insert(engine.name.as_str()) {
                return Err(format!("duplicate engine name: {}", engine.name));
            }
            if !suffixes.insert(engine.suffix.as_str()) {
                return Err(format!("duplicate engine suffix: {:?}", engine.suffix));
            }
            if engine.command.is_empty() {
                return Err(format!("engine {} has no command", engine.name));
            }
        }

        if !self.lenient_engine.is_empty() && self.engine(&self.lenient_engine).is_none() {
            return Err(format!("lenient_engine {} is not configured", self.lenient_engine));
        }
        Ok(())
    }

    fn default_engines() -> Vec<EngineSpec> {
        vec![
            EngineSpec {
                name: "grobid".to_string(),
                suffix: String::new(),
                fidelity: 2,
                command: vec!["quarry-grobid".to_string(), INPUT_PLACEHOLDER.to_string()],
            },
            EngineSpec {
                name: "fast".to_string(),
                suffix: "_fast".to_string(),
                fidelity: 1,
                command: vec!["quarry-fast-text".to_string(), INPUT_PLACEHOLDER.to_string()],
            },
        ]
    }
}

impl Default for ExtractorConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            min_chars: 50,
            min_sections: 1,
            lenient_min_chars: 100,
            lenient_engine: "fast".to_string(),
            extraction_timeout_secs: 180,
            engines: Self::default_engines(),
        }
    }
}

impl ExtractorConfig {
    /// Aggressive preset: short timeouts, stricter content thresholds
    pub fn aggressive() -> Self {
        Self {
            min_chars: 200,
            min_sections: 2,
            lenient_min_chars: 500,
            extraction_timeout_secs: 60,
            ..Self::default()
        }
    }

    /// Lenient preset: long timeouts, accept thin results
    pub fn lenient() -> Self {
        Self {
            min_chars: 20,
            min_sections: 1,
            lenient_min_chars: 50,
            extraction_timeout_secs: 600,
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
        assert!(ExtractorConfig::default().validate().is_ok());
        assert!(ExtractorConfig::aggressive().validate().is_ok());
        assert!(ExtractorConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_duplicate_suffix_rejected() {
        let mut config = ExtractorConfig::default();
        config.engines[1].suffix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_lenient_engine_rejected() {
        let mut config = ExtractorConfig::default();
        config.lenient_engine = "ocr".to_string();
        assert!(config.validate().is_err());

        config.lenient_engine = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_profiles_follow_engine_order() {
        let profiles = ExtractorConfig::default().profiles();
        assert_eq!(profiles[0].name, "grobid");
        assert_eq!(profiles[1].suffix, "_fast");
        assert!(profiles[0].fidelity > profiles[1].fidelity);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ExtractorConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = ExtractorConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.min_chars, parsed.min_chars);
        assert_eq!(config.engines, parsed.engines);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = ExtractorConfig::from_toml("min_chars = 10").unwrap();
        assert_eq!(parsed.min_chars, 10);
        assert_eq!(parsed.lenient_min_chars, 100);
        assert_eq!(parsed.engines.len(), 2);
    }
}
