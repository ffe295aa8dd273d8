//! Study configuration
//!
//! The behavior vocabulary shown to observers, the trial database location and the
//! display ticker cadence. Loaded from a JSON file; every field has a default so a
//! partial file (or no file at all) is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable overriding `database_path`
pub const DATABASE_ENV_VAR: &str = "RATROPY_DB";

/// Default display refresh interval in milliseconds
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

/// Open-field test acts offered by default
pub const DEFAULT_BEHAVIORS: [&str; 7] = [
    "horizontal locomotion",
    "central rearing",
    "peripheral rearing",
    "grooming",
    "freezing",
    "hole peeking",
    "sniffing",
];

/// Report document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
        }
    }
}

/// Whether recorded labels must come from the configured vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VocabularyPolicy {
    /// Any label is accepted
    Open,
    /// Only the listed labels are accepted
    Restricted(Vec<String>),
}

impl VocabularyPolicy {
    pub fn allows(&self, label: &str) -> bool {
        match self {
            VocabularyPolicy::Open => true,
            VocabularyPolicy::Restricted(labels) => labels.iter().any(|l| l == label),
        }
    }
}

/// Per-study settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Behavior labels offered to the observer, in display order
    pub behaviors: Vec<String>,
    /// Reject labels outside `behaviors`
    pub enforce_vocabulary: bool,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Display ticker interval in milliseconds
    pub tick_interval_ms: u64,
    /// Default report format
    pub report_format: ReportFormat,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            behaviors: DEFAULT_BEHAVIORS.iter().map(|b| b.to_string()).collect(),
            enforce_vocabulary: false,
            database_path: PathBuf::from("ratropy.db"),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            report_format: ReportFormat::Text,
        }
    }
}

impl StudyConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parse and validate config JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: StudyConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply `RATROPY_DB` if set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            if !path.trim().is_empty() {
                self.database_path = PathBuf::from(path);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(blank) = self.behaviors.iter().position(|b| b.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "behavior #{} is blank",
                blank + 1
            )));
        }
        for (i, b) in self.behaviors.iter().enumerate() {
            if self.behaviors[..i].contains(b) {
                return Err(ConfigError::Invalid(format!("duplicate behavior '{}'", b)));
            }
        }
        if self.enforce_vocabulary && self.behaviors.is_empty() {
            return Err(ConfigError::Invalid(
                "enforce_vocabulary requires at least one behavior".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn vocabulary(&self) -> VocabularyPolicy {
        if self.enforce_vocabulary {
            VocabularyPolicy::Restricted(self.behaviors.clone())
        } else {
            VocabularyPolicy::Open
        }
    }

    /// Resolve observer input to a label.
    ///
    /// A bare 1-based number selects from `behaviors`; anything else is taken as the
    /// label itself (trimmed).
    pub fn resolve_label(&self, input: &str) -> Option<String> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        match input.parse::<usize>() {
            Ok(n) if n >= 1 => self.behaviors.get(n - 1).cloned(),
            Ok(_) => None,
            Err(_) => Some(input.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = StudyConfig::default();
        assert_eq!(config.behaviors.len(), 7);
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.vocabulary(), VocabularyPolicy::Open);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = StudyConfig::from_json(r#"{ "tick_interval_ms": 250 }"#).unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.behaviors, StudyConfig::default().behaviors);
        assert_eq!(config.report_format, ReportFormat::Text);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = StudyConfig {
            behaviors: vec!["rear".to_string(), "groom".to_string()],
            enforce_vocabulary: true,
            database_path: PathBuf::from("/tmp/study.db"),
            tick_interval_ms: 50,
            report_format: ReportFormat::Json,
        };
        let parsed = StudyConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validation_failures() {
        assert!(StudyConfig::from_json(r#"{ "tick_interval_ms": 0 }"#).is_err());
        assert!(StudyConfig::from_json(r#"{ "behaviors": ["a", " "] }"#).is_err());
        assert!(StudyConfig::from_json(r#"{ "behaviors": ["a", "a"] }"#).is_err());
        assert!(
            StudyConfig::from_json(r#"{ "behaviors": [], "enforce_vocabulary": true }"#).is_err()
        );
    }

    #[test]
    fn test_restricted_vocabulary() {
        let config =
            StudyConfig::from_json(r#"{ "behaviors": ["rear", "groom"], "enforce_vocabulary": true }"#)
                .unwrap();
        let policy = config.vocabulary();
        assert!(policy.allows("rear"));
        assert!(!policy.allows("sniff"));
    }

    #[test]
    fn test_resolve_label() {
        let config = StudyConfig::default();
        assert_eq!(config.resolve_label("1").as_deref(), Some("horizontal locomotion"));
        assert_eq!(config.resolve_label(" 7 ").as_deref(), Some("sniffing"));
        assert_eq!(config.resolve_label("8"), None);
        assert_eq!(config.resolve_label("0"), None);
        assert_eq!(config.resolve_label(""), None);
        assert_eq!(config.resolve_label(" tail rattle ").as_deref(), Some("tail rattle"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.json");
        fs::write(&path, r#"{ "report_format": "json" }"#).unwrap();

        let config = StudyConfig::load(&path).unwrap();
        assert_eq!(config.report_format, ReportFormat::Json);
        assert!(StudyConfig::load(&dir.path().join("missing.json")).is_err());
    }
}
