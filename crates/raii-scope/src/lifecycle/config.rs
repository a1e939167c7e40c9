//! Scope configuration

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};
use crate::sync::queue::DEFAULT_QUEUE_LABEL;

/// Configuration for a [`Scope`](super::Scope)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Label attached to the scope's spans, log events and unobserved
    /// failure reports
    pub label: String,
    /// Run the teardown on the current runtime when the scope is dropped
    /// without `destroy_all`
    pub teardown_on_drop: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self { label: DEFAULT_QUEUE_LABEL.to_string(), teardown_on_drop: true }
    }
}

impl ScopeConfig {
    /// Create a new configuration builder
    pub fn builder() -> ScopeConfigBuilder {
        ScopeConfigBuilder::new()
    }

    /// Parse a configuration from TOML
    ///
    /// Missing keys take their default values.
    pub fn from_toml_str(source: &str) -> CommonResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate().map_err(|msg| CommonError::config_field("label", msg))?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.label.trim().is_empty() {
            return Err("label must not be empty".to_string());
        }
        if self.label.chars().any(char::is_control) {
            return Err("label must not contain control characters".to_string());
        }
        Ok(())
    }
}

/// Builder for ScopeConfig
#[derive(Debug)]
pub struct ScopeConfigBuilder {
    config: ScopeConfig,
}

impl Default for ScopeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeConfigBuilder {
    pub fn new() -> Self {
        Self { config: ScopeConfig::default() }
    }

    pub fn label<S: Into<String>>(mut self, label: S) -> Self {
        self.config.label = label.into();
        self
    }

    pub fn teardown_on_drop(mut self, enabled: bool) -> Self {
        self.config.teardown_on_drop = enabled;
        self
    }

    pub fn build(self) -> Result<ScopeConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScopeConfig::default();
        assert_eq!(config.label, DEFAULT_QUEUE_LABEL);
        assert!(config.teardown_on_drop);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_validates() {
        let config = ScopeConfig::builder().label("editor").teardown_on_drop(false).build().unwrap();
        assert_eq!(config.label, "editor");
        assert!(!config.teardown_on_drop);

        assert!(ScopeConfig::builder().label(" ").build().is_err());
        assert!(ScopeConfig::builder().label("a\nb").build().is_err());
    }

    #[test]
    fn test_from_toml_fills_defaults() {
        let config = ScopeConfig::from_toml_str(r#"label = "sidebar""#).unwrap();
        assert_eq!(config.label, "sidebar");
        assert!(config.teardown_on_drop);

        let config = ScopeConfig::from_toml_str("teardown_on_drop = false").unwrap();
        assert_eq!(config.label, DEFAULT_QUEUE_LABEL);
        assert!(!config.teardown_on_drop);
    }

    #[test]
    fn test_from_toml_rejects_bad_input() {
        let err = ScopeConfig::from_toml_str("label = 3").unwrap_err();
        assert!(matches!(err, CommonError::Serialization { .. }));

        let err = ScopeConfig::from_toml_str(r#"label = """#).unwrap_err();
        assert!(matches!(err, CommonError::Config { .. }));
    }
}
