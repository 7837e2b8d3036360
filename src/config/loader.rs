use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::listeners::{Protocol, OPT_PROTOCOL};

use super::types::Config;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Validate listener names are unique
        let mut names = HashSet::new();
        for listener in &self.listeners {
            if !names.insert(&listener.name) {
                anyhow::bail!("duplicate listener name: {}", listener.name);
            }
        }

        // Every listener must name a recognized protocol
        for listener in &self.listeners {
            let raw = listener.options.get(OPT_PROTOCOL).with_context(|| {
                format!(
                    "listener '{}' is missing the \"{}\" option",
                    listener.name, OPT_PROTOCOL
                )
            })?;
            raw.parse::<Protocol>().with_context(|| {
                format!("listener '{}' has an invalid protocol: {raw}", listener.name)
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_minimal() {
        let config = Config::from_yaml("{}").unwrap();
        assert!(config.listeners.is_empty());
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_from_yaml_listeners() {
        let yaml = r#"
listeners:
  - name: edge
    autostart: true
    options:
      Protocol: https
      Interface: 0.0.0.0
      Port: "443"
      Cert: /etc/listenerd/edge.crt
      Key: /etc/listenerd/edge.key
  - name: fallback
    options:
      Protocol: tcp
      Port: "4444"
settings:
  stop_grace: 10s
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.listeners.len(), 2);
        assert!(config.listeners[0].autostart);
        assert_eq!(
            config.settings.stop_grace,
            std::time::Duration::from_secs(10)
        );

        let options = config.listeners[0].factory_options();
        assert_eq!(options.get("Name").map(String::as_str), Some("edge"));
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let yaml = r#"
listeners:
  - name: edge
    options: { Protocol: http }
  - name: edge
    options: { Protocol: tcp }
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validate_rejects_missing_protocol() {
        let yaml = r#"
listeners:
  - name: edge
    options: { Port: "80" }
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_protocol() {
        let yaml = r#"
listeners:
  - name: edge
    options: { Protocol: gopher }
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}
