//! Configuration loading from disk and the command line.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::{BackendConfig, LogFormat, ProxyConfig, SelectorKind};
use crate::error::ConfigError;

/// Load a configuration from a TOML file without validating it.
///
/// Validation runs after CLI overrides are applied, see [`ConfigOverrides`].
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse a configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Values given on the command line. Anything set here wins over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub listen: Option<String>,
    pub backends: Vec<BackendConfig>,
    pub selector: Option<SelectorKind>,
    pub max_attempts: Option<u32>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl ConfigOverrides {
    /// Load the file named by `config_path` (or defaults) and apply the overrides.
    pub fn resolve(self) -> Result<ProxyConfig, ConfigError> {
        let base = match &self.config_path {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };
        Ok(self.apply(base))
    }

    /// Apply the overrides to an already loaded configuration.
    pub fn apply(self, mut config: ProxyConfig) -> ProxyConfig {
        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        // A backend given on the command line replaces the whole file list.
        if !self.backends.is_empty() {
            config.backends = self.backends;
        }
        if let Some(selector) = self.selector {
            config.balancing.selector = selector;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.balancing.max_attempts = max_attempts;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/proxy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/proxy.toml"));
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        let err = parse_config("[listener\nbind_address = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn overrides_win_over_file() {
        let file = parse_config(
            r#"
            [listener]
            bind_address = "0.0.0.0:8080"

            [[backends]]
            address = "10.0.0.1:80"
            "#,
        )
        .unwrap();

        let overrides = ConfigOverrides {
            listen: Some("127.0.0.1:0".into()),
            backends: vec!["127.0.0.1:9001:A".parse().unwrap()],
            selector: Some(SelectorKind::Random),
            max_attempts: Some(5),
            ..Default::default()
        };
        let config = overrides.apply(file);

        assert_eq!(config.listener.bind_address, "127.0.0.1:0");
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].name.as_deref(), Some("A"));
        assert_eq!(config.balancing.selector, SelectorKind::Random);
        assert_eq!(config.balancing.max_attempts, 5);
    }

    #[test]
    fn example_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.backends.len(), 3);
        assert!(crate::config::validation::validate_config(&config).is_ok());
    }
}
