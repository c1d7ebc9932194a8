use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://reqres.in/api";

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Where the users API lives
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout; unset means the transport default
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SessionConfig {
    /// Token file; defaults to ~/.userdesk/session.json
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub confirm_delete: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            confirm_delete: default_true(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// One config file as written on disk. Every key is optional so that a
/// layer only overrides what it names.
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigLayer {
    #[serde(default)]
    api: ApiLayer,
    #[serde(default)]
    session: SessionConfig,
    #[serde(default)]
    display: DisplayLayer,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ApiLayer {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct DisplayLayer {
    confirm_delete: Option<bool>,
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.userdesk/config.local.toml) > project (.userdesk/config.toml) > user (~/.userdesk/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".userdesk").join("config.toml");
            if user_config.exists() {
                config.merge(ConfigLayer::load_from(&user_config)?);
            }
        }

        let project_config = Path::new(".userdesk").join("config.toml");
        if project_config.exists() {
            config.merge(ConfigLayer::load_from(&project_config)?);
        }

        // Should be gitignored
        let local_config = Path::new(".userdesk").join("config.local.toml");
        if local_config.exists() {
            config.merge(ConfigLayer::load_from(&local_config)?);
        }

        Ok(config)
    }

    /// Load configuration from a specific path, on top of the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge(ConfigLayer::load_from(path)?);
        Ok(config)
    }

    /// Merge a layer into this config; the layer wins wherever it sets a value
    fn merge(&mut self, other: ConfigLayer) {
        if let Some(base_url) = other.api.base_url {
            self.api.base_url = base_url;
        }
        if other.api.timeout_ms.is_some() {
            self.api.timeout_ms = other.api.timeout_ms;
        }
        if other.session.token_file.is_some() {
            self.session.token_file = other.session.token_file;
        }
        if let Some(confirm_delete) = other.display.confirm_delete {
            self.display.confirm_delete = confirm_delete;
        }
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let base_url = &self.api.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "api.base_url".to_string(),
                message: format!("Expected an http(s) URL, got '{}'", base_url),
            });
        }

        if self.api.timeout_ms == Some(0) {
            errors.push(ValidationError {
                field: "api.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Some(path) = &self.session.token_file {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError {
                    field: "session.token_file".to_string(),
                    message: "Must not be empty".to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl ConfigLayer {
    fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let layer: ConfigLayer = toml::from_str(&content)?;
        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://reqres.in/api");
        assert_eq!(config.api.timeout(), None);
        assert!(config.display.confirm_delete);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_overrides_only_named_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[api]
timeout_ms = 2500

[display]
confirm_delete = false
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.timeout(), Some(Duration::from_millis(2500)));
        assert!(!config.display.confirm_delete);
    }

    #[test]
    fn test_later_layer_wins() {
        let mut config = Config::default();
        config.merge(
            toml::from_str(
                r#"
[api]
base_url = "http://localhost:3000/api"
timeout_ms = 1000
"#,
            )
            .unwrap(),
        );
        config.merge(
            toml::from_str(
                r#"
[api]
base_url = "http://staging.internal/api"
"#,
            )
            .unwrap(),
        );

        assert_eq!(config.api.base_url, "http://staging.internal/api");
        assert_eq!(config.api.timeout_ms, Some(1000));
    }

    #[test]
    fn test_validate_bad_url_and_timeout() {
        let mut config = Config::default();
        config.api.base_url = "reqres.in/api".to_string();
        config.api.timeout_ms = Some(0);

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].field.contains("base_url"));
        assert!(errors[1].message.contains("greater than 0"));
    }

    #[test]
    fn test_validate_empty_token_file() {
        let mut config = Config::default();
        config.session.token_file = Some(PathBuf::new());
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(format!("{}", errors[0]), "[session.token_file]: Must not be empty");
    }
}
