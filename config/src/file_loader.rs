//! # Configuration File Loading
//!
//! Loads configuration from TOML or YAML files, detecting the format from
//! the file extension.

use crate::config::BridgeConfig;
use std::path::Path;

/// Configuration file loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(String),

    #[error("Config file has no extension")]
    NoExtension,

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String)
}

/// Load configuration from a TOML file.
///
/// ```rust,no_run
/// use config::load_from_toml;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_toml(Path::new("bridge.toml"))?;
///     println!("cache prefix: {}", config.cache.key_prefix);
///     Ok(())
/// }
/// ```
pub fn load_from_toml(path: &Path) -> Result<BridgeConfig, ConfigFileError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_e| ConfigFileError::FileNotFound(path.display().to_string()))?;

    toml::from_str(&contents).map_err(|e| ConfigFileError::TomlParse(e.to_string()))
}

/// Load configuration from a YAML file.
pub fn load_from_yaml(path: &Path) -> Result<BridgeConfig, ConfigFileError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_e| ConfigFileError::FileNotFound(path.display().to_string()))?;

    serde_yaml::from_str(&contents).map_err(|e| ConfigFileError::YamlParse(e.to_string()))
}

/// Load configuration from file with format auto-detection (`.toml`,
/// `.yaml`, `.yml`).
pub fn load_from_file(path: &Path) -> Result<BridgeConfig, ConfigFileError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or(ConfigFileError::NoExtension)?;

    match extension.to_lowercase().as_str() {
        "toml" => load_from_toml(path),
        "yaml" | "yml" => load_from_yaml(path),
        other => Err(ConfigFileError::UnsupportedFormat(other.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheBackend;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.toml");

        let toml_content = r#"
[cache]
key_prefix = "ids"
ttl_seconds = 120
backend = "redis"
redis_url = "redis://localhost:6379"

[directory]
page_size = 100
login_url = "https://app.example.com/login"

[provider]
project_id = "demo-project"

[local]
key_name = "firebase_uid"
"#;
        fs::write(&path, toml_content).unwrap();

        let config = load_from_file(&path).unwrap();
        assert_eq!(config.cache.key_prefix, "ids");
        assert_eq!(config.cache.ttl_seconds, 120);
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.directory.page_size, 100);
        assert_eq!(config.directory.delete_batch_size, 1000);
        assert_eq!(config.provider.project_id, "demo-project");
        assert_eq!(config.local.key_name, "firebase_uid");
        assert_eq!(config.local.table, "identity_users");
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.yml");

        let yaml_content = r#"
cache:
  ttl_seconds: 30
provider:
  project_id: yaml-project
  retry:
    max_retries: 1
"#;
        fs::write(&path, yaml_content).unwrap();

        let config = load_from_file(&path).unwrap();
        assert_eq!(config.cache.ttl_seconds, 30);
        assert_eq!(config.cache.key_prefix, "fauth");
        assert_eq!(config.provider.project_id, "yaml-project");
        assert_eq!(config.provider.retry.max_retries, 1);
        assert_eq!(config.provider.retry.initial_backoff_ms, 100);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.json");
        fs::write(&path, "{}").unwrap();

        assert!(matches!(
            load_from_file(&path),
            Err(ConfigFileError::UnsupportedFormat(ext)) if ext == "json"
        ));
    }

    #[test]
    fn test_missing_file_and_extension() {
        assert!(matches!(
            load_from_file(Path::new("/nonexistent/bridge.toml")),
            Err(ConfigFileError::FileNotFound(_))
        ));
        assert!(matches!(
            load_from_file(Path::new("bridge")),
            Err(ConfigFileError::NoExtension)
        ));
    }

    #[test]
    fn test_malformed_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.toml");
        fs::write(&path, "[cache\nttl_seconds = ").unwrap();

        assert!(matches!(
            load_from_toml(&path),
            Err(ConfigFileError::TomlParse(_))
        ));
    }
}
