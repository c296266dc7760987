// Configuration file loader for the STT service
//
// Reads an optional flat TOML file and exports its keys as environment variables,
// so that `config` only ever has to look at the environment.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use toml::Value;

const DEFAULT_CONFIG_FILE_PATH: &str = "stt_service.conf";

/// Resolves the config file location (`STT_CONFIG_FILE` or the default name)
pub fn config_file_path() -> PathBuf {
    env::var("STT_CONFIG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE_PATH))
}

/// Parses flat TOML content into string key-value pairs
///
/// Nested tables and arrays are skipped with a warning.
pub fn parse_config(content: &str) -> Result<HashMap<String, String>, toml::de::Error> {
    let table: toml::Table = content.parse()?;
    let mut config_map = HashMap::new();

    for (key, value) in table {
        let value = match value {
            Value::String(s) => s,
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            _ => {
                warn!("Skipping unsupported TOML value type for key: {}", key);
                continue;
            }
        };
        config_map.insert(key, value);
    }

    Ok(config_map)
}

/// Loads configuration from the TOML file into the environment
///
/// Configuration precedence (highest to lowest):
/// 1. Environment variables
/// 2. Configuration file values
/// 3. Defaults in `config::defaults`
///
/// Must be called before any worker threads are spawned.
///
/// # Returns
///
/// Returns true if the config file was found and applied, false otherwise
pub fn load_config(path: &Path) -> bool {
    if !path.exists() {
        debug!("Configuration file not found at: {}", path.display());
        return false;
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read configuration file {}: {}", path.display(), e);
            return false;
        }
    };

    let config_map = match parse_config(&content) {
        Ok(map) => map,
        Err(e) => {
            warn!("Failed to parse configuration file {}: {}", path.display(), e);
            return false;
        }
    };

    for (key, value) in config_map {
        if env::var(&key).is_err() {
            debug!("Setting env var from config file: {}", key);
            env::set_var(key, value);
        } else {
            debug!("Env var already exists, skipping: {}", key);
        }
    }

    info!("Configuration loaded from {}", path.display());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_values() {
        let map = parse_config(
            r#"
            STT_MODEL_SIZE = "base.en"
            STT_BEAM_SIZE = 5
            STT_METRICS_ENABLED = false
            "#,
        )
        .unwrap();

        assert_eq!(map.get("STT_MODEL_SIZE").map(String::as_str), Some("base.en"));
        assert_eq!(map.get("STT_BEAM_SIZE").map(String::as_str), Some("5"));
        assert_eq!(map.get("STT_METRICS_ENABLED").map(String::as_str), Some("false"));
    }

    #[test]
    fn test_parse_skips_nested_values() {
        let map = parse_config(
            r#"
            STT_DEVICE = "cpu"
            LIST = [1, 2]

            [section]
            key = "value"
            "#,
        )
        .unwrap();

        assert_eq!(map.len(), 1);
        assert!(map.contains_key("STT_DEVICE"));
    }

    #[test]
    fn test_parse_rejects_invalid_toml() {
        assert!(parse_config("STT_DEVICE = ").is_err());
    }

    #[test]
    fn test_missing_file_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!load_config(&dir.path().join("absent.conf")));
    }

    #[test]
    fn test_load_keeps_existing_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stt_service.conf");
        fs::write(
            &path,
            "STT_LOADER_TEST_NEW = \"from-file\"\nSTT_LOADER_TEST_SET = \"from-file\"\n",
        )
        .unwrap();
        env::set_var("STT_LOADER_TEST_SET", "from-env");

        assert!(load_config(&path));
        assert_eq!(env::var("STT_LOADER_TEST_NEW").unwrap(), "from-file");
        assert_eq!(env::var("STT_LOADER_TEST_SET").unwrap(), "from-env");
    }
}
