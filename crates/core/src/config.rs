use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_DATA_DIR: &str = "MORPHLYCA_DATA_DIR";

pub const ENV_API_URL: &str = "API_URL";
pub const ENV_PUBLIC_API_URL: &str = "NEXT_PUBLIC_API_URL";
pub const ENV_S3_ENDPOINT: &str = "S3_ENDPOINT";
pub const ENV_S3_REGION: &str = "S3_REGION";
pub const ENV_S3_FORCE_PATH_STYLE: &str = "S3_FORCE_PATH_STYLE";
pub const ENV_S3_ACCESS_KEY: &str = "S3_ACCESS_KEY";
pub const ENV_S3_SECRET_KEY: &str = "S3_SECRET_KEY";
pub const ENV_PORT: &str = "PORT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Object store location. Access keys are deliberately absent: they are read
/// from the environment on every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub force_path_style: bool,
    pub signed_url_expiry_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub history_take: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            host: "0.0.0.0".to_string(),
            static_dir: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            force_path_style: true,
            signed_url_expiry_secs: 60,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            history_take: 5,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl StorageConfig {
    pub fn signed_url_expiry(&self) -> Duration {
        Duration::from_secs(self.signed_url_expiry_secs.max(1))
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl AppConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config TOML: {}", path.display()))
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .context("config path does not have a parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory: {}", parent.display()))?;

        let encoded = toml::to_string_pretty(self).context("failed to serialize config TOML")?;
        fs::write(path, encoded)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Apply the deployment environment on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_empty(ENV_API_URL).or_else(|| non_empty(ENV_PUBLIC_API_URL)) {
            self.api.base_url = url.trim().to_string();
        }
        if let Some(endpoint) = non_empty(ENV_S3_ENDPOINT) {
            self.storage.endpoint = endpoint.trim().to_string();
        }
        if let Some(region) = non_empty(ENV_S3_REGION) {
            self.storage.region = region.trim().to_string();
        }
        if let Some(flag) = non_empty(ENV_S3_FORCE_PATH_STYLE) {
            self.storage.force_path_style = flag.trim() == "true";
        }
        if let Some(port) = non_empty(ENV_PORT).and_then(|value| value.trim().parse().ok()) {
            self.server.port = port;
        }
    }
}

/// Resolve the data directory with 3-tier priority:
/// 1. CLI override if provided
/// 2. MORPHLYCA_DATA_DIR environment variable
/// 3. Default: ./data
pub fn data_dir(cli_override: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_override {
        return path.to_path_buf();
    }

    if let Some(env_dir) = env::var_os(ENV_DATA_DIR) {
        return PathBuf::from(env_dir);
    }

    PathBuf::from("data")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

/// Create the data directory and a default config.toml when either is missing.
/// An existing config file is never rewritten.
pub fn initialize_data_dir(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
    }

    let cfg_path = config_path(data_dir);
    if !cfg_path.exists() {
        AppConfig::default().save_to_path(&cfg_path)?;
    }

    Ok(())
}

pub fn resolve_relative_to(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.server.port, 3001);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert!(cfg.server.static_dir.is_none());
        assert_eq!(cfg.api.base_url, "http://localhost:3000");
        assert_eq!(cfg.storage.region, "us-east-1");
        assert!(cfg.storage.force_path_style);
        assert_eq!(cfg.storage.signed_url_expiry(), Duration::from_secs(60));
        assert_eq!(cfg.polling.interval(), Duration::from_secs(2));
        assert_eq!(cfg.polling.history_take, 5);
    }

    #[test]
    fn toml_roundtrip_preserves_values() {
        let original = AppConfig::default();
        let encoded = toml::to_string_pretty(&original).expect("serialize config");
        let decoded: AppConfig = toml::from_str(&encoded).expect("deserialize config");
        assert_eq!(decoded, original);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let decoded: AppConfig =
            toml::from_str("[storage]\nregion = \"eu-central-1\"\n").expect("parse partial");
        assert_eq!(decoded.storage.region, "eu-central-1");
        assert!(decoded.storage.force_path_style);
        assert_eq!(decoded.api, ApiConfig::default());
    }

    #[test]
    fn load_from_nonexistent_file_returns_defaults() {
        let dir = tempdir().expect("tempdir");
        let loaded = AppConfig::load_from_path(&dir.path().join("missing.toml"))
            .expect("load config from nonexistent path");
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn env_overrides_prefer_api_url_over_public_variant() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_API_URL, "https://api.internal"),
            (ENV_PUBLIC_API_URL, "https://api.public"),
            (ENV_S3_ENDPOINT, "https://minio.example.com"),
            (ENV_S3_FORCE_PATH_STYLE, "false"),
            (ENV_PORT, "8080"),
        ]);

        let mut cfg = AppConfig::default();
        cfg.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.api.base_url, "https://api.internal");
        assert_eq!(cfg.storage.endpoint, "https://minio.example.com");
        assert!(!cfg.storage.force_path_style);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.storage.region, "us-east-1");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides_from(|key| (key == ENV_API_URL).then(|| "   ".to_string()));
        assert_eq!(cfg.api.base_url, "http://localhost:3000");
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let result = data_dir(Some(Path::new("/custom")));
        assert_eq!(result, PathBuf::from("/custom"));
    }

    #[test]
    fn config_path_is_data_dir_join_config_toml() {
        let result = config_path(Path::new("/data"));
        assert_eq!(result, PathBuf::from("/data/config.toml"));
    }

    #[test]
    fn initialize_creates_data_dir_and_config() {
        let temp = tempdir().expect("tempdir");
        let data = temp.path().join("nested");
        initialize_data_dir(&data).expect("initialize data dir");

        assert!(data.join("config.toml").exists());
        let loaded = AppConfig::load_from_path(&config_path(&data)).expect("reload");
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn initialize_preserves_existing_config() {
        let temp = tempdir().expect("tempdir");
        let cfg_path = temp.path().join("config.toml");
        let custom_content = "[server]\nport = 9999\n";
        fs::write(&cfg_path, custom_content).expect("write custom config");

        initialize_data_dir(temp.path()).expect("initialize data dir");

        let content = fs::read_to_string(&cfg_path).expect("read config");
        assert_eq!(content, custom_content);
    }

    #[test]
    fn resolve_relative_to_joins_relative_path() {
        assert_eq!(
            resolve_relative_to(Path::new("/base"), Path::new("sub")),
            PathBuf::from("/base/sub")
        );
        assert_eq!(
            resolve_relative_to(Path::new("/base"), Path::new("/abs/path")),
            PathBuf::from("/abs/path")
        );
    }
}
