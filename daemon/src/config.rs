use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PickerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub widget: WidgetConfig,
}

impl PickerConfig {
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path();
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read config file {}", config_path.display()))?;
            return Self::parse(&raw)
                .with_context(|| format!("failed to parse TOML from {}", config_path.display()));
        }

        Ok(PickerConfig::default())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

fn resolve_config_path() -> PathBuf {
    if let Ok(path) = env::var("STICKERPICKER_CONFIG") {
        return Path::new(&path).to_path_buf();
    }

    if let Some(base) = dirs::config_dir() {
        return base.join("stickerpicker").join("config.toml");
    }

    Path::new("/tmp/stickerpicker.toml").to_path_buf()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Widget API traffic with the embedding client.
    #[serde(default = "default_host_socket_path")]
    pub host_socket_path: PathBuf,
    /// Commands from the picker UI.
    #[serde(default = "default_control_socket_path")]
    pub control_socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host_socket_path: default_host_socket_path(),
            control_socket_path: default_control_socket_path(),
        }
    }
}

fn default_host_socket_path() -> PathBuf {
    Path::new("/tmp/stickerpicker-host.sock").to_path_buf()
}

fn default_control_socket_path() -> PathBuf {
    Path::new("/tmp/stickerpicker-control.sock").to_path_buf()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    match dirs::data_dir() {
        Some(base) => base.join("stickerpicker").join("storage.json"),
        None => Path::new("/tmp/stickerpicker-storage.json").to_path_buf(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Directory or `http(s)://` URL holding `index.json` and the pack files.
    #[serde(default = "default_catalog_base")]
    pub base: String,
    #[serde(default = "default_homeserver_url")]
    pub homeserver_url: String,
    #[serde(default = "default_frequently_used_limit")]
    pub frequently_used_limit: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base: default_catalog_base(),
            homeserver_url: default_homeserver_url(),
            frequently_used_limit: default_frequently_used_limit(),
        }
    }
}

fn default_catalog_base() -> String {
    "packs".to_string()
}

fn default_homeserver_url() -> String {
    "https://matrix-client.matrix.org".to_string()
}

fn default_frequently_used_limit() -> usize {
    stickerpicker_core::DEFAULT_TOP_LIMIT
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WidgetConfig {
    /// Widget id known ahead of the first host request.
    #[serde(default)]
    pub widget_id: Option<String>,
    #[serde(default)]
    pub upload_file: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = PickerConfig::parse("").unwrap();
        assert_eq!(config.catalog.base, "packs");
        assert_eq!(config.catalog.frequently_used_limit, 16);
        assert_eq!(
            config.catalog.homeserver_url,
            "https://matrix-client.matrix.org"
        );
        assert!(config.widget.widget_id.is_none());
        assert!(!config.widget.upload_file);
    }

    #[test]
    fn parses_sections() {
        let raw = r#"
            [server]
            host_socket_path = "/run/picker/host.sock"

            [catalog]
            base = "https://stickers.example.com/packs"
            frequently_used_limit = 24

            [widget]
            widget_id = "stickerpicker"
            upload_file = true
        "#;
        let config = PickerConfig::parse(raw).unwrap();
        assert_eq!(
            config.server.host_socket_path,
            PathBuf::from("/run/picker/host.sock")
        );
        assert_eq!(
            config.server.control_socket_path,
            default_control_socket_path()
        );
        assert_eq!(config.catalog.base, "https://stickers.example.com/packs");
        assert_eq!(config.catalog.frequently_used_limit, 24);
        assert_eq!(config.widget.widget_id.as_deref(), Some("stickerpicker"));
        assert!(config.widget.upload_file);
    }
}
