use crate::core::models::{ProjectLayout, VendorFiles};
use crate::infrastructure::server::ServerConfig;
use crate::utils::{KilnError, Logger, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "kiln.config.json";
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Configuration file format (kiln.config.json). Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KilnConfig {
    /// Artifact store (default: "build")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<String>,

    /// Entry module, relative to the project root (default: "src/index.js")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    /// Bundle file name inside build/scripts (default: "game.js")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<VendorSection>,

    /// Lowering target (default: "es2015")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<WatchSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

/// Config loader that supports config files with CLI override
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load kiln.config.json from the project root if it exists
    pub fn load_from_file(root: &Path) -> Result<Option<KilnConfig>> {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            Logger::debug(&format!("No {} found, using defaults", CONFIG_FILE));
            return Ok(None);
        }

        Logger::debug(&format!("Loading config from {}", config_path.display()));

        let content = std::fs::read_to_string(&config_path)?;
        let config: KilnConfig = serde_json::from_str(&content)
            .map_err(|e| KilnError::config(format!("Failed to parse {}: {}", CONFIG_FILE, e)))?;

        Ok(Some(config))
    }

    /// Resolve the project layout: config file values over built-in defaults.
    pub fn layout(file_config: Option<&KilnConfig>, root: PathBuf) -> ProjectLayout {
        let mut layout = ProjectLayout::new(root);
        let Some(config) = file_config else {
            return layout;
        };

        if let Some(dir) = &config.build_dir {
            layout.build_dir = resolve(&layout.root, dir);
        }
        if let Some(dir) = &config.static_dir {
            layout.static_dir = resolve(&layout.root, dir);
        }
        if let Some(dir) = &config.source_dir {
            let source_dir = resolve(&layout.root, dir);
            layout.entry_file = source_dir.join(crate::core::models::ENTRY_FILE);
            layout.source_dir = source_dir;
        }
        if let Some(entry) = &config.entry {
            layout.entry_file = resolve(&layout.root, entry);
        }
        if let Some(output) = &config.output_file {
            layout.output_file = output.clone();
        }
        if let Some(dir) = &config.vendor_dir {
            layout.vendor_dir = resolve(&layout.root, dir);
        }
        if let Some(vendor) = &config.vendor {
            let defaults = VendorFiles::default();
            layout.vendor_files = VendorFiles {
                minified: vendor.minified.clone().unwrap_or(defaults.minified),
                full: vendor.full.clone().unwrap_or(defaults.full),
                source_map: vendor.source_map.clone().unwrap_or(defaults.source_map),
            };
        }
        if let Some(target) = &config.target {
            layout.target = target.clone();
        }

        layout
    }

    /// Merge server settings (CLI > config file > default)
    pub fn server(
        file_config: Option<&KilnConfig>,
        port: Option<u16>,
        host: Option<String>,
    ) -> ServerConfig {
        let defaults = ServerConfig::default();
        let section = file_config.and_then(|c| c.server.as_ref());

        ServerConfig {
            port: port
                .or_else(|| section.and_then(|s| s.port))
                .unwrap_or(defaults.port),
            host: host
                .or_else(|| section.and_then(|s| s.host.clone()))
                .unwrap_or(defaults.host),
        }
    }

    pub fn debounce(file_config: Option<&KilnConfig>) -> Duration {
        let ms = file_config
            .and_then(|c| c.watch.as_ref())
            .and_then(|w| w.debounce_ms)
            .unwrap_or(DEFAULT_DEBOUNCE_MS);
        Duration::from_millis(ms)
    }
}

fn resolve(root: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
