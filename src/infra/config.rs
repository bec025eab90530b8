//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::checkin::EventInfo;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "main-entrance", "hall-b")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "gate-1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodecConfig {
    /// Server-held signing secret for scan payloads (min 16 bytes).
    /// The default is for development only.
    #[serde(default = "default_secret")]
    pub secret: String,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self { secret: default_secret() }
    }
}

fn default_secret() -> String {
    "dev-secret-do-not-use-in-production".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Bound on every store operation during validation
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
    /// JSONL file of issued tickets loaded at startup (issuance feed)
    #[serde(default = "default_tickets_file")]
    pub tickets_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { timeout_ms: default_store_timeout_ms(), tickets_file: default_tickets_file() }
    }
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_tickets_file() -> String {
    "tickets.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// File path for check-in records (JSONL format)
    #[serde(default = "default_ledger_file")]
    pub file: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { file: default_ledger_file() }
    }
}

fn default_ledger_file() -> String {
    "checkins.jsonl".to_string()
}

/// TOML event catalog entry
#[derive(Debug, Clone, Deserialize)]
pub struct EventEntry {
    pub id: String,
    pub name: String,
    pub capacity: u32,
    #[serde(default)]
    pub attendees: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub events: Vec<EventEntry>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    secret: String,
    store_timeout_ms: u64,
    tickets_file: String,
    ledger_file: String,
    events: Vec<EventInfo>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            secret: default_secret(),
            store_timeout_ms: default_store_timeout_ms(),
            tickets_file: default_tickets_file(),
            ledger_file: default_ledger_file(),
            events: Self::default_events(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    fn default_events() -> Vec<EventInfo> {
        vec![EventInfo {
            id: "EVT-001".into(),
            name: "Tech Summit 2024".to_string(),
            capacity: 500,
            attendees: 342,
        }]
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let events = toml_config
            .events
            .into_iter()
            .map(|e| EventInfo {
                id: e.id.as_str().into(),
                name: e.name,
                capacity: e.capacity,
                attendees: e.attendees,
            })
            .collect::<Vec<_>>();

        Ok(Self {
            site_id: toml_config.site.id,
            secret: toml_config.codec.secret,
            store_timeout_ms: toml_config.store.timeout_ms,
            tickets_file: toml_config.store.tickets_file,
            ledger_file: toml_config.ledger.file,
            events: if events.is_empty() { Self::default_events() } else { events },
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn secret(&self) -> &[u8] {
        self.secret.as_bytes()
    }

    pub fn store_timeout_ms(&self) -> u64 {
        self.store_timeout_ms
    }

    pub fn tickets_file(&self) -> &str {
        &self.tickets_file
    }

    pub fn ledger_file(&self) -> &str {
        &self.ledger_file
    }

    pub fn events(&self) -> &[EventInfo] {
        &self.events
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the ledger file
    #[cfg(test)]
    pub fn with_ledger_file(mut self, path: &str) -> Self {
        self.ledger_file = path.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "gate-1");
        assert_eq!(config.store_timeout_ms(), 2000);
        assert_eq!(config.ledger_file(), "checkins.jsonl");
        assert_eq!(config.tickets_file(), "tickets.jsonl");
        assert_eq!(config.events().len(), 1);
        assert_eq!(config.events()[0].capacity, 500);
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["gatekeeper".to_string()];
        // CONFIG_FILE may leak in from the environment; only assert the
        // argument paths here
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "gatekeeper".to_string(),
            "--config".to_string(),
            "config/prod.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/prod.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["gatekeeper".to_string(), "--config=config/venue.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/venue.toml");
    }

    #[test]
    fn test_load_from_path_fallback() {
        let config = Config::load_from_path("/nonexistent/config.toml");
        assert_eq!(config.site_id(), "gate-1");
        assert_eq!(config.store_timeout_ms(), 2000);
    }
}
