//! Configuration file support for habitual
//!
//! Reads from .habitual/config.toml

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    /// API server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Where `habitual serve` listens
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Interface to bind
    /// Default: "127.0.0.1"
    #[serde(default = "default_host")]
    pub host: String,

    /// Default: 3000
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LogConfig {
    /// tracing filter used when HABITUAL_LOG is unset (e.g. "info", "habitual=debug")
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

/// Walk up from the current directory to the nearest .habitual folder
pub fn find_habitual_dir() -> Option<PathBuf> {
    let current_dir = std::env::current_dir().ok()?;
    let mut dir = current_dir.as_path();

    loop {
        let candidate = dir.join(".habitual");
        if candidate.is_dir() {
            return Some(candidate);
        }

        match dir.parent() {
            Some(parent) => dir = parent,
            None => break,
        }
    }
    None
}

impl Config {
    /// Load config from .habitual/config.toml
    /// Returns default config if there is no file; a file that doesn't parse is an error
    pub fn load() -> Result<Self, Error> {
        match Self::find_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn find_config_path() -> Option<PathBuf> {
        let path = find_habitual_dir()?.join("config.toml");
        path.exists().then_some(path)
    }

    /// "host:port" for the API server
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Commented default config written by `habitual init`
    pub fn default_toml() -> String {
        let defaults = Self::default();
        format!(
            "# habitual configuration\n\n[server]\nhost = \"{}\"\nport = {}\n\n[log]\n# Overridden by the HABITUAL_LOG env var\nfilter = \"{}\"\n",
            defaults.server.host, defaults.server.port, defaults.log.filter
        )
    }
}
