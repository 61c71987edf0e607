//! Configuration file support

use docchat_api::DEFAULT_BASE_URL;
use docchat_core::DEFAULT_GREETING;
use docchat_tui::Theme;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for docchat
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the answer service
    pub base_url: Option<String>,
    /// Give up on a request after this many seconds (0 or unset waits forever)
    pub request_timeout_secs: Option<u64>,
    /// Opening assistant message; an empty string disables it
    pub greeting: Option<String>,
    /// Whether to use TUI mode by default
    pub tui: Option<bool>,
    /// TUI color theme: "dark" or "light"
    pub theme: Option<String>,
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docchat")
    }

    /// Config file path; `DOCCHAT_CONFIG_PATH` wins over the default location
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("DOCCHAT_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default path, falling back to defaults on any problem
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Write a default config file if none exists; returns its path
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        Self::starter().save_to(&path)?;
        Ok(path)
    }

    /// What `--init-config` writes
    fn starter() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            request_timeout_secs: None,
            greeting: Some(DEFAULT_GREETING.to_string()),
            tui: Some(true),
            theme: Some("dark".to_string()),
        }
    }

    /// Pick the service URL: flag, then environment, then file, then default
    pub fn resolve_base_url(&self, flag: Option<String>, env: Option<String>) -> String {
        [flag, env, self.base_url.clone()]
            .into_iter()
            .flatten()
            .find(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// The configured TUI theme; unknown names fall back to dark
    pub fn theme(&self) -> Theme {
        match self.theme.as_deref() {
            None => Theme::default(),
            Some(name) => Theme::by_name(name).unwrap_or_else(|| {
                eprintln!("Warning: Unknown theme '{}', using dark", name);
                Theme::default()
            }),
        }
    }

    /// The greeting to open with, if any
    pub fn greeting(&self) -> Option<String> {
        match &self.greeting {
            None => Some(DEFAULT_GREETING.to_string()),
            Some(text) if text.trim().is_empty() => None,
            Some(text) => Some(text.clone()),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# docchat configuration file
# Place at ~/.config/docchat/config.toml (Linux), ~/Library/Application Support/docchat/config.toml (macOS)
# or %APPDATA%\docchat\config.toml (Windows). DOCCHAT_CONFIG_PATH overrides the location.

# Where the answer service listens (DOCCHAT_URL and --url take precedence)
base_url = "http://localhost:8000"

# Give up on a request after this many seconds; leave unset to wait as long as it takes
# request_timeout_secs = 120

# Opening assistant message; set to "" to start with an empty conversation
greeting = "Hello! Ask me anything based on the documents."

# Whether to use TUI mode by default (true by default)
# Set to false for simple stdin/stdout mode
tui = true

# TUI color theme: "dark" or "light"
theme = "dark"
"#
}
