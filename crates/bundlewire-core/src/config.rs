use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use bundlewire_util::errors::WiringError;

/// User configuration loaded from `~/.bundlewire/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Search limits from `[resolver]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound on candidate permutations checked in one resolve.
    #[serde(default = "default_max_permutations", rename = "max-permutations")]
    pub max_permutations: usize,
    /// Drop an optional root that keeps failing instead of failing the resolve.
    #[serde(default = "default_drop_faulty_optional", rename = "drop-faulty-optional")]
    pub drop_faulty_optional: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_permutations: default_max_permutations(),
            drop_faulty_optional: default_drop_faulty_optional(),
        }
    }
}

fn default_max_permutations() -> usize {
    10_000
}

fn default_drop_faulty_optional() -> bool {
    true
}

/// Logging defaults from `[log]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load the configuration from `path`, or from the default location when
    /// `path` is `None`. A missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> miette::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = Self::default_path();
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let content = std::fs::read_to_string(&path).map_err(|e| WiringError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            WiringError::Config {
                message: format!("Failed to parse config: {e}"),
            }
            .into()
        })
    }

    /// Returns the default path to the config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

/// Returns the path to the bundlewire data directory (`~/.bundlewire/`).
pub fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".bundlewire")
}
