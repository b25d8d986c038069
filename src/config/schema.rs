//! Configuration schema for depcache
//!
//! Configuration is stored at `~/.config/depcache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Resolution cache settings
    pub cache: CacheConfig,

    /// External solver settings
    pub resolver: ResolverConfig,

    /// Bulk re-resolution settings
    pub bulk: BulkConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Append diagnostics events as JSON lines to this file
    pub diagnostics_log: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            diagnostics_log: None,
        }
    }
}

/// Resolution cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory (default: platform cache dir)
    pub dir: Option<PathBuf>,
}

/// External solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Solver executable
    pub command: String,

    /// Extra arguments passed before the built-in ones
    pub args: Vec<String>,

    /// Kill the solver after this many seconds
    pub timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            command: "pip-compile".to_string(),
            args: vec![],
            timeout_secs: 300,
        }
    }
}

/// Bulk re-resolution configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Maximum concurrent solver invocations (default: available parallelism)
    pub max_concurrent: Option<usize>,
}
