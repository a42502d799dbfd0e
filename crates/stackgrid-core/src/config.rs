//! stackd.toml configuration.
//!
//! Every key has a default, so an empty file (or no file at all) is a
//! valid configuration. Durations are strings such as `"500ms"`, `"5s"`
//! or `"2m"` and are parsed on access.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::vocab;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub store: StoreConfig,
    pub resources: ResourcesConfig,
    pub projects: ProjectsConfig,
    pub commands: CommandsConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub endpoint: String,
    pub graph: String,
    pub request_timeout: String,
    pub ready_attempts: u32,
    pub ready_backoff: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    pub base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectsConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub compose: String,
    pub git: String,
    pub timeout: String,
    pub up_timeout: String,
    pub log_tail: u32,
}

/// Container host integration. Network join and proxy restart only happen
/// when the corresponding key is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub public_network: Option<String>,
    pub proxy_container: Option<String>,
    pub prune_images: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://database:8890/sparql".to_string(),
            graph: "http://mu.semte.ch/application".to_string(),
            request_timeout: "30s".to_string(),
            ready_attempts: 10,
            ready_backoff: "1s".to_string(),
        }
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            base: vocab::DEFAULT_BASE_RESOURCE.to_string(),
        }
    }
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/data"),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            compose: "docker-compose".to_string(),
            git: "git".to_string(),
            timeout: "600s".to_string(),
            up_timeout: "1800s".to_string(),
            log_tail: 1000,
        }
    }
}

impl StackConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Reject unparseable durations up front instead of at first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.request_timeout()?;
        self.store.ready_backoff()?;
        self.commands.timeout()?;
        self.commands.up_timeout()?;
        Ok(())
    }
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        duration(&self.request_timeout, "store.request_timeout")
    }

    pub fn ready_backoff(&self) -> Result<Duration, ConfigError> {
        duration(&self.ready_backoff, "store.ready_backoff")
    }
}

impl CommandsConfig {
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        duration(&self.timeout, "commands.timeout")
    }

    pub fn up_timeout(&self) -> Result<Duration, ConfigError> {
        duration(&self.up_timeout, "commands.up_timeout")
    }
}

fn duration(value: &str, key: &'static str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration(value.to_string(), key))
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
