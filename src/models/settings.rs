//! Application settings loaded from `settings.toml`.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ContentType;

/// Root application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP fetching behavior for `extract`
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Directories and files used by the pipeline
    #[serde(default)]
    pub paths: PathsConfig,

    /// Timeout and retry policy for feed delivery
    #[serde(default)]
    pub transport: TransportConfig,

    /// Deployment environments
    #[serde(default)]
    pub environments: Vec<Environment>,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load settings or return defaults if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Settings load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate settings values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.transport.timeout_secs == 0 {
            return Err(AppError::validation("transport.timeout_secs must be > 0"));
        }
        let mut seen = Vec::new();
        for env in &self.environments {
            if seen.contains(&env.name) {
                return Err(AppError::validation(format!(
                    "environment '{}' defined twice",
                    env.name
                )));
            }
            seen.push(env.name);
            if let Some(host) = &env.host {
                if host.host.trim().is_empty() {
                    return Err(AppError::validation(format!(
                        "environment '{}' has an empty host",
                        env.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn environment(&self, name: EnvironmentName) -> Result<&Environment> {
        self.environments
            .iter()
            .find(|env| env.name == name)
            .ok_or_else(|| AppError::config(format!("environment '{name}' is not configured")))
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent requests
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding `content.yml` and `<organisation>.yml`
    #[serde(default = "defaults::config_dir")]
    pub config_dir: PathBuf,

    /// Staging directory for feed files
    #[serde(default = "defaults::working_dir")]
    pub working_dir: PathBuf,

    /// JSON snapshot of items, organisations, sites and images
    #[serde(default = "defaults::snapshot_file")]
    pub snapshot_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_dir: defaults::config_dir(),
            working_dir: defaults::working_dir(),
            snapshot_file: defaults::snapshot_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "defaults::transport_timeout")]
    pub timeout_secs: u64,

    /// Additional attempts after the first failure
    #[serde(default = "defaults::retries")]
    pub retries: u32,

    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::transport_timeout(),
            retries: defaults::retries(),
            retry_delay_ms: defaults::retry_delay(),
        }
    }
}

/// Name of a deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentName {
    #[serde(alias = "DEV")]
    Dev,
    #[serde(alias = "STAGE")]
    Stage,
    #[serde(alias = "PROD")]
    Prod,
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvironmentName::Dev => "dev",
            EnvironmentName::Stage => "stage",
            EnvironmentName::Prod => "prod",
        };
        f.write_str(name)
    }
}

impl FromStr for EnvironmentName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(EnvironmentName::Dev),
            "stage" => Ok(EnvironmentName::Stage),
            "prod" => Ok(EnvironmentName::Prod),
            _ => Err(format!("unknown environment '{s}'")),
        }
    }
}

/// SSH host a feed is copied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "defaults::ssh_port")]
    pub port: u16,
    /// Remote directory receiving feeds
    pub directory: String,
    /// Private key passed to ssh/scp with `-i`
    #[serde(default)]
    pub identity: Option<PathBuf>,
}

impl HostSettings {
    /// `user@host` or `host`.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

/// A deployment environment and its delivery targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub name: EnvironmentName,

    /// Base URL prepended to relative image paths
    #[serde(default)]
    pub images: String,

    /// Feed path template per content type key; `${filename}` is replaced
    #[serde(default)]
    pub feeds: HashMap<String, String>,

    /// S3 bucket receiving feeds
    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default)]
    pub host: Option<HostSettings>,

    /// Local directory receiving feeds
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Environment {
    /// Remote path of a feed file for `content_type`.
    ///
    /// Falls back to the bare filename when no template is configured.
    pub fn feed_path(&self, content_type: ContentType, filename: &str) -> String {
        match self.feeds.get(content_type.key()) {
            Some(template) if template.contains("${filename}") => {
                template.replace("${filename}", filename)
            }
            Some(template) if !template.is_empty() => {
                format!("{}/{filename}", template.trim_end_matches('/'))
            }
            _ => filename.to_string(),
        }
    }

    /// Absolute URL of an image path relative to the images base.
    pub fn image_url(&self, path: &str) -> String {
        if self.images.is_empty() {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.images.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; content-feeds/1.0)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        100
    }
    pub fn max_concurrent() -> usize {
        5
    }

    // Path defaults
    pub fn config_dir() -> PathBuf {
        PathBuf::from("config")
    }
    pub fn working_dir() -> PathBuf {
        PathBuf::from("work")
    }
    pub fn snapshot_file() -> PathBuf {
        PathBuf::from("data/snapshot.json")
    }

    // Transport defaults
    pub fn transport_timeout() -> u64 {
        60
    }
    pub fn retries() -> u32 {
        2
    }
    pub fn retry_delay() -> u64 {
        1000
    }
    pub fn ssh_port() -> u16 {
        22
    }
}
