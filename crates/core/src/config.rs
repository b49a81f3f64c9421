//! Layered configuration: defaults, YAML file, environment, caller overrides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-5-sonnet-20241022-v2:0";
pub const DEFAULT_LENS: &str = "wellarchitected";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BedrockConfig {
    pub region: String,
    pub model_id: String,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub requests_per_second: f64,
    pub semantic_analysis: bool,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.into(),
            model_id: DEFAULT_MODEL_ID.into(),
            max_retries: 3,
            timeout_seconds: 60,
            max_tokens: 4096,
            temperature: 0.1,
            requests_per_second: 2.0,
            semantic_analysis: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub session_dir: PathBuf,
    pub log_dir: PathBuf,
    pub retention_days: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            session_dir: PathBuf::from("~/.waffle/sessions"),
            log_dir: PathBuf::from("~/.waffle/logs"),
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IacConfig {
    pub framework: String,
    pub max_file_size_mb: u64,
    pub max_files: usize,
}

impl Default for IacConfig {
    fn default() -> Self {
        Self { framework: "terraform".into(), max_file_size_mb: 10, max_files: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WafrConfig {
    pub default_scope: String,
    pub default_lens: String,
    pub guidance_limit: usize,
}

impl Default for WafrConfig {
    fn default() -> Self {
        Self { default_scope: "workload".into(), default_lens: DEFAULT_LENS.into(), guidance_limit: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogLevel {
    #[serde(rename = "DEBUG", alias = "debug")]
    Debug,
    #[default]
    #[serde(rename = "INFO", alias = "info")]
    Info,
    #[serde(rename = "WARNING", alias = "warning", alias = "WARN", alias = "warn")]
    Warning,
    #[serde(rename = "ERROR", alias = "error")]
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(Error::validation("logging.level", s, "must be one of DEBUG, INFO, WARNING, ERROR")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub redact_sensitive_data: bool,
    pub encrypt_sessions: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self { redact_sensitive_data: true, encrypt_sessions: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub profile: String,
    pub region: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self { profile: String::new(), region: DEFAULT_REGION.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub bedrock: BedrockConfig,
    pub storage: StorageConfig,
    pub iac: IacConfig,
    pub wafr: WafrConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub aws: AwsConfig,
    /// Environment values that were set but not usable, kept for the caller
    /// to report once logging is up.
    #[serde(skip)]
    pub env_warnings: Vec<String>,
}

impl Config {
    /// Defaults, then the YAML file (explicit path, or `~/.waffle/config.yaml`
    /// when present), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };
        cfg.env_warnings = cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::file(path, "read", e))?;
        Self::from_yaml_str(&raw).map_err(|e| e.context(format!("loading config {}", path.display())))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| Error::parsing("config", "yaml", e))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::parsing("config", "yaml", e))
    }

    /// Environment overlay. `AWS_REGION` also moves the Bedrock region while
    /// that is still the default. Returns a note for each value ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut ignored = Vec::new();
        if let Some(profile) = lookup("AWS_PROFILE").filter(|v| !v.is_empty()) {
            self.aws.profile = profile;
        }
        if let Some(region) = lookup("AWS_REGION").filter(|v| !v.is_empty()) {
            if self.bedrock.region == DEFAULT_REGION {
                self.bedrock.region = region.clone();
            }
            self.aws.region = region;
        }
        if let Some(level) = lookup("WAFFLE_LOG_LEVEL") {
            match level.parse() {
                Ok(level) => self.logging.level = level,
                Err(err) => ignored.push(format!("ignoring WAFFLE_LOG_LEVEL: {err}")),
            }
        }
        ignored
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.bedrock.temperature) {
            return Err(Error::validation("bedrock.temperature", self.bedrock.temperature, "must be between 0 and 1"));
        }
        if self.bedrock.model_id.trim().is_empty() {
            return Err(Error::validation("bedrock.model_id", "", "must not be empty"));
        }
        if self.bedrock.timeout_seconds == 0 {
            return Err(Error::validation("bedrock.timeout_seconds", 0, "must be greater than 0"));
        }
        if self.bedrock.max_tokens == 0 {
            return Err(Error::validation("bedrock.max_tokens", 0, "must be greater than 0"));
        }
        if !(self.bedrock.requests_per_second > 0.0) {
            return Err(Error::validation("bedrock.requests_per_second", self.bedrock.requests_per_second, "must be greater than 0"));
        }
        if self.storage.retention_days < 0 {
            return Err(Error::validation("storage.retention_days", self.storage.retention_days, "must be >= 0"));
        }
        if self.iac.max_file_size_mb == 0 {
            return Err(Error::validation("iac.max_file_size_mb", 0, "must be greater than 0"));
        }
        if self.iac.max_files == 0 {
            return Err(Error::validation("iac.max_files", 0, "must be greater than 0"));
        }
        if !self.iac.framework.eq_ignore_ascii_case("terraform") {
            return Err(Error::validation("iac.framework", &self.iac.framework, "only terraform is supported"));
        }
        if self.wafr.default_lens.trim().is_empty() {
            return Err(Error::validation("wafr.default_lens", "", "must not be empty"));
        }
        Ok(())
    }

    pub fn session_dir(&self) -> PathBuf {
        expand_home(&self.storage.session_dir)
    }

    pub fn log_dir(&self) -> PathBuf {
        expand_home(&self.storage.log_dir)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.iac.max_file_size_mb * 1024 * 1024
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".waffle").join("config.yaml"))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").filter(|h| !h.is_empty()).map(PathBuf::from)
}

/// Expands a leading `~` to `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
