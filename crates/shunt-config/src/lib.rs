//! # shunt-config
//!
//! Configuration management for shunt.
//!
//! Loads configuration from:
//! 1. `~/.shunt/config.toml` (global)
//! 2. `.shunt/config.toml` (project-local, overrides global)
//! 3. The file named by `SHUNT_CONFIG`
//! 4. Environment variables (highest priority)
//!
//! The layer reads its configuration exactly once, from its load-time
//! constructor, before any hook consults it.

pub mod logging;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use logging::LogLevel;

/// Redirect registry size used when the config does not name one.
pub const DEFAULT_REDIRECT_CAPACITY: usize = 100;
/// Upper bound on `redirect.capacity`; the registry is a fixed array of this size.
pub const MAX_REDIRECT_CAPACITY: usize = 1024;
/// Payload served for `SHUNT_REDIRECT_PATH` when no content is given.
pub const DEFAULT_CONTENT: &str = "this is fun";

pub const ENV_CONFIG: &str = "SHUNT_CONFIG";
pub const ENV_REDIRECT_PATH: &str = "SHUNT_REDIRECT_PATH";
pub const ENV_REDIRECT_CONTENT: &str = "SHUNT_REDIRECT_CONTENT";
pub const ENV_LOG_LEVEL: &str = "SHUNT_LOG_LEVEL";
pub const ENV_DEBUG: &str = "SHUNT_DEBUG";
pub const ENV_ACCOUNTING: &str = "SHUNT_ACCOUNTING";
pub const ENV_REPORT: &str = "SHUNT_REPORT";

const PROJECT_CONFIG: &str = ".shunt/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub accounting: AccountingConfig,
    pub redirect: RedirectConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(
            Self::global_config_path().as_deref(),
            Path::new(PROJECT_CONFIG),
            |key| std::env::var(key).ok(),
        )
    }

    /// Load config from explicit locations, reading overrides through `var`.
    pub fn load_from(
        global: Option<&Path>,
        project: &Path,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                log_config_debug!("loading global config", path = ?global_path);
                config = Self::from_file(global_path)?;
            }
        }

        if project.exists() {
            log_config_debug!("loading project config", path = ?project);
            config.merge(Self::from_file(project)?);
        }

        if let Some(explicit) = var(ENV_CONFIG) {
            log_config_debug!("loading config named by SHUNT_CONFIG", path = %explicit);
            config.merge(Self::from_file(Path::new(&explicit))?);
        }

        config.apply_env_overrides(&var);
        config.validate()?;
        Ok(config)
    }

    /// Parse a single TOML file without merging or validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.shunt/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".shunt/config.toml"))
    }

    /// Merge another config over this one. Sections left at their defaults in
    /// `other` do not override.
    pub fn merge(&mut self, other: Config) {
        if other.accounting != AccountingConfig::default() {
            self.accounting = other.accounting;
        }
        if other.log != LogConfig::default() {
            self.log = other.log;
        }
        if !other.redirect.rules.is_empty() {
            self.redirect.rules = other.redirect.rules;
        }
        if other.redirect.capacity != DEFAULT_REDIRECT_CAPACITY {
            self.redirect.capacity = other.redirect.capacity;
        }
        if other.redirect.reads != ReadPolicy::default() {
            self.redirect.reads = other.redirect.reads;
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var(ENV_REDIRECT_PATH).filter(|p| !p.is_empty()) {
            let content = var(ENV_REDIRECT_CONTENT).unwrap_or_else(|| DEFAULT_CONTENT.to_string());
            self.redirect.rules.push(RuleConfig::exact(path, content));
        }
        if let Some(level) = var(ENV_LOG_LEVEL) {
            match level.parse() {
                Ok(level) => self.log.level = level,
                Err(_) => log_config_warn!("ignoring unknown log level", value = %level),
            }
        }
        if let Some(debug) = var(ENV_DEBUG) {
            self.log.debug = is_truthy(&debug);
        }
        if let Some(enabled) = var(ENV_ACCOUNTING) {
            self.accounting.enabled = is_truthy(&enabled);
        }
        if let Some(report) = var(ENV_REPORT) {
            self.accounting.report = is_truthy(&report);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacity = self.redirect.capacity;
        if capacity == 0 || capacity > MAX_REDIRECT_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "redirect.capacity must be between 1 and {MAX_REDIRECT_CAPACITY}, got {capacity}"
            )));
        }
        for (index, rule) in self.redirect.rules.iter().enumerate() {
            rule.validate()
                .map_err(|reason| ConfigError::Invalid(format!("redirect.rules[{index}]: {reason}")))?;
        }
        Ok(())
    }

    /// Environment handed to a child process so the layer loaded into it
    /// reads `config_file`.
    pub fn layer_env(&self, config_file: &Path) -> Vec<(String, String)> {
        let mut env = vec![
            (ENV_CONFIG.to_string(), config_file.display().to_string()),
            (ENV_LOG_LEVEL.to_string(), self.log.level.as_str().to_string()),
        ];
        if self.log.debug {
            env.push((ENV_DEBUG.to_string(), "1".to_string()));
        }
        env
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

/// Name of the loader variable that injects a library into a child process.
pub fn preload_var() -> &'static str {
    if cfg!(target_vendor = "apple") {
        "DYLD_INSERT_LIBRARIES"
    } else {
        "LD_PRELOAD"
    }
}

/// Allocation accounting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountingConfig {
    /// Count allocator traffic at all
    pub enabled: bool,
    /// Print the allocation report when the process exits
    pub report: bool,
    pub color: ColorChoice,
    pub shrink: ShrinkPolicy,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report: true,
            color: ColorChoice::Auto,
            shrink: ShrinkPolicy::Accumulate,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    /// Color when stderr is a terminal
    #[default]
    Auto,
    Always,
    Never,
}

/// How an in-place shrinking resize is booked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShrinkPolicy {
    /// Add the released bytes to `freed`
    #[default]
    Accumulate,
    /// Replace `freed` with the released bytes (legacy behaviour)
    Overwrite,
}

/// File redirection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Maximum number of simultaneously open redirected descriptors
    pub capacity: usize,
    pub reads: ReadPolicy,
    pub rules: Vec<RuleConfig>,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_REDIRECT_CAPACITY,
            reads: ReadPolicy::Stream,
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPolicy {
    /// Reads consume the payload from a per-descriptor cursor
    #[default]
    Stream,
    /// Every read returns the whole payload from the start (legacy behaviour)
    Repeat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    #[default]
    Exact,
    Prefix,
    Suffix,
}

/// One redirect rule: which paths to match and what to serve for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub path: String,
    #[serde(rename = "match", default)]
    pub matching: MatchKind,
    /// Literal payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Synthetic payload length, filled with `fill`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<char>,
}

impl RuleConfig {
    pub fn exact(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            matching: MatchKind::Exact,
            content: Some(content.into()),
            size: None,
            fill: None,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.path.is_empty() {
            return Err("path must not be empty".to_string());
        }
        match (&self.content, self.size) {
            (Some(_), Some(_)) => return Err("set either content or size, not both".to_string()),
            (None, None) => return Err("one of content or size is required".to_string()),
            (Some(_), None) if self.fill.is_some() => {
                return Err("fill only applies together with size".to_string())
            }
            _ => {}
        }
        if let Some(fill) = self.fill {
            if !fill.is_ascii() {
                return Err(format!("fill must be a single ASCII character, got {fill:?}"));
            }
        }
        Ok(())
    }
}

/// Diagnostics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Mirror layer diagnostics to stderr
    pub debug: bool,
    /// Install a tracing subscriber when the layer loads
    pub tracing: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            debug: false,
            tracing: false,
        }
    }
}
