/// Configuration management for Ponder.
/// Handles loading, validation and environment overrides of .ponder/config.toml
use crate::bus::MessageBusConfig;
use crate::errors::{ConfigError, ConfigResult};
use crate::reasoning::MctsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Directory holding the config file, relative to the project or home dir.
pub const CONFIG_DIR: &str = ".ponder";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration structure for Ponder
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PonderConfig {
    /// Tree search settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Message bus settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Trace harvesting settings
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tree search settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Iterations per query (0 returns an empty path)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// UCB1 exploration coefficient
    #[serde(default = "default_exploration_weight")]
    pub exploration_weight: f64,

    /// Empty expansions before a leaf is treated as a dead end. 1 never
    /// re-expands an empty leaf, 2 retries it once, 0 never gives up.
    #[serde(default = "default_empty_expansion_limit")]
    pub empty_expansion_limit: u32,

    /// Score sibling candidates concurrently
    #[serde(default = "default_true")]
    pub parallel_scoring: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            exploration_weight: default_exploration_weight(),
            empty_expansion_limit: default_empty_expansion_limit(),
            parallel_scoring: true,
        }
    }
}

fn default_max_iterations() -> usize {
    10
}

fn default_exploration_weight() -> f64 {
    std::f64::consts::SQRT_2
}

fn default_empty_expansion_limit() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl From<&EngineConfig> for MctsConfig {
    fn from(config: &EngineConfig) -> Self {
        MctsConfig {
            max_iterations: config.max_iterations,
            exploration_weight: config.exploration_weight,
            empty_expansion_limit: config.empty_expansion_limit,
            parallel_scoring: config.parallel_scoring,
        }
    }
}

/// Message bus settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusConfig {
    /// Default timeout for request/response calls
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Keep a history of published messages
    #[serde(default = "default_true")]
    pub enable_history: bool,

    /// Maximum messages kept in history
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            enable_history: true,
            max_history_size: default_max_history_size(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_max_history_size() -> usize {
    1000
}

impl From<&BusConfig> for MessageBusConfig {
    fn from(config: &BusConfig) -> Self {
        MessageBusConfig {
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            enable_history: config.enable_history,
            max_history_size: config.max_history_size,
        }
    }
}

/// Trace harvesting settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarvestConfig {
    /// Responses collected before a generation completes
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    5
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["text", "pretty", "compact"];

/// Configuration loader and manager
pub struct ConfigManager {
    config: PonderConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load configuration from file or use defaults.
    ///
    /// Without an explicit path, `.ponder/config.toml` in the current
    /// directory wins over `~/.ponder/config.toml`. Environment overrides are
    /// applied and the result is validated.
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => Self::discover(),
        };

        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            warn!("Config file not found at {:?}, using defaults", path);
            PonderConfig::default()
        };

        let mut manager = ConfigManager {
            config,
            config_path: path,
        };
        manager.load_from_env()?;
        manager.validate()?;

        debug!("Configuration loaded successfully");
        Ok(manager)
    }

    fn discover() -> PathBuf {
        let local = Path::new(CONFIG_DIR).join(CONFIG_FILE);
        if local.exists() {
            return local;
        }
        match dirs::home_dir() {
            Some(home) if home.join(CONFIG_DIR).join(CONFIG_FILE).exists() => {
                home.join(CONFIG_DIR).join(CONFIG_FILE)
            }
            _ => local,
        }
    }

    /// Wrap an in-memory configuration.
    pub fn from_config(config: PonderConfig, config_path: impl Into<PathBuf>) -> Self {
        ConfigManager {
            config,
            config_path: config_path.into(),
        }
    }

    /// Write a default config file under `dir/.ponder/`.
    ///
    /// Fails if the file exists, unless `force` is set.
    pub fn init(dir: &Path, force: bool) -> ConfigResult<PathBuf> {
        let path = dir.join(CONFIG_DIR).join(CONFIG_FILE);
        if path.exists() && !force {
            return Err(ConfigError::Invalid(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        Self::from_config(PonderConfig::default(), &path).save()?;
        Ok(path)
    }

    /// Get configuration reference
    pub fn config(&self) -> &PonderConfig {
        &self.config
    }

    /// Get mutable configuration reference
    pub fn config_mut(&mut self) -> &mut PonderConfig {
        &mut self.config
    }

    /// Save configuration to file
    pub fn save(&self) -> ConfigResult<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&self.config_path, self.to_toml()?)?;

        info!("Configuration saved to {:?}", self.config_path);
        Ok(())
    }

    /// Configuration rendered as TOML
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(&self.config)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let engine = &self.config.engine;
        if !engine.exploration_weight.is_finite() || engine.exploration_weight <= 0.0 {
            return Err(ConfigError::Invalid(
                "Exploration weight must be a positive number".to_string(),
            ));
        }

        if self.config.bus.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.config.bus.enable_history && self.config.bus.max_history_size == 0 {
            return Err(ConfigError::Invalid(
                "History size must be greater than 0 when history is enabled".to_string(),
            ));
        }

        if self.config.harvest.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "Harvest batch size must be greater than 0".to_string(),
            ));
        }

        check_log_filter(&self.config.logging.level)?;

        if !LOG_FORMATS.contains(&self.config.logging.format.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Unknown log format '{}'",
                self.config.logging.format
            )));
        }

        if engine.max_iterations == 0 {
            warn!("max_iterations is 0, every search will return an empty path");
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Apply `PONDER_*` environment variable overrides
    pub fn load_from_env(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PONDER_MAX_ITERATIONS") {
            self.config.engine.max_iterations = parse_var("PONDER_MAX_ITERATIONS", &value)?;
        }

        if let Some(value) = lookup("PONDER_EXPLORATION_WEIGHT") {
            self.config.engine.exploration_weight =
                parse_var("PONDER_EXPLORATION_WEIGHT", &value)?;
        }

        if let Some(value) = lookup("PONDER_REQUEST_TIMEOUT_MS") {
            self.config.bus.request_timeout_ms = parse_var("PONDER_REQUEST_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = lookup("PONDER_LOG_LEVEL") {
            self.config.logging.level = value;
        }

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Accept a bare level or a full filter such as "warn,hyper" or
/// "info,ponder_core=debug".
///
/// Every `target=level` directive must name a known level, and at least one
/// directive must set a level, so a lone misspelt level is not mistaken for
/// a target name.
fn check_log_filter(filter: &str) -> ConfigResult<()> {
    let unknown = || ConfigError::Invalid(format!("Unknown log level '{}'", filter));
    let is_level = |s: &str| s == "off" || LOG_LEVELS.contains(&s);

    let mut sets_level = false;
    for directive in filter.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let directive = directive.to_lowercase();
        match directive.rsplit_once('=') {
            Some((_, level)) if is_level(level) => sets_level = true,
            Some(_) => return Err(unknown()),
            None if is_level(&directive) => sets_level = true,
            None => {}
        }
    }
    if !sets_level {
        return Err(unknown());
    }

    EnvFilter::try_new(filter)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid(format!("Invalid log filter '{}': {}", filter, e)))
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has an invalid value '{}'", key, value)))
}
