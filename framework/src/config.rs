use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How long a started run may take to produce its result.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_millis(20_000);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Bound on the wait for a result once the run has started.
    pub timeout: Duration,
    /// Bound on the wait for the start acknowledgement. Unbounded when `None`.
    pub start_timeout: Option<Duration>,
    /// Log state transitions and per-test events at debug level.
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RUN_TIMEOUT,
            start_timeout: None,
            verbose: false,
        }
    }
}

/// On-disk form of [`RunConfig`]. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunConfigFile {
    timeout_ms: Option<u64>,
    start_timeout_ms: Option<u64>,
    verbose: Option<bool>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_start_timeout(mut self, start_timeout: Duration) -> Self {
        self.start_timeout = Some(start_timeout);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let file: RunConfigFile = toml::from_str(contents)?;
        let defaults = Self::default();
        let config = Self {
            timeout: file
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            start_timeout: file.start_timeout_ms.map(Duration::from_millis),
            verbose: file.verbose.unwrap_or(defaults.verbose),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// A zero result timeout is allowed: it only accepts a result that is
    /// already waiting. A zero start timeout is not, since the acknowledgement
    /// is sent after the run request returns.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.start_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Invalid {
                message: "Start timeout must be greater than 0 when set".to_string(),
            });
        }

        Ok(())
    }
}
