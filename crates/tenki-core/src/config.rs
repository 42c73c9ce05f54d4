use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "TENKI";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Forecast source and history settings
    #[serde(default)]
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Region hierarchy document (centers -> offices)
    pub area_url: String,

    /// Base URL for per-region forecasts; `{base}/{code}.json` is requested
    pub forecast_base_url: String,

    /// Forecast request timeout in seconds
    pub request_timeout_secs: u64,

    /// Number of forecast days surfaced for display
    pub display_days: usize,

    /// Maximum number of fetch days listed in the history selector
    pub history_limit: usize,

    /// Offices known to have no forecast endpoint
    pub excluded_area_codes: Vec<String>,

    /// SQLite database file; relative paths resolve against `config_dir`
    pub database_file: PathBuf,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            area_url: "http://www.jma.go.jp/bosai/common/const/area.json".to_string(),
            forecast_base_url: "https://www.jma.go.jp/bosai/forecast/data/forecast".to_string(),
            request_timeout_secs: 10,
            display_days: 7,
            history_limit: 30,
            // 十勝地方 and 奄美地方 answer 404
            excluded_area_codes: vec!["014030".to_string(), "460040".to_string()],
            database_file: PathBuf::from("weather.db"),
        }
    }
}

impl WeatherConfig {
    /// Forecast URL for a region code.
    pub fn forecast_url(&self, region_code: &str) -> String {
        format!(
            "{}/{}.json",
            self.forecast_base_url.trim_end_matches('/'),
            region_code
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_config_dir(default_config_dir())
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tenki")
}

impl Config {
    /// Default configuration rooted at the given directory.
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            weather: WeatherConfig::default(),
        }
    }

    /// Load configuration from the platform config directory.
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_dir())
    }

    /// Load configuration from `config_dir/config.toml`, creating a default
    /// file if it doesn't exist, then apply `TENKI_*` environment overrides
    /// (e.g. `TENKI_WEATHER__REQUEST_TIMEOUT_SECS=5`).
    pub fn load_from(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            Self::with_config_dir(config_dir).save()?;
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(config_path.as_path()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read config file")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings, which are
    /// also logged. Validation errors fail the load.
    pub fn load_validated() -> Result<(Self, ValidationResult), ConfigError> {
        Self::load()
            .map_err(|e| ConfigError::ParseError(format!("{e:#}")))?
            .validated()
    }

    /// Check a loaded config, turning validation errors into `ConfigError::Invalid`.
    pub fn validated(self) -> Result<(Self, ValidationResult), ConfigError> {
        let validation = self.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((self, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let weather = &self.weather;

        validate_url(&weather.area_url, "weather.area_url", &mut result);
        validate_url(
            &weather.forecast_base_url,
            "weather.forecast_base_url",
            &mut result,
        );

        if weather.request_timeout_secs == 0 {
            result.add_error(
                "weather.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        } else if weather.request_timeout_secs > 120 {
            result.add_warning(
                "weather.request_timeout_secs",
                "Request timeout is unusually long (>120s)",
            );
        }

        if weather.display_days == 0 {
            result.add_error("weather.display_days", "At least one day must be displayed");
        }

        if weather.history_limit == 0 {
            result.add_error(
                "weather.history_limit",
                "History limit must be greater than 0",
            );
        }

        if weather.database_file.as_os_str().is_empty() {
            result.add_error("weather.database_file", "Database file must be set");
        }

        result
    }

    /// Resolved path of the forecast database.
    pub fn database_path(&self) -> PathBuf {
        if self.weather.database_file.is_absolute() {
            self.weather.database_file.clone()
        } else {
            self.config_dir.join(&self.weather.database_file)
        }
    }

    /// Save configuration to `config_dir/config.toml`
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(self.config_dir.join(CONFIG_FILE), contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

/// Validate a URL field
fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }

            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}
