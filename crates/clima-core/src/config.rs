use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Environment variable overriding `weather.api_url`
pub const API_URL_ENV: &str = "CLIMA_API_URL";
/// Environment variable overriding `weather.api_key`
pub const API_KEY_ENV: &str = "CLIMA_API_KEY";

const SUPPORTED_UNITS: [&str; 3] = ["metric", "imperial", "standard"];

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
    pub config_dir: PathBuf,

    /// Weather API settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Retry and circuit breaker tuning
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Current-weather endpoint; the forecast endpoint is derived from it
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key (can also be set via CLIMA_API_KEY)
    #[serde(default)]
    pub api_key: String,

    /// metric, imperial or standard
    #[serde(default = "default_units")]
    pub units: String,

    /// Language for condition descriptions
    #[serde(default = "default_lang")]
    pub lang: String,

    /// City used when none is given
    #[serde(default = "default_city")]
    pub default_city: String,
}

fn default_api_url() -> String {
    "https://api.openweathermap.org/data/2.5/weather".to_string()
}

fn default_units() -> String {
    "metric".to_string()
}

fn default_lang() -> String {
    "es".to_string()
}

fn default_city() -> String {
    "Hermosillo".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            units: default_units(),
            lang: default_lang(),
            default_city: default_city(),
        }
    }
}

impl WeatherConfig {
    /// Check if an API key is present
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, doubled on each subsequent one
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Optional ceiling for a single backoff delay (unbounded when unset)
    #[serde(default)]
    pub max_delay_ms: Option<u64>,

    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open before admitting trial calls
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_ms() -> u64 {
    5000
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: None,
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl ResilienceConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay_ms.map(Duration::from_millis)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clima");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist.
    ///
    /// Environment overrides are not applied.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let mut config = Self::default();
            if let Some(parent) = path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(path)?;
            tracing::info!("Created default config at {}", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Override settings from a key lookup (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Using weather API URL from {}", API_URL_ENV);
            self.weather.api_url = url;
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Using weather API key from {}", API_KEY_ENV);
            self.weather.api_key = key;
        }
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.weather.api_url, "weather.api_url", &mut result);

        if !self.weather.is_configured() {
            result.add_error(
                "weather.api_key",
                format!("API key is required (set it here or via {})", API_KEY_ENV),
            );
        }

        if !SUPPORTED_UNITS.contains(&self.weather.units.as_str()) {
            result.add_error(
                "weather.units",
                format!(
                    "Unsupported units '{}', expected one of {}",
                    self.weather.units,
                    SUPPORTED_UNITS.join(", ")
                ),
            );
        }

        if self.weather.default_city.trim().is_empty() {
            result.add_warning("weather.default_city", "No default city configured");
        }

        let resilience = &self.resilience;
        if resilience.base_delay_ms == 0 {
            result.add_error("resilience.base_delay_ms", "Base delay must be greater than 0");
        }

        if resilience.max_retries > 10 {
            result.add_warning(
                "resilience.max_retries",
                "More than 10 retries; uncapped backoff will grow very large",
            );
        }

        if let Some(max_delay_ms) = resilience.max_delay_ms {
            if max_delay_ms < resilience.base_delay_ms {
                result.add_warning(
                    "resilience.max_delay_ms",
                    "Max delay is below the base delay; every retry will use the max delay",
                );
            }
        }

        if resilience.failure_threshold == 0 {
            result.add_error(
                "resilience.failure_threshold",
                "Failure threshold must be greater than 0",
            );
        }

        if resilience.cooldown_ms == 0 {
            result.add_error("resilience.cooldown_ms", "Cooldown must be greater than 0");
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
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

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("clima");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        let mut config = Config::default();
        config.weather.api_key = "abc123".to_string();
        config
    }

    #[test]
    fn test_configured_default_is_valid() {
        let result = configured().validate();
        assert!(result.is_valid(), "Config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_missing_api_key_is_error() {
        let result = Config::default().validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.api_key"));
    }

    #[test]
    fn test_invalid_url() {
        let mut config = configured();
        config.weather.api_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.api_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = configured();
        config.weather.api_url = "ftp://api.example.com/weather".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_unsupported_units() {
        let mut config = configured();
        config.weather.units = "kelvin".to_string();
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "weather.units"));
    }

    #[test]
    fn test_zero_resilience_values_are_errors() {
        let mut config = configured();
        config.resilience.base_delay_ms = 0;
        config.resilience.failure_threshold = 0;
        config.resilience.cooldown_ms = 0;
        let result = config.validate();
        assert_eq!(result.errors.len(), 3, "{:?}", result.errors);
    }

    #[test]
    fn test_many_retries_is_warning() {
        let mut config = configured();
        config.resilience.max_retries = 12;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "resilience.max_retries"));
    }

    #[test]
    fn test_resilience_durations() {
        let mut resilience = ResilienceConfig::default();
        assert_eq!(resilience.base_delay(), Duration::from_millis(1000));
        assert_eq!(resilience.cooldown(), Duration::from_millis(5000));
        assert_eq!(resilience.max_delay(), None);
        resilience.max_delay_ms = Some(8000);
        assert_eq!(resilience.max_delay(), Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_overrides_replace_url_and_key() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            API_URL_ENV => Some("http://localhost:8080/weather".to_string()),
            API_KEY_ENV => Some("from-env".to_string()),
            _ => None,
        });
        assert_eq!(config.weather.api_url, "http://localhost:8080/weather");
        assert_eq!(config.weather.api_key, "from-env");
    }

    #[test]
    fn test_blank_overrides_are_ignored() {
        let mut config = configured();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.weather.api_key, "abc123");
        assert_eq!(config.weather.api_url, default_api_url());
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clima").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.weather.default_city, "Hermosillo");
        assert_eq!(config.config_dir, dir.path().join("clima"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = configured();
        config.resilience.max_retries = 5;
        config.resilience.max_delay_ms = Some(10_000);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.weather.api_key, "abc123");
        assert_eq!(loaded.resilience.max_retries, 5);
        assert_eq!(loaded.resilience.max_delay_ms, Some(10_000));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "config_dir = \"/tmp/clima\"\n\n[weather]\napi_key = \"k\"\n",
        )
        .unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.weather.api_key, "k");
        assert_eq!(loaded.weather.units, "metric");
        assert_eq!(loaded.resilience.cooldown_ms, 5000);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[weather\napi_key = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
