use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clima_resilience::BreakerError;

/// Weather condition as reported by the API (`weather[]` entries)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

/// Temperature and humidity readings (`main` object)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: u8,
    #[serde(default)]
    pub pressure: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    #[serde(default)]
    pub deg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SysInfo {
    #[serde(default)]
    pub country: Option<String>,
}

/// Current weather for one place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub name: String,
    #[serde(default)]
    pub sys: SysInfo,
    #[serde(default)]
    pub weather: Vec<Condition>,
    pub main: MainReadings,
    pub wind: Wind,
    #[serde(default)]
    pub dt: Option<i64>,
}

impl CurrentWeather {
    /// Description of the primary condition, if any
    pub fn description(&self) -> Option<&str> {
        self.weather.first().map(|c| c.description.as_str())
    }

    /// "City, CC" when the country is known
    pub fn location_label(&self) -> String {
        match self.sys.country.as_deref() {
            Some(country) if !country.is_empty() => format!("{}, {}", self.name, country),
            _ => self.name.clone(),
        }
    }

    /// One-line summary, e.g. "Hermosillo, MX: Cielo Claro, 31°"
    pub fn summary(&self) -> String {
        let description = self.description().map(capitalize_words).unwrap_or_default();
        format!(
            "{}: {}, {}°",
            self.location_label(),
            description,
            self.main.temp.round()
        )
    }
}

/// One 3-hour slot of the forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub dt: i64,
    pub main: MainReadings,
    #[serde(default)]
    pub weather: Vec<Condition>,
    #[serde(default)]
    pub dt_txt: Option<String>,
}

impl ForecastEntry {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.dt, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ForecastCity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
}

/// Forecast bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub list: Vec<ForecastEntry>,
    #[serde(default)]
    pub city: ForecastCity,
}

/// Capitalize the first letter of every space-separated word
pub fn capitalize_words(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Weather provider errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Circuit is open, service is unavailable")]
    CircuitOpen,

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Missing required setting: {0}")]
    NotConfigured(&'static str),
}

impl WeatherError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::Network(_) => "Unable to reach the weather service. Check your connection.",
            WeatherError::Status { status } if *status >= 500 => {
                "The weather service is experiencing issues. Please try again later."
            }
            WeatherError::Status { .. } => "The weather request failed. Please try again.",
            WeatherError::Parse(_) => "Received unexpected weather data. Please try again.",
            WeatherError::CircuitOpen => {
                "Weather service temporarily unavailable. Please wait a moment."
            }
            WeatherError::InvalidUrl(_) => "Weather API URL is invalid. Check settings.",
            WeatherError::NotConfigured(_) => "Weather service is not configured. Check settings.",
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, WeatherError::CircuitOpen)
    }
}

impl From<BreakerError<WeatherError>> for WeatherError {
    fn from(err: BreakerError<WeatherError>) -> Self {
        match err {
            BreakerError::Open(_) => WeatherError::CircuitOpen,
            BreakerError::Request(e) => e,
        }
    }
}
