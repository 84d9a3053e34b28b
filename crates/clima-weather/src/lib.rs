//! Weather service for Clima
//!
//! Fetches current conditions and forecasts from an OpenWeather-compatible
//! API. Current-weather lookups are protected by a circuit breaker wrapping a
//! retry loop; HTTP responses are classified before they reach either layer.

pub mod classify;
pub mod provider;
pub mod types;

pub use classify::{classify_response, classify_send_error, classify_status, StatusClass};
pub use provider::{StatusCallback, StatusUpdate, WeatherProvider, WeatherSettings};
pub use types::*;
