//! OpenWeather-compatible client.
//!
//! Current-weather lookups go through the shared circuit breaker, which wraps
//! a full retry loop. Forecast lookups only retry.

use std::sync::Arc;
use std::time::Duration;

use clima_resilience::{AttemptError, CircuitBreaker, RetryExecutor, RetryNotice, RetryPolicy};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::classify::{classify_response, classify_send_error};
use crate::types::{CurrentWeather, Forecast, WeatherError};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "Clima/0.1.0";

pub const DEFAULT_UNITS: &str = "metric";
pub const DEFAULT_LANG: &str = "es";

/// Connection settings for the weather API
#[derive(Debug, Clone)]
pub struct WeatherSettings {
    /// Current-weather endpoint, e.g. `https://api.openweathermap.org/data/2.5/weather`
    pub api_url: String,
    pub api_key: String,
    pub units: String,
    pub lang: String,
    pub retry: RetryPolicy,
}

impl WeatherSettings {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            units: DEFAULT_UNITS.to_string(),
            lang: DEFAULT_LANG.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Forecast endpoint: the first `/weather` segment becomes `/forecast`
    pub fn forecast_url(&self) -> String {
        self.api_url.replacen("/weather", "/forecast", 1)
    }
}

/// Progress of a protected lookup, reported to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// A retry is about to happen after `wait`
    Retry(RetryNotice),
    Success,
    /// The breaker rejected the call without touching the network
    CircuitOpen,
    Error(String),
}

pub type StatusCallback = Arc<dyn Fn(&StatusUpdate) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Arc<Client>,
    settings: WeatherSettings,
    current_url: Url,
    forecast_url: Url,
    breaker: Arc<CircuitBreaker>,
}

impl WeatherProvider {
    /// Create a provider guarded by `breaker`.
    ///
    /// # Errors
    /// Fails when the API key is blank, a URL does not parse, or the HTTP
    /// client cannot be built.
    pub fn new(settings: WeatherSettings, breaker: Arc<CircuitBreaker>) -> Result<Self, WeatherError> {
        if settings.api_key.trim().is_empty() {
            return Err(WeatherError::NotConfigured("api_key"));
        }

        let current_url = Url::parse(&settings.api_url)
            .map_err(|e| WeatherError::InvalidUrl(format!("{}: {}", settings.api_url, e)))?;
        let forecast_url = Url::parse(&settings.forecast_url())
            .map_err(|e| WeatherError::InvalidUrl(format!("{}: {}", settings.forecast_url(), e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            settings,
            current_url,
            forecast_url,
            breaker,
        })
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn settings(&self) -> &WeatherSettings {
        &self.settings
    }

    /// Current weather for a city name.
    ///
    /// Returns `Ok(None)` for a blank name or when the API answers with a
    /// client error (unknown city, bad key).
    ///
    /// # Errors
    /// [`WeatherError::CircuitOpen`] while the breaker is open; otherwise the
    /// error of the last attempt or a decoding failure.
    pub async fn current_by_city(
        &self,
        city: &str,
        on_status: Option<StatusCallback>,
    ) -> Result<Option<CurrentWeather>, WeatherError> {
        let city = city.trim();
        if city.is_empty() {
            tracing::debug!("Empty city name, skipping lookup");
            return Ok(None);
        }

        tracing::info!("Fetching current weather for {}", city);
        let url = self.query_url(&self.current_url, &[("q", city.to_string())]);
        self.fetch_protected(url, on_status).await
    }

    /// Current weather for coordinates.
    ///
    /// # Errors
    /// Same as [`WeatherProvider::current_by_city`].
    pub async fn current_by_coords(
        &self,
        latitude: f64,
        longitude: f64,
        on_status: Option<StatusCallback>,
    ) -> Result<Option<CurrentWeather>, WeatherError> {
        tracing::info!("Fetching current weather for {}, {}", latitude, longitude);
        let url = self.query_url(
            &self.current_url,
            &[("lat", latitude.to_string()), ("lon", longitude.to_string())],
        );
        self.fetch_protected(url, on_status).await
    }

    /// Forecast for a city name. Retried, but not guarded by the breaker.
    ///
    /// # Errors
    /// The error of the last attempt or a decoding failure.
    pub async fn forecast_by_city(&self, city: &str) -> Result<Option<Forecast>, WeatherError> {
        let city = city.trim();
        if city.is_empty() {
            return Ok(None);
        }

        tracing::info!("Fetching forecast for {}", city);
        let url = self.query_url(&self.forecast_url, &[("q", city.to_string())]);
        let retry = RetryExecutor::new(self.settings.retry.clone());

        match retry.execute_classified(|| self.attempt(&url)).await? {
            Some(response) => decode(response).await.map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_protected<T: DeserializeOwned>(
        &self,
        url: Url,
        on_status: Option<StatusCallback>,
    ) -> Result<Option<T>, WeatherError> {
        let retry = self.retry_executor(on_status.clone());

        let result = match self
            .breaker
            .execute(|| retry.execute_classified(|| self.attempt(&url)))
            .await
        {
            Ok(Some(response)) => decode(response).await.map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(WeatherError::from(e)),
        };

        if let Some(notify) = on_status {
            match &result {
                Ok(Some(_)) => notify(&StatusUpdate::Success),
                Ok(None) => {}
                Err(WeatherError::CircuitOpen) => notify(&StatusUpdate::CircuitOpen),
                Err(e) => notify(&StatusUpdate::Error(e.to_string())),
            }
        }

        if let Err(e) = &result {
            tracing::warn!("Weather lookup failed: {}", e);
        }
        result
    }

    async fn attempt(&self, url: &Url) -> Result<Option<Response>, AttemptError<WeatherError>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_send_error)?;
        classify_response(response)
    }

    fn retry_executor(&self, on_status: Option<StatusCallback>) -> RetryExecutor {
        let executor = RetryExecutor::new(self.settings.retry.clone());
        match on_status {
            Some(notify) => executor.on_retry(move |notice| notify(&StatusUpdate::Retry(*notice))),
            None => executor,
        }
    }

    fn query_url(&self, base: &Url, params: &[(&str, String)]) -> Url {
        let mut url = base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            pairs
                .append_pair("appid", &self.settings.api_key)
                .append_pair("units", &self.settings.units)
                .append_pair("lang", &self.settings.lang);
        }
        url
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, WeatherError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| WeatherError::Parse(e.to_string()))
}
