use std::sync::Arc;

use anyhow::Result;
use clima_core::{AppError, Config, ConfigError};
use clima_resilience::{BreakerConfig, CircuitBreaker, RetryPolicy};
use clima_weather::{StatusCallback, StatusUpdate, WeatherProvider, WeatherSettings};

/// Forecast slots to print (3-hour steps)
const FORECAST_SLOTS: usize = 8;

#[tokio::main]
async fn main() -> Result<()> {
    clima_core::init()?;

    if let Err(e) = run(std::env::args().skip(1).collect()).await {
        eprintln!("{}", e.user_message());
        return Err(e.into());
    }

    Ok(())
}

async fn run(args: Vec<String>) -> Result<(), AppError> {
    let (config, _) = Config::load_validated().map_err(|e| match e.downcast::<ConfigError>() {
        Ok(config_err) => AppError::Config(config_err),
        Err(other) => AppError::Other(other),
    })?;

    // One breaker per downstream dependency, shared by every lookup against it
    let breaker = Arc::new(CircuitBreaker::new("weather-api", breaker_config(&config)));
    let provider = WeatherProvider::new(weather_settings(&config), breaker)
        .map_err(|e| AppError::Service(e.to_string()))?;

    let on_status: StatusCallback = Arc::new(log_status);

    let (label, current) = match parse_coords(&args) {
        Some((lat, lon)) => (
            format!("{}, {}", lat, lon),
            provider.current_by_coords(lat, lon, Some(on_status)).await,
        ),
        None => {
            let city = if args.is_empty() {
                config.weather.default_city.clone()
            } else {
                args.join(" ")
            };
            let current = provider.current_by_city(&city, Some(on_status)).await;
            (city, current)
        }
    };

    let current = match current {
        Ok(current) => current,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Err(AppError::Service(e.to_string()));
        }
    };

    let Some(current) = current else {
        println!("No weather found for {}", label);
        return Ok(());
    };
    println!("{}", current.summary());
    println!(
        "  feels like {}°, min {}°, max {}°, humidity {}%, wind {} m/s",
        current.main.feels_like.round(),
        current.main.temp_min.round(),
        current.main.temp_max.round(),
        current.main.humidity,
        current.wind.speed.round()
    );

    match provider.forecast_by_city(&current.name).await {
        Ok(Some(forecast)) => {
            for entry in forecast.list.iter().take(FORECAST_SLOTS) {
                let when = entry
                    .timestamp()
                    .map(|ts| ts.format("%a %H:%M").to_string())
                    .unwrap_or_else(|| entry.dt.to_string());
                let description = entry
                    .weather
                    .first()
                    .map(|c| c.description.as_str())
                    .unwrap_or_default();
                println!("  {}  {}°  {}", when, entry.main.temp.round(), description);
            }
        }
        Ok(None) => tracing::info!("No forecast available for {}", current.name),
        Err(e) => tracing::warn!("Forecast unavailable: {}", e),
    }

    Ok(())
}

fn breaker_config(config: &Config) -> BreakerConfig {
    BreakerConfig {
        failure_threshold: config.resilience.failure_threshold,
        cooldown: config.resilience.cooldown(),
    }
}

fn weather_settings(config: &Config) -> WeatherSettings {
    let mut settings = WeatherSettings::new(&config.weather.api_url, &config.weather.api_key);
    settings.units = config.weather.units.clone();
    settings.lang = config.weather.lang.clone();
    settings.retry = RetryPolicy {
        max_retries: config.resilience.max_retries,
        base_delay: config.resilience.base_delay(),
        max_delay: config.resilience.max_delay(),
    };
    settings
}

fn log_status(update: &StatusUpdate) {
    match update {
        StatusUpdate::Retry(notice) => tracing::info!(
            "Retrying ({}/{}) in {:?}",
            notice.attempt,
            notice.max_retries,
            notice.wait
        ),
        StatusUpdate::Success => tracing::debug!("Weather data received"),
        StatusUpdate::CircuitOpen => tracing::warn!("Weather service temporarily unavailable"),
        StatusUpdate::Error(message) => tracing::warn!("Weather lookup failed: {}", message),
    }
}

/// Two numeric arguments are read as latitude and longitude
fn parse_coords(args: &[String]) -> Option<(f64, f64)> {
    match args {
        [lat, lon] => {
            let lat: f64 = lat.parse().ok()?;
            let lon: f64 = lon.parse().ok()?;
            let in_range = (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon);
            in_range.then_some((lat, lon))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_coords() {
        assert_eq!(parse_coords(&args(&["29.07", "-110.95"])), Some((29.07, -110.95)));
        assert_eq!(parse_coords(&args(&["Ciudad", "Obregón"])), None);
        assert_eq!(parse_coords(&args(&["91", "0"])), None);
        assert_eq!(parse_coords(&args(&["29.07"])), None);
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = Config::default();
        config.weather.api_key = "k".to_string();
        config.weather.lang = "en".to_string();
        config.resilience.max_retries = 5;
        config.resilience.max_delay_ms = Some(3000);

        let settings = weather_settings(&config);
        assert_eq!(settings.lang, "en");
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.retry.max_delay, Some(Duration::from_secs(3)));

        let breaker = breaker_config(&config);
        assert_eq!(breaker, BreakerConfig::default());
    }
}
