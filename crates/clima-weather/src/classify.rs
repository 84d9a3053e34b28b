//! HTTP outcome classification for retry decisions.
//!
//! - 2xx: success, hand the response back
//! - 4xx: terminal, no data (`Ok(None)`); retrying a bad city name never helps
//! - anything else (5xx, unexpected 1xx/3xx): retryable
//! - transport failures (timeouts, connection resets): retryable
//! - request construction failures: fatal

use clima_resilience::AttemptError;
use reqwest::{Response, StatusCode};

use crate::types::WeatherError;

/// Classification of a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// Treat as "no data" without retrying
    Terminal,
    Retryable,
}

/// Classify a status code
pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        return StatusClass::Success;
    }

    if status.is_client_error() {
        if status == StatusCode::NOT_FOUND {
            tracing::info!("Location not found (404)");
        } else {
            tracing::debug!("Client error ({}), not retryable", status);
        }
        return StatusClass::Terminal;
    }

    tracing::debug!("Unexpected status ({}), will retry", status);
    StatusClass::Retryable
}

/// Turn a response into the outcome of one attempt.
///
/// # Errors
/// [`AttemptError::Retryable`] carrying [`WeatherError::Status`] for
/// server-side failures.
pub fn classify_response(
    response: Response,
) -> Result<Option<Response>, AttemptError<WeatherError>> {
    let status = response.status();
    match classify_status(status) {
        StatusClass::Success => Ok(Some(response)),
        StatusClass::Terminal => Ok(None),
        StatusClass::Retryable => Err(AttemptError::Retryable(WeatherError::Status {
            status: status.as_u16(),
        })),
    }
}

/// Classify an error raised while sending the request
pub fn classify_send_error(error: reqwest::Error) -> AttemptError<WeatherError> {
    if error.is_builder() {
        tracing::debug!("Request could not be built, not retryable: {}", error);
        return AttemptError::Fatal(WeatherError::Network(error));
    }

    if error.is_timeout() {
        tracing::debug!("Request timed out, will retry");
    } else if error.is_connect() {
        tracing::debug!("Connection error, will retry");
    } else {
        tracing::debug!("Network error, will retry: {}", error);
    }
    AttemptError::Retryable(WeatherError::Network(error))
}
