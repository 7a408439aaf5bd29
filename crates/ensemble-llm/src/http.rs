//! Transport helpers shared by the HTTP adapters.

use std::time::Duration;

use ensemble_types::EnsembleError;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a transport-level reqwest failure. Deadline expiry becomes `Timeout`.
pub(crate) fn map_transport_error(
    provider: &str,
    timeout: Duration,
    err: reqwest::Error,
) -> EnsembleError {
    if err.is_timeout() {
        EnsembleError::Timeout {
            provider: provider.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        EnsembleError::ProviderError {
            provider: provider.into(),
            status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            message: err.to_string(),
            retryable: true,
        }
    }
}

pub(crate) fn map_status_error(
    provider: &str,
    status: reqwest::StatusCode,
    body: &str,
    retry_after_ms: u64,
) -> EnsembleError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => EnsembleError::RateLimited {
            provider: provider.into(),
            retry_after_ms,
        },
        401 | 403 => EnsembleError::AuthError {
            provider: provider.into(),
        },
        500..=599 => EnsembleError::ProviderError {
            provider: provider.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => EnsembleError::ProviderError {
            provider: provider.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

pub(crate) fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

/// `Retry-After` header in milliseconds, defaulting to one second.
pub(crate) fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
        .unwrap_or(1000)
}

/// Send a request and return the parsed JSON body of a successful response.
pub(crate) async fn send_json(
    provider: &str,
    timeout: Duration,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, EnsembleError> {
    let resp = request
        .send()
        .await
        .map_err(|e| map_transport_error(provider, timeout, e))?;

    let status = resp.status();
    let retry_after = retry_after_ms(resp.headers());
    let body = resp
        .text()
        .await
        .map_err(|e| map_transport_error(provider, timeout, e))?;

    if !status.is_success() {
        return Err(map_status_error(provider, status, &body, retry_after));
    }

    serde_json::from_str(&body).map_err(|e| EnsembleError::MalformedResponse {
        provider: provider.into(),
        message: format!("Failed to parse response JSON: {e}"),
    })
}

/// Convert a JSON array of numbers into an embedding vector.
pub(crate) fn parse_embedding(
    provider: &str,
    values: &serde_json::Value,
) -> Result<Vec<f32>, EnsembleError> {
    let malformed = |message: &str| EnsembleError::MalformedResponse {
        provider: provider.into(),
        message: message.into(),
    };
    let array = values
        .as_array()
        .ok_or_else(|| malformed("Missing embedding values"))?;
    if array.is_empty() {
        return Err(malformed("Empty embedding vector"));
    }
    array
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| malformed("Non-numeric embedding value"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_429_maps_to_rate_limited() {
        let err = map_status_error("gemini", reqwest::StatusCode::TOO_MANY_REQUESTS, "", 2000);
        assert!(matches!(
            err,
            EnsembleError::RateLimited { retry_after_ms: 2000, .. }
        ));
    }

    #[test]
    fn status_401_maps_to_auth() {
        let err = map_status_error(
            "gemini",
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error": {"message": "invalid key"}}"#,
            1000,
        );
        assert!(matches!(err, EnsembleError::AuthError { .. }));
    }

    #[test]
    fn status_503_is_retryable() {
        let err = map_status_error(
            "openai",
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
            r#"{"error": {"message": "overloaded"}}"#,
            1000,
        );
        match err {
            EnsembleError::ProviderError {
                status,
                message,
                retryable,
                ..
            } => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
                assert!(retryable);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn huge_retry_after_saturates() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::RETRY_AFTER,
            reqwest::header::HeaderValue::from_static("18446744073709551615"),
        );
        assert_eq!(retry_after_ms(&headers), u64::MAX);

        headers.insert(
            reqwest::header::RETRY_AFTER,
            reqwest::header::HeaderValue::from_static("3"),
        );
        assert_eq!(retry_after_ms(&headers), 3000);
        assert_eq!(retry_after_ms(&reqwest::header::HeaderMap::new()), 1000);
    }

    #[test]
    fn extract_error_message_falls_back_to_body() {
        assert_eq!(extract_error_message("plain failure"), "plain failure");
    }

    #[test]
    fn parse_embedding_rejects_non_numeric() {
        assert_eq!(
            parse_embedding("x", &json!([0.25, 0.5])).unwrap(),
            vec![0.25, 0.5]
        );
        assert!(matches!(
            parse_embedding("x", &json!([0.1, "oops"])),
            Err(EnsembleError::MalformedResponse { .. })
        ));
        assert!(parse_embedding("x", &json!(null)).is_err());
        assert!(parse_embedding("x", &json!([])).is_err());
    }
}
