// Request/response plumbing shared by the HTTP sources
use crate::types::*;
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default whole-request timeout for sources without explicit limits
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub fn build_client(
    headers: HeaderMap,
    timeout: Duration,
    connect_timeout: Option<Duration>,
) -> Result<Client> {
    let mut builder = Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90));

    if let Some(connect) = connect_timeout {
        builder = builder.connect_timeout(connect);
    }

    builder
        .build()
        .map_err(|e| PriceHistoryError::ApiError(format!("Failed to create HTTP client: {}", e)))
}

/// Send a request, mapping only transport failures
pub async fn dispatch(request: RequestBuilder, source_name: &str) -> Result<Response> {
    request.send().await.map_err(|e| {
        // URLs may carry API keys
        PriceHistoryError::ApiError(format!("{} request failed: {}", source_name, e.without_url()))
    })
}

/// Send a request and hand back the response only if it succeeded
pub async fn send(request: RequestBuilder, source_name: &str) -> Result<Response> {
    let response = dispatch(request, source_name).await?;
    check_status(response, source_name).await
}

/// `RateLimit` for a 429, carrying `retry-after` seconds when present
pub fn rate_limit_error(response: &Response, source_name: &str) -> Option<PriceHistoryError> {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    Some(PriceHistoryError::RateLimit {
        source_name: source_name.to_string(),
        retry_after,
    })
}

/// Map 429 and other non-2xx statuses onto errors
pub async fn check_status(response: Response, source_name: &str) -> Result<Response> {
    if let Some(err) = rate_limit_error(&response, source_name) {
        return Err(err);
    }

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(PriceHistoryError::ApiError(format!(
            "{} API error ({}): {}",
            source_name, status, text
        )));
    }

    Ok(response)
}

/// Send a request and decode its JSON body
pub async fn send_json<T: DeserializeOwned>(request: RequestBuilder, source_name: &str) -> Result<T> {
    let response = send(request, source_name).await?;
    decode_json(response, source_name).await
}

pub async fn decode_json<T: DeserializeOwned>(response: Response, source_name: &str) -> Result<T> {
    response.json::<T>().await.map_err(|e| {
        PriceHistoryError::InvalidResponse(format!("{} response: {}", source_name, e.without_url()))
    })
}
