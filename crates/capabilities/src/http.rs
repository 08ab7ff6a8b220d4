//! Shared JSON-over-HTTP fetch for the data sources.

use crate::SourceError;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Send `request` with `timeout` and decode a JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(
    service: &'static str,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<T, SourceError> {
    send(service, request, timeout)
        .await?
        .json()
        .await
        .map_err(|e| SourceError::Decode {
            service,
            message: e.without_url().to_string(),
        })
}

/// Like [`get_json`], for services that may answer in ISO-8859-1.
pub(crate) async fn get_latin1_json<T: DeserializeOwned>(
    service: &'static str,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<T, SourceError> {
    let body = send(service, request, timeout)
        .await?
        .bytes()
        .await
        .map_err(|e| network(service, timeout, e))?;
    decode_latin1_json(&body).map_err(|e| SourceError::Decode {
        service,
        message: e.to_string(),
    })
}

/// Decode UTF-8 JSON, falling back to reading every byte as a Latin-1 char.
pub(crate) fn decode_latin1_json<T: DeserializeOwned>(body: &[u8]) -> serde_json::Result<T> {
    match std::str::from_utf8(body) {
        Ok(text) => serde_json::from_str(text),
        Err(_) => {
            let text: String = body.iter().map(|&b| char::from(b)).collect();
            serde_json::from_str(&text)
        }
    }
}

async fn send(
    service: &'static str,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<Response, SourceError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| network(service, timeout, e))?;

    let status = response.status();
    debug!(service, %status, "response received");
    if !status.is_success() {
        return Err(SourceError::Status {
            service,
            status: status.as_u16(),
        });
    }
    Ok(response)
}

// Query strings can carry API keys, so URLs never reach error messages.
fn network(service: &'static str, timeout: Duration, e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout {
            service,
            seconds: timeout.as_secs(),
        }
    } else {
        SourceError::Network {
            service,
            message: e.without_url().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_bodies_decode() {
        let body = b"{\"nombre\": \"M\xe1laga\"}";
        let value: serde_json::Value = decode_latin1_json(body).unwrap();
        assert_eq!(value["nombre"], "Málaga");

        let value: serde_json::Value = decode_latin1_json("{\"nombre\": \"Cádiz\"}".as_bytes()).unwrap();
        assert_eq!(value["nombre"], "Cádiz");
    }
}
