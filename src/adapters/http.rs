//! Blocking HTTP plumbing shared by the provider clients.

use super::{BackendError, BackendResult};
use crate::context::SyncContext;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client configuration for provider APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl HttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(timeout_ms) = parse_env_u64("GROUPSYNC_HTTP_TIMEOUT_MS") {
            self.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = parse_env_u64("GROUPSYNC_HTTP_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = connect_timeout_ms;
        }
        self
    }
}

fn parse_env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Builds a blocking HTTP client with configured timeouts.
pub(crate) fn build_http_client(config: HttpConfig) -> Client {
    let mut builder = Client::builder().user_agent(format!(
        "{}/{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ));
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build provider HTTP client: {err}");
        Client::new()
    })
}

/// Sends a request, clamped to the context deadline.
///
/// Non-success statuses become [`BackendError::Status`] with the body kept.
pub(crate) fn send(ctx: &SyncContext, request: RequestBuilder) -> BackendResult<Response> {
    let request = match ctx.remaining() {
        Some(remaining) => request.timeout(remaining),
        None => request,
    };

    let response = request.send().map_err(|e| {
        tracing::debug!(
            error = %e,
            is_timeout = e.is_timeout(),
            is_connect = e.is_connect(),
            "Provider request failed"
        );
        BackendError::Transport(e)
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response)
}

/// Decodes a JSON response body.
pub(crate) fn read_json<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    response
        .json()
        .map_err(|e| BackendError::Decode(e.to_string()))
}

/// Joins a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_default() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.connect_timeout_ms, 3_000);
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://slack.com/api/", "/users.info"),
            "https://slack.com/api/users.info"
        );
        assert_eq!(
            join_url("https://slack.com/api", "users.info"),
            "https://slack.com/api/users.info"
        );
    }

    #[test]
    fn test_send_maps_error_status() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("not here")
            .create();

        let client = build_http_client(HttpConfig::default());
        let result = send(
            &SyncContext::new(),
            client.get(join_url(&server.url(), "missing")),
        );

        mock.assert();
        assert!(matches!(
            result,
            Err(BackendError::Status { status: 404, ref body }) if body == "not here"
        ));
    }
}
