//! Opsgenie schedule API client.

use super::OpsgenieApi;
use crate::adapters::BackendResult;
use crate::adapters::http::{HttpConfig, build_http_client, join_url, read_json, send};
use crate::context::SyncContext;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Default Opsgenie API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.opsgenie.com";

/// Blocking Opsgenie client authenticated with a `GenieKey`.
pub struct HttpOpsgenieClient {
    api_key: SecretString,
    base_url: String,
    client: Client,
}

impl HttpOpsgenieClient {
    /// Creates a client for the default Opsgenie instance.
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: build_http_client(HttpConfig::from_env()),
        }
    }

    /// Overrides the API endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the HTTP client configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: HttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }
}

#[derive(Deserialize)]
struct OnCallsResponse {
    data: OnCalls,
}

#[derive(Deserialize)]
struct OnCalls {
    #[serde(rename = "onCallRecipients", default)]
    on_call_recipients: Vec<String>,
}

impl OpsgenieApi for HttpOpsgenieClient {
    fn on_call_recipients(&self, ctx: &SyncContext, schedule_id: &str) -> BackendResult<Vec<String>> {
        let url = join_url(&self.base_url, &format!("v2/schedules/{schedule_id}/on-calls"));
        let request = self
            .client
            .get(url)
            .header(
                AUTHORIZATION,
                format!("GenieKey {}", self.api_key.expose_secret()),
            )
            .query(&[("scheduleIdentifierType", "id"), ("flat", "true")]);

        let response: OnCallsResponse = read_json(send(ctx, request)?)?;
        Ok(response.data.on_call_recipients)
    }
}
