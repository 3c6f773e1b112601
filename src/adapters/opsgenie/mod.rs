//! Opsgenie on-call schedule adapter.
//!
//! Reports who is currently on call for a schedule. On-call rotations are
//! managed in Opsgenie itself, so the adapter is read-only and only usable as
//! a sync source: `add` and `remove` fail with [`Error::ReadOnly`].
//!
//! # Configuration
//!
//! | Key | Required | Meaning |
//! |-----|----------|---------|
//! | `opsgenie_api_key` | yes, unless a client is injected | API integration key |
//! | `opsgenie_schedule_id` | yes | Schedule id |
//! | `opsgenie_base_url` | no | API endpoint override, e.g. the EU instance |

mod client;

pub use client::HttpOpsgenieClient;

use super::{Adapter, AdapterConfig, AdapterKind, BackendResult, InitOptions, backend_failure};
use crate::context::SyncContext;
use crate::models::ExternalKey;
use crate::{Error, Result};
use secrecy::SecretString;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::Span;

/// Config key: API key.
pub const API_KEY: &str = "opsgenie_api_key";
/// Config key: schedule id.
pub const SCHEDULE_ID: &str = "opsgenie_schedule_id";
/// Config key: API endpoint override.
pub const BASE_URL: &str = "opsgenie_base_url";

const KIND: AdapterKind = AdapterKind::OpsgenieSchedule;

/// The subset of the Opsgenie API the schedule adapter needs.
pub trait OpsgenieApi: Send + Sync {
    /// Returns the usernames (emails) currently on call, flattened across
    /// escalations and rotations.
    fn on_call_recipients(&self, ctx: &SyncContext, schedule_id: &str) -> BackendResult<Vec<String>>;
}

/// Read-only adapter over one Opsgenie schedule.
pub struct OnCallSchedule {
    client: Arc<dyn OpsgenieApi>,
    schedule_id: String,
    span: Span,
}

impl OnCallSchedule {
    /// Creates an adapter over an existing client.
    #[must_use]
    pub fn new(client: Arc<dyn OpsgenieApi>, schedule_id: impl Into<String>) -> Self {
        let schedule_id = schedule_id.into();
        let span = tracing::info_span!("adapter", kind = KIND.as_str(), schedule = %schedule_id);
        Self {
            client,
            schedule_id,
            span,
        }
    }

    /// Emits diagnostics inside the given span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Creates an adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingConfig` if `opsgenie_api_key` or
    /// `opsgenie_schedule_id` is absent.
    pub fn init(config: &AdapterConfig) -> Result<Self> {
        Self::init_with(config, InitOptions::default())
    }

    /// Creates an adapter from configuration with constructor overrides.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingConfig` if a required key is absent.
    pub fn init_with(config: &AdapterConfig, options: InitOptions<dyn OpsgenieApi>) -> Result<Self> {
        let (client, span) = options.into_parts();

        let client: Arc<dyn OpsgenieApi> = match client {
            Some(client) => client,
            None => {
                let api_key = config.require(KIND, API_KEY)?;
                let mut http = HttpOpsgenieClient::new(SecretString::from(api_key.to_string()));
                if let Some(base_url) = config.get(BASE_URL) {
                    http = http.with_base_url(base_url);
                }
                Arc::new(http)
            },
        };
        let schedule_id = config.require(KIND, SCHEDULE_ID)?;

        let adapter = Self::new(client, schedule_id);
        Ok(match span {
            Some(span) => adapter.with_span(span),
            None => adapter,
        })
    }

    /// Returns the schedule id.
    #[must_use]
    pub fn schedule_id(&self) -> &str {
        &self.schedule_id
    }
}

impl Adapter for OnCallSchedule {
    fn kind(&self) -> AdapterKind {
        KIND
    }

    fn get(&mut self, ctx: &SyncContext) -> Result<Vec<ExternalKey>> {
        let _entered = self.span.enter();

        ctx.check()?;
        let recipients = self
            .client
            .on_call_recipients(ctx, &self.schedule_id)
            .map_err(|e| backend_failure(ctx, KIND, "get on-calls", self.schedule_id.clone(), e))?;

        let mut seen = HashSet::new();
        let members: Vec<ExternalKey> = recipients
            .into_iter()
            .filter(|recipient| seen.insert(recipient.clone()))
            .map(ExternalKey::from)
            .collect();

        tracing::debug!(members = members.len(), "Fetched on-call recipients");
        Ok(members)
    }

    fn add(&mut self, _ctx: &SyncContext, _keys: &[ExternalKey]) -> Result<()> {
        Err(Error::ReadOnly {
            adapter: KIND.as_str(),
            operation: "add",
        })
    }

    fn remove(&mut self, _ctx: &SyncContext, _keys: &[ExternalKey]) -> Result<()> {
        Err(Error::ReadOnly {
            adapter: KIND.as_str(),
            operation: "remove",
        })
    }
}
