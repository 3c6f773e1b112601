//! Directory adapters.
//!
//! Every backend is reached through the [`Adapter`] contract: `get` the
//! current members, `add` members, `remove` members, all expressed in
//! [`ExternalKey`]s. Adapters translate to their provider's own identifiers
//! through a private [`IdentifierCache`] that is rebuilt by every `get`.
//!
//! # Available Implementations
//!
//! | Kind | Adapter | Mutation model |
//! |------|---------|----------------|
//! | `slack_user_group` | [`slack::SlackUserGroup`] | Full member list replace |
//! | `terraform_cloud_membership` | [`terraform_cloud::OrganisationMembership`] | Per-member create/delete |
//! | `opsgenie_schedule` | [`opsgenie::OnCallSchedule`] | Read-only |
//!
//! # Cache Discipline
//!
//! - `get` builds a fresh cache and swaps it in only once every page and batch
//!   has been fetched; a failed `get` leaves the previous cache untouched.
//! - `add`/`remove` never fetch implicitly. Calling them before a successful
//!   `get` fails with [`Error::CacheEmpty`] before any backend call is made.
//! - A successful `add` upserts the new mappings, a successful `remove` evicts
//!   the removed ones, so one `get` serves any number of mutations.
//!
//! Operations take `&mut self`: calls on one adapter instance are serialised
//! by the borrow checker. Separate instances own separate caches and may run
//! on different threads.

pub mod cache;
pub mod config;
mod http;
pub mod opsgenie;
pub mod options;
pub mod slack;
pub mod terraform_cloud;

pub use cache::IdentifierCache;
pub use config::{AdapterConfig, parse_flag};
pub use http::HttpConfig;
pub use options::InitOptions;

use crate::context::SyncContext;
use crate::models::ExternalKey;
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

/// Uniform membership contract over one backend group.
pub trait Adapter: Send {
    /// The adapter kind, used to label logs and errors.
    fn kind(&self) -> AdapterKind;

    /// Fetches the current member list.
    ///
    /// Replaces the identifier cache once the full list has been translated.
    /// Pagination and batch lookups are transparent to the caller.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if any page or lookup fails and
    /// `Error::Cancelled` if the context stops mid-fetch. No partial list is
    /// ever returned.
    fn get(&mut self, ctx: &SyncContext) -> Result<Vec<ExternalKey>>;

    /// Adds members.
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheEmpty` when the adapter needs a prior `get`,
    /// `Error::ReadOnly` for source-only adapters, and `Error::Backend` or
    /// `Error::Cancelled` for backend failures.
    fn add(&mut self, ctx: &SyncContext, keys: &[ExternalKey]) -> Result<()>;

    /// Removes members.
    ///
    /// # Errors
    ///
    /// Same as [`Adapter::add`].
    fn remove(&mut self, ctx: &SyncContext, keys: &[ExternalKey]) -> Result<()>;
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn kind(&self) -> AdapterKind {
        (**self).kind()
    }

    fn get(&mut self, ctx: &SyncContext) -> Result<Vec<ExternalKey>> {
        (**self).get(ctx)
    }

    fn add(&mut self, ctx: &SyncContext, keys: &[ExternalKey]) -> Result<()> {
        (**self).add(ctx, keys)
    }

    fn remove(&mut self, ctx: &SyncContext, keys: &[ExternalKey]) -> Result<()> {
        (**self).remove(ctx, keys)
    }
}

/// Available adapter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Slack user group.
    SlackUserGroup,
    /// Terraform Cloud organisation membership.
    TerraformCloudMembership,
    /// Opsgenie on-call schedule (read-only).
    OpsgenieSchedule,
}

impl AdapterKind {
    /// Returns all adapter kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::SlackUserGroup,
            Self::TerraformCloudMembership,
            Self::OpsgenieSchedule,
        ]
    }

    /// Returns the kind as used in configuration files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SlackUserGroup => "slack_user_group",
            Self::TerraformCloudMembership => "terraform_cloud_membership",
            Self::OpsgenieSchedule => "opsgenie_schedule",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown adapter kind '{s}'")))
    }
}

/// Constructs an adapter of the given kind from configuration.
///
/// # Errors
///
/// Returns `Error::MissingConfig` if a required key for that kind is absent.
pub fn build(kind: AdapterKind, config: &AdapterConfig) -> Result<Box<dyn Adapter>> {
    let adapter: Box<dyn Adapter> = match kind {
        AdapterKind::SlackUserGroup => Box::new(slack::SlackUserGroup::init(config)?),
        AdapterKind::TerraformCloudMembership => {
            Box::new(terraform_cloud::OrganisationMembership::init(config)?)
        },
        AdapterKind::OpsgenieSchedule => Box::new(opsgenie::OnCallSchedule::init(config)?),
    };
    Ok(adapter)
}

/// Failure reported by a backend service client.
#[derive(Debug, ThisError)]
pub enum BackendError {
    /// The API answered with an application-level error code.
    #[error("api error '{code}'")]
    Api {
        /// Provider error code, e.g. Slack's `invalid_arguments`.
        code: String,
    },

    /// The API answered with a non-success HTTP status.
    #[error("http status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The response could not be understood.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Returns `true` if this is an API error with the given code.
    #[must_use]
    pub fn is_api_code(&self, code: &str) -> bool {
        matches!(self, Self::Api { code: c } if c == code)
    }
}

/// Result type for backend service clients.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Wraps a backend failure with adapter context.
///
/// Failures observed after the context stopped are reported as cancellation:
/// the in-flight request was most likely cut short by the deadline.
pub(crate) fn backend_failure(
    ctx: &SyncContext,
    kind: AdapterKind,
    operation: &'static str,
    subject: impl Into<String>,
    source: BackendError,
) -> Error {
    if let Some(reason) = ctx.done() {
        return Error::Cancelled { reason };
    }
    let subject = subject.into();
    tracing::debug!(
        adapter = kind.as_str(),
        operation,
        subject = %subject,
        error = %source,
        "Backend call failed"
    );
    Error::Backend {
        adapter: kind.as_str(),
        operation,
        subject,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("slack_user_group", AdapterKind::SlackUserGroup; "slack")]
    #[test_case("terraform_cloud_membership", AdapterKind::TerraformCloudMembership; "tfc")]
    #[test_case("opsgenie_schedule", AdapterKind::OpsgenieSchedule; "opsgenie")]
    #[test_case("Slack-User-Group", AdapterKind::SlackUserGroup; "mixed case and dashes")]
    fn test_adapter_kind_parse(input: &str, expected: AdapterKind) {
        assert_eq!(input.parse::<AdapterKind>().ok(), Some(expected));
    }

    #[test]
    fn test_adapter_kind_parse_unknown() {
        let err = "github_team".parse::<AdapterKind>().err();
        assert!(matches!(err, Some(Error::InvalidConfig(msg)) if msg.contains("github_team")));
    }

    #[test]
    fn test_adapter_kind_roundtrip() {
        for kind in AdapterKind::all() {
            assert_eq!(kind.as_str().parse::<AdapterKind>().ok(), Some(*kind));
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn test_build_reports_missing_config() {
        let err = build(AdapterKind::SlackUserGroup, &AdapterConfig::new()).err();
        assert!(matches!(
            err,
            Some(Error::MissingConfig {
                adapter: "slack_user_group",
                ..
            })
        ));
    }

    #[test]
    fn test_build_each_kind() {
        let config = AdapterConfig::from_pairs([
            (slack::SLACK_API_KEY, "xoxb-test"),
            (slack::USER_GROUP_ID, "S0123"),
            (terraform_cloud::TOKEN, "tfc-token"),
            (terraform_cloud::ORGANISATION, "acme"),
            (opsgenie::API_KEY, "genie-key"),
            (opsgenie::SCHEDULE_ID, "schedule-1"),
        ]);

        for kind in AdapterKind::all() {
            let adapter = build(*kind, &config);
            assert!(adapter.is_ok_and(|a| a.kind() == *kind));
        }
    }

    #[test]
    fn test_backend_failure_prefers_cancellation() {
        let ctx = SyncContext::new();
        ctx.cancel_handle().cancel();
        let err = backend_failure(
            &ctx,
            AdapterKind::SlackUserGroup,
            "usergroups.users.list",
            "S0123",
            BackendError::Decode("truncated".to_string()),
        );
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_backend_failure_wraps_source() {
        let ctx = SyncContext::new();
        let err = backend_failure(
            &ctx,
            AdapterKind::SlackUserGroup,
            "users.lookupByEmail",
            "a@x",
            BackendError::Api {
                code: "users_not_found".to_string(),
            },
        );
        assert!(matches!(
            &err,
            Error::Backend { adapter: "slack_user_group", subject, .. } if subject == "a@x"
        ));
        assert!(
            err.backend_source()
                .is_some_and(|s| s.is_api_code("users_not_found"))
        );
    }
}
