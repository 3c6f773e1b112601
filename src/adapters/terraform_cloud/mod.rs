//! Terraform Cloud organisation membership adapter.
//!
//! Members are organisation memberships keyed by email. Unlike Slack the API
//! is delta-based: one request creates or deletes one membership.
//!
//! - `get` walks every page of memberships and caches email → membership ids.
//!   An email with several memberships is reported once.
//! - `add` invites each email not already cached. Creating a membership needs
//!   no internal id, so `add` works before `get`; new ids are cached only if
//!   the cache is populated.
//! - `remove` deletes every cached membership of an email and requires a
//!   prior `get`.
//!
//! # Configuration
//!
//! | Key | Required | Meaning |
//! |-----|----------|---------|
//! | `terraform_cloud_token` | yes, unless a client is injected | Organisation or user API token |
//! | `terraform_cloud_organisation` | yes | Organisation name |
//! | `terraform_cloud_base_url` | no | API endpoint override (Terraform Enterprise) |

mod client;

pub use client::HttpTerraformCloudClient;

use super::{
    Adapter, AdapterConfig, AdapterKind, BackendResult, IdentifierCache, InitOptions,
    backend_failure,
};
use crate::Result;
use crate::context::SyncContext;
use crate::models::{ExternalKey, InternalKey};
use secrecy::SecretString;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::Span;

/// Config key: API token.
pub const TOKEN: &str = "terraform_cloud_token";
/// Config key: organisation name.
pub const ORGANISATION: &str = "terraform_cloud_organisation";
/// Config key: API endpoint override.
pub const BASE_URL: &str = "terraform_cloud_base_url";

/// Memberships requested per page.
pub const PAGE_SIZE: u32 = 100;

const KIND: AdapterKind = AdapterKind::TerraformCloudMembership;

/// An organisation membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Membership id, e.g. `ou-abc123`.
    pub id: InternalKey,
    /// Email of the invited or active user.
    pub email: String,
}

/// One page of a membership listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipPage {
    /// Memberships on this page.
    pub memberships: Vec<Membership>,
    /// Number of the next page, `None` on the last page.
    pub next_page: Option<u32>,
}

/// The subset of the Terraform Cloud API the membership adapter needs.
pub trait TerraformCloudApi: Send + Sync {
    /// Lists one page (1-based) of organisation memberships.
    fn list_memberships(
        &self,
        ctx: &SyncContext,
        organisation: &str,
        page: u32,
    ) -> BackendResult<MembershipPage>;

    /// Invites a user to the organisation.
    fn create_membership(
        &self,
        ctx: &SyncContext,
        organisation: &str,
        email: &str,
    ) -> BackendResult<Membership>;

    /// Deletes a membership by id.
    fn delete_membership(&self, ctx: &SyncContext, membership_id: &InternalKey)
    -> BackendResult<()>;
}

/// Adapter over one Terraform Cloud organisation's memberships.
pub struct OrganisationMembership {
    client: Arc<dyn TerraformCloudApi>,
    organisation: String,
    cache: IdentifierCache,
    span: Span,
}

impl OrganisationMembership {
    /// Creates an adapter over an existing client.
    #[must_use]
    pub fn new(client: Arc<dyn TerraformCloudApi>, organisation: impl Into<String>) -> Self {
        let organisation = organisation.into();
        let span = tracing::info_span!("adapter", kind = KIND.as_str(), organisation = %organisation);
        Self {
            client,
            organisation,
            cache: IdentifierCache::default(),
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
    /// Returns `Error::MissingConfig` if `terraform_cloud_token` or
    /// `terraform_cloud_organisation` is absent.
    pub fn init(config: &AdapterConfig) -> Result<Self> {
        Self::init_with(config, InitOptions::default())
    }

    /// Creates an adapter from configuration with constructor overrides.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingConfig` if a required key is absent.
    pub fn init_with(
        config: &AdapterConfig,
        options: InitOptions<dyn TerraformCloudApi>,
    ) -> Result<Self> {
        let (client, span) = options.into_parts();

        let client: Arc<dyn TerraformCloudApi> = match client {
            Some(client) => client,
            None => {
                let token = config.require(KIND, TOKEN)?;
                let mut http = HttpTerraformCloudClient::new(SecretString::from(token.to_string()));
                if let Some(base_url) = config.get(BASE_URL) {
                    http = http.with_base_url(base_url);
                }
                Arc::new(http)
            },
        };
        let organisation = config.require(KIND, ORGANISATION)?;

        let adapter = Self::new(client, organisation);
        Ok(match span {
            Some(span) => adapter.with_span(span),
            None => adapter,
        })
    }

    /// Returns the organisation name.
    #[must_use]
    pub fn organisation(&self) -> &str {
        &self.organisation
    }

    /// Returns the identifier cache.
    #[must_use]
    pub const fn cache(&self) -> &IdentifierCache {
        &self.cache
    }
}

impl Adapter for OrganisationMembership {
    fn kind(&self) -> AdapterKind {
        KIND
    }

    fn get(&mut self, ctx: &SyncContext) -> Result<Vec<ExternalKey>> {
        let span = self.span.clone();
        let _entered = span.enter();

        let mut pairs = Vec::new();
        let mut members = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 1;

        loop {
            ctx.check()?;
            let listing = self
                .client
                .list_memberships(ctx, &self.organisation, page)
                .map_err(|e| {
                    backend_failure(
                        ctx,
                        KIND,
                        "list organization memberships",
                        format!("{} (page {page})", self.organisation),
                        e,
                    )
                })?;

            for membership in listing.memberships {
                let key = ExternalKey::from(membership.email);
                if seen.insert(key.clone()) {
                    members.push(key.clone());
                }
                pairs.push((key, membership.id));
            }

            match listing.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        self.cache.replace(pairs);
        tracing::debug!(members = members.len(), pages = page, "Fetched organisation memberships");
        Ok(members)
    }

    fn add(&mut self, ctx: &SyncContext, keys: &[ExternalKey]) -> Result<()> {
        let span = self.span.clone();
        let _entered = span.enter();

        for key in keys {
            if self.cache.contains(key.as_str()) {
                tracing::debug!(member = %key, "Membership already exists");
                continue;
            }
            ctx.check()?;
            let membership = self
                .client
                .create_membership(ctx, &self.organisation, key.as_str())
                .map_err(|e| {
                    backend_failure(ctx, KIND, "create organization membership", key.as_str(), e)
                })?;
            tracing::info!(member = %key, membership_id = %membership.id, "Created membership");
            self.cache.upsert([(key.clone(), membership.id)]);
        }
        Ok(())
    }

    fn remove(&mut self, ctx: &SyncContext, keys: &[ExternalKey]) -> Result<()> {
        let span = self.span.clone();
        let _entered = span.enter();

        self.cache.entries(KIND)?;

        for key in keys {
            let Some(membership_ids) = self.cache.get(key.as_str()).map(<[InternalKey]>::to_vec)
            else {
                tracing::warn!(member = %key, "No membership cached for member, skipping");
                continue;
            };
            for membership_id in &membership_ids {
                ctx.check()?;
                self.client
                    .delete_membership(ctx, membership_id)
                    .map_err(|e| {
                        backend_failure(ctx, KIND, "delete organization membership", key.as_str(), e)
                    })?;
                tracing::info!(member = %key, membership_id = %membership_id, "Deleted membership");
            }
            self.cache.evict([key]);
        }
        Ok(())
    }
}
