//! Slack user group adapter.
//!
//! Synchronises the members of a Slack user group, keyed by email address.
//!
//! # Provider quirks
//!
//! - Slack's `usergroups.users.update` replaces the full member list. `add`
//!   therefore sends the union of every cached member and the newly resolved
//!   ones, and `remove` sends every cached member except the removed ones.
//!   Both require a prior `get`.
//! - Users are resolved in batches of [`USERS_INFO_BATCH_SIZE`] ids.
//! - A user group can never be empty. Slack rejects an update that would
//!   empty it with the `invalid_arguments` error code; setting
//!   [`MUTE_GROUP_CANNOT_BE_EMPTY`] to `true` makes `remove` treat that
//!   rejection as success.
//! - Bots and accounts without an email are not reported, but their ids are
//!   kept from the last `get` and sent with every update so the full replace
//!   leaves them in the group.
//! - Accounts sharing an email are reported once; every one of their ids is
//!   kept on update and dropped on remove.
//!
//! # Configuration
//!
//! | Key | Required | Meaning |
//! |-----|----------|---------|
//! | `slack_api_key` | yes, unless a client is injected | Bot token |
//! | `slack_user_group_id` | yes | User group id, e.g. `S0123ABCD` |
//! | `slack_mute_group_cannot_be_empty` | no | `"true"` mutes the empty-group error |
//! | `slack_base_url` | no | API endpoint override |

mod client;

pub use client::HttpSlackClient;

use super::{
    Adapter, AdapterConfig, AdapterKind, BackendResult, IdentifierCache, InitOptions,
    backend_failure,
};
use crate::Result;
use crate::context::SyncContext;
use crate::models::{ExternalKey, InternalKey, join_keys};
use secrecy::SecretString;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::Span;

/// Config key: Slack API token.
pub const SLACK_API_KEY: &str = "slack_api_key";
/// Config key: user group id.
pub const USER_GROUP_ID: &str = "slack_user_group_id";
/// Config key: mute the "group cannot be empty" error on remove.
pub const MUTE_GROUP_CANNOT_BE_EMPTY: &str = "slack_mute_group_cannot_be_empty";
/// Config key: API endpoint override.
pub const BASE_URL: &str = "slack_base_url";

/// Maximum number of user ids per `users.info` call.
pub const USERS_INFO_BATCH_SIZE: usize = 30;

/// Slack error code returned when an update would leave a user group empty.
pub const GROUP_CANNOT_BE_EMPTY: &str = "invalid_arguments";

const KIND: AdapterKind = AdapterKind::SlackUserGroup;

/// A Slack account as returned by the users endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackUser {
    /// Slack user id.
    pub id: InternalKey,
    /// Profile email, if visible to the token.
    pub email: Option<String>,
    /// Whether the account is a bot.
    pub is_bot: bool,
}

/// The subset of the Slack Web API the user group adapter needs.
pub trait SlackApi: Send + Sync {
    /// Lists the user ids in a user group (`usergroups.users.list`).
    fn usergroup_members(
        &self,
        ctx: &SyncContext,
        user_group_id: &str,
    ) -> BackendResult<Vec<InternalKey>>;

    /// Looks up at most [`USERS_INFO_BATCH_SIZE`] users by id (`users.info`).
    fn users_info(&self, ctx: &SyncContext, user_ids: &[InternalKey])
    -> BackendResult<Vec<SlackUser>>;

    /// Looks up a user by email (`users.lookupByEmail`).
    fn user_by_email(&self, ctx: &SyncContext, email: &str) -> BackendResult<SlackUser>;

    /// Replaces the full member list of a user group (`usergroups.users.update`).
    fn update_usergroup_members(
        &self,
        ctx: &SyncContext,
        user_group_id: &str,
        user_ids: &[InternalKey],
    ) -> BackendResult<()>;
}

/// Adapter over one Slack user group.
pub struct SlackUserGroup {
    client: Arc<dyn SlackApi>,
    user_group_id: String,
    mute_group_cannot_be_empty: bool,
    cache: IdentifierCache,
    unmanaged: Vec<InternalKey>,
    span: Span,
}

impl SlackUserGroup {
    /// Creates an adapter over an existing client.
    #[must_use]
    pub fn new(client: Arc<dyn SlackApi>, user_group_id: impl Into<String>) -> Self {
        let user_group_id = user_group_id.into();
        let span = default_span(&user_group_id);
        Self {
            client,
            user_group_id,
            mute_group_cannot_be_empty: false,
            cache: IdentifierCache::default(),
            unmanaged: Vec::new(),
            span,
        }
    }

    /// Sets whether `remove` swallows the "group cannot be empty" error.
    #[must_use]
    pub const fn with_mute_group_cannot_be_empty(mut self, mute: bool) -> Self {
        self.mute_group_cannot_be_empty = mute;
        self
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
    /// Returns `Error::MissingConfig` if `slack_api_key` or
    /// `slack_user_group_id` is absent.
    pub fn init(config: &AdapterConfig) -> Result<Self> {
        Self::init_with(config, InitOptions::default())
    }

    /// Creates an adapter from configuration with constructor overrides.
    ///
    /// An injected client makes `slack_api_key` optional.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingConfig` if a required key is absent.
    pub fn init_with(config: &AdapterConfig, options: InitOptions<dyn SlackApi>) -> Result<Self> {
        let (client, span) = options.into_parts();

        let client: Arc<dyn SlackApi> = match client {
            Some(client) => client,
            None => {
                let token = config.require(KIND, SLACK_API_KEY)?;
                let mut http = HttpSlackClient::new(SecretString::from(token.to_string()));
                if let Some(base_url) = config.get(BASE_URL) {
                    http = http.with_base_url(base_url);
                }
                Arc::new(http)
            },
        };
        let user_group_id = config.require(KIND, USER_GROUP_ID)?;

        let mut adapter = Self::new(client, user_group_id)
            .with_mute_group_cannot_be_empty(config.flag(MUTE_GROUP_CANNOT_BE_EMPTY));
        if let Some(span) = span {
            adapter = adapter.with_span(span);
        }
        Ok(adapter)
    }

    /// Returns the user group id.
    #[must_use]
    pub fn user_group_id(&self) -> &str {
        &self.user_group_id
    }

    /// Returns whether the "group cannot be empty" error is muted.
    #[must_use]
    pub const fn mutes_group_cannot_be_empty(&self) -> bool {
        self.mute_group_cannot_be_empty
    }

    /// Returns the identifier cache.
    #[must_use]
    pub const fn cache(&self) -> &IdentifierCache {
        &self.cache
    }

    /// Group members with no external key (bots, accounts without email)
    /// seen by the last successful `get`.
    #[must_use]
    pub fn unmanaged_members(&self) -> &[InternalKey] {
        &self.unmanaged
    }

    /// Sends the full member list, sorted for stable requests.
    fn replace_members(&self, ctx: &SyncContext, mut user_ids: Vec<InternalKey>) -> Result<()> {
        user_ids.sort();
        user_ids.dedup();
        ctx.check()?;
        self.client
            .update_usergroup_members(ctx, &self.user_group_id, &user_ids)
            .map_err(|e| {
                backend_failure(
                    ctx,
                    KIND,
                    "usergroups.users.update",
                    self.user_group_id.clone(),
                    e,
                )
            })
    }
}

fn default_span(user_group_id: &str) -> Span {
    tracing::info_span!("adapter", kind = KIND.as_str(), user_group = %user_group_id)
}

impl Adapter for SlackUserGroup {
    fn kind(&self) -> AdapterKind {
        KIND
    }

    fn get(&mut self, ctx: &SyncContext) -> Result<Vec<ExternalKey>> {
        let span = self.span.clone();
        let _entered = span.enter();

        ctx.check()?;
        let user_ids = self
            .client
            .usergroup_members(ctx, &self.user_group_id)
            .map_err(|e| {
                backend_failure(
                    ctx,
                    KIND,
                    "usergroups.users.list",
                    self.user_group_id.clone(),
                    e,
                )
            })?;

        let mut pairs = Vec::with_capacity(user_ids.len());
        let mut unmanaged = Vec::new();
        let mut members = Vec::with_capacity(user_ids.len());
        let mut seen = HashSet::with_capacity(user_ids.len());

        for batch in user_ids.chunks(USERS_INFO_BATCH_SIZE) {
            ctx.check()?;
            let users = self.client.users_info(ctx, batch).map_err(|e| {
                let subject = batch
                    .iter()
                    .map(InternalKey::as_str)
                    .collect::<Vec<_>>()
                    .join(",");
                backend_failure(ctx, KIND, "users.info", subject, e)
            })?;

            for user in users {
                if user.is_bot {
                    tracing::debug!(user_id = %user.id, "Skipping bot account");
                    unmanaged.push(user.id);
                    continue;
                }
                let Some(email) = user.email.filter(|email| !email.is_empty()) else {
                    tracing::debug!(user_id = %user.id, "Skipping account without email");
                    unmanaged.push(user.id);
                    continue;
                };
                let key = ExternalKey::from(email);
                if seen.insert(key.clone()) {
                    members.push(key.clone());
                }
                pairs.push((key, user.id));
            }
        }

        self.cache.replace(pairs);
        self.unmanaged = unmanaged;
        tracing::debug!(
            members = members.len(),
            unmanaged = self.unmanaged.len(),
            "Fetched Slack user group"
        );
        Ok(members)
    }

    fn add(&mut self, ctx: &SyncContext, keys: &[ExternalKey]) -> Result<()> {
        let span = self.span.clone();
        let _entered = span.enter();

        let cached = self.cache.entries(KIND)?;

        let mut resolved: Vec<(ExternalKey, InternalKey)> = Vec::new();
        for key in keys {
            if cached.contains_key(key) || resolved.iter().any(|(k, _)| k == key) {
                continue;
            }
            ctx.check()?;
            let user = self
                .client
                .user_by_email(ctx, key.as_str())
                .map_err(|e| backend_failure(ctx, KIND, "users.lookupByEmail", key.as_str(), e))?;
            resolved.push((key.clone(), user.id));
        }

        let user_ids: Vec<InternalKey> = cached
            .values()
            .flatten()
            .chain(&self.unmanaged)
            .chain(resolved.iter().map(|(_, id)| id))
            .cloned()
            .collect();
        let total = user_ids.len();

        self.replace_members(ctx, user_ids)?;

        tracing::info!(
            added = %join_keys(keys),
            resolved = resolved.len(),
            members = total,
            "Added members to Slack user group"
        );
        self.cache.upsert(resolved);
        Ok(())
    }

    fn remove(&mut self, ctx: &SyncContext, keys: &[ExternalKey]) -> Result<()> {
        let span = self.span.clone();
        let _entered = span.enter();

        let cached = self.cache.entries(KIND)?;

        let removing: HashSet<&str> = keys.iter().map(ExternalKey::as_str).collect();
        let remaining: Vec<InternalKey> = cached
            .iter()
            .filter(|(key, _)| !removing.contains(key.as_str()))
            .flat_map(|(_, ids)| ids)
            .chain(&self.unmanaged)
            .cloned()
            .collect();

        match self.replace_members(ctx, remaining) {
            Ok(()) => {
                tracing::info!(removed = %join_keys(keys), "Removed members from Slack user group");
            },
            Err(err) if self.mute_group_cannot_be_empty && is_group_cannot_be_empty(&err) => {
                tracing::warn!(
                    removed = %join_keys(keys),
                    "Slack refused to empty the user group, error muted"
                );
            },
            Err(err) => return Err(err),
        }

        self.cache.evict(keys);
        Ok(())
    }
}

fn is_group_cannot_be_empty(err: &crate::Error) -> bool {
    err.backend_source()
        .is_some_and(|source| source.is_api_code(GROUP_CANNOT_BE_EMPTY))
}
