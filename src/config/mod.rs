//! Sync definition files.
//!
//! A sync definition is a TOML file naming a source, a target and the
//! engine options:
//!
//! ```toml
//! [sync]
//! operating_mode = "add_and_remove"
//! order = "add_first"
//! dry_run = false
//! maximum_changes = 0
//! concurrent_fetch = false
//! timeout_secs = 300
//!
//! [source]
//! adapter = "opsgenie_schedule"
//! [source.settings]
//! opsgenie_api_key = "${OPSGENIE_API_KEY}"
//! opsgenie_schedule_id = "primary"
//!
//! [target]
//! adapter = "slack_user_group"
//! [target.settings]
//! slack_api_key = "${SLACK_TOKEN}"
//! slack_user_group_id = "S0123ABCD"
//! ```
//!
//! A source may list `members = [...]` instead of naming an adapter. Setting
//! values may reference environment variables as `${NAME}`.

use crate::adapters::{self, Adapter, AdapterConfig, AdapterKind};
use crate::context::SyncContext;
use crate::models::ExternalKey;
use crate::sync::{OperatingMode, OperationOrder, SyncOptions};
use crate::{Error, Result};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// File name looked up in the platform config directory.
pub const DEFAULT_FILE_NAME: &str = "sync.toml";

static ENV_REFERENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").ok());

/// One side of a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideDefinition {
    /// A configured adapter.
    Adapter {
        /// Adapter kind.
        kind: AdapterKind,
        /// Adapter settings with variables expanded.
        settings: AdapterConfig,
    },
    /// A fixed member list. Only valid as a source.
    Members(Vec<ExternalKey>),
}

impl SideDefinition {
    /// Builds the adapter for this side.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for a fixed member list and
    /// `Error::MissingConfig` if the adapter settings are incomplete.
    pub fn build(&self) -> Result<Box<dyn Adapter>> {
        match self {
            Self::Adapter { kind, settings } => adapters::build(*kind, settings),
            Self::Members(_) => Err(Error::InvalidConfig(
                "a fixed member list has no adapter".to_string(),
            )),
        }
    }
}

/// A parsed sync definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDefinition {
    /// Engine options.
    pub options: SyncOptions,
    /// Deadline for one run, measured from context creation.
    pub timeout: Option<Duration>,
    /// Source of truth.
    pub source: SideDefinition,
    /// Side that gets mutated. Always an adapter.
    pub target: SideDefinition,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SyncSection {
    operating_mode: Option<OperatingMode>,
    order: Option<OperationOrder>,
    dry_run: Option<bool>,
    maximum_changes: Option<usize>,
    concurrent_fetch: Option<bool>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SideSection {
    adapter: Option<String>,
    #[serde(default)]
    settings: AdapterConfig,
    members: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    sync: SyncSection,
    source: SideSection,
    target: SideSection,
}

impl SyncDefinition {
    /// Parses a definition, expanding `${NAME}` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the document is malformed or
    /// references an unset variable.
    pub fn parse(contents: &str) -> Result<Self> {
        Self::parse_with_env(contents, |name| std::env::var(name).ok())
    }

    /// Parses a definition with a custom variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`SyncDefinition::parse`].
    pub fn parse_with_env(contents: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let options = SyncOptions {
            order: file.sync.order.unwrap_or_default(),
            operating_mode: file.sync.operating_mode.unwrap_or_default(),
            dry_run: file.sync.dry_run.unwrap_or(false),
            maximum_changes: file.sync.maximum_changes.unwrap_or(0),
            concurrent_fetch: file.sync.concurrent_fetch.unwrap_or(false),
        };
        let timeout = file
            .sync
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let source = side("source", file.source, &lookup)?;
        let target = side("target", file.target, &lookup)?;
        if matches!(target, SideDefinition::Members(_)) {
            return Err(Error::InvalidConfig(
                "target must name an adapter, not a member list".to_string(),
            ));
        }

        Ok(Self {
            options,
            timeout,
            source,
            target,
        })
    }

    /// Loads a definition file.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the file cannot be read and
    /// `Error::InvalidConfig` if it cannot be parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        tracing::debug!(path = %path.display(), "Loading sync definition");
        Self::parse(&contents)
    }

    /// Loads the definition from the default location.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if no config directory exists or the
    /// file is missing, and `Error::InvalidConfig` if it cannot be parsed.
    pub fn load_default() -> Result<Self> {
        let path = default_path().ok_or_else(|| Error::OperationFailed {
            operation: "locate_config_file".to_string(),
            cause: "no config directory for this platform".to_string(),
        })?;
        Self::load_from_file(&path)
    }

    /// Creates a run context honouring the configured timeout.
    #[must_use]
    pub fn context(&self) -> SyncContext {
        let ctx = SyncContext::new();
        match self.timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }
}

/// Default definition path: `<config dir>/groupsync/sync.toml`.
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    let base_dirs = directories::BaseDirs::new()?;
    Some(
        base_dirs
            .config_dir()
            .join(env!("CARGO_PKG_NAME"))
            .join(DEFAULT_FILE_NAME),
    )
}

fn side(
    name: &str,
    section: SideSection,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<SideDefinition> {
    match (section.adapter, section.members) {
        (Some(adapter), None) => {
            let kind = adapter.parse::<AdapterKind>()?;
            let settings = section
                .settings
                .try_map_values(|key, value| expand_env(&value, lookup).map_err(|e| in_setting(name, key, e)))?;
            Ok(SideDefinition::Adapter { kind, settings })
        },
        (None, Some(members)) => Ok(SideDefinition::Members(
            members.into_iter().map(ExternalKey::from).collect(),
        )),
        (Some(_), Some(_)) => Err(Error::InvalidConfig(format!(
            "[{name}] sets both `adapter` and `members`"
        ))),
        (None, None) => Err(Error::InvalidConfig(format!(
            "[{name}] needs either `adapter` or `members`"
        ))),
    }
}

fn in_setting(side: &str, key: &str, err: Error) -> Error {
    match err {
        Error::InvalidConfig(msg) => Error::InvalidConfig(format!("[{side}.settings] {key}: {msg}")),
        other => other,
    }
}

/// Expands `${NAME}` references.
///
/// Text without references is returned unchanged.
///
/// # Errors
///
/// Returns `Error::InvalidConfig` naming the first unset variable.
pub fn expand_env(value: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let Some(pattern) = ENV_REFERENCE.as_ref() else {
        return Ok(value.to_string());
    };

    let mut missing: Option<String> = None;
    let expanded = pattern.replace_all(value, |caps: &Captures<'_>| {
        let name = &caps[1];
        lookup(name).unwrap_or_else(|| {
            missing.get_or_insert_with(|| name.to_string());
            String::new()
        })
    });

    match missing {
        Some(name) => Err(Error::InvalidConfig(format!(
            "environment variable '{name}' is not set"
        ))),
        None => Ok(expanded.into_owned()),
    }
}
