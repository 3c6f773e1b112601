//! Adapter configuration.
//!
//! Adapters are constructed from a flat map of named settings. Each adapter
//! module exports its recognised keys as constants. Required keys fail
//! construction with [`Error::MissingConfig`]; flags go through
//! [`parse_flag`].

use super::AdapterKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named settings handed to an adapter constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterConfig(BTreeMap<String, String>);

impl AdapterConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from key/value pairs.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Sets a value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns a value if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns a required value.
    ///
    /// Presence is what counts: an empty string is a present value.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingConfig` naming the key if it is absent.
    pub fn require(&self, kind: AdapterKind, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::MissingConfig {
            adapter: kind.as_str(),
            key: key.to_string(),
        })
    }

    /// Returns a boolean flag, see [`parse_flag`].
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        parse_flag(self.get(key))
    }

    /// Iterates over all settings.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Applies `f` to every value, failing on the first error.
    pub(crate) fn try_map_values(
        self,
        mut f: impl FnMut(&str, String) -> Result<String>,
    ) -> Result<Self> {
        self.0
            .into_iter()
            .map(|(k, v)| {
                let v = f(&k, v)?;
                Ok((k, v))
            })
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Self)
    }
}

/// Parses a boolean flag.
///
/// Only `"true"` in any letter case is true. Everything else, including an
/// absent value, `"1"`, `"yes"` or `" true"`, is false.
#[must_use]
pub fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some("true"), true; "lowercase")]
    #[test_case(Some("True"), true; "titlecase")]
    #[test_case(Some("TRUE"), true; "uppercase")]
    #[test_case(Some("tRuE"), true; "mixed case")]
    #[test_case(None, false; "absent")]
    #[test_case(Some(""), false; "empty")]
    #[test_case(Some("false"), false; "false")]
    #[test_case(Some("FALSE"), false; "uppercase false")]
    #[test_case(Some("False"), false; "titlecase false")]
    #[test_case(Some("foobar"), false; "garbage")]
    #[test_case(Some("1"), false; "numeric")]
    #[test_case(Some("yes"), false; "yes")]
    #[test_case(Some(" true"), false; "leading space")]
    fn test_parse_flag(value: Option<&str>, expected: bool) {
        assert_eq!(parse_flag(value), expected);
    }

    #[test]
    fn test_require_names_missing_key() {
        let config = AdapterConfig::from_pairs([("slack_user_group_id", "S0123")]);
        let err = config
            .require(AdapterKind::SlackUserGroup, "slack_api_key")
            .err();
        assert!(matches!(
            err,
            Some(Error::MissingConfig { key, .. }) if key == "slack_api_key"
        ));
        assert_eq!(
            config
                .require(AdapterKind::SlackUserGroup, "slack_user_group_id")
                .ok(),
            Some("S0123")
        );
    }

    #[test]
    fn test_require_accepts_empty_value() {
        let config = AdapterConfig::new().with("slack_api_key", "");
        assert_eq!(
            config
                .require(AdapterKind::SlackUserGroup, "slack_api_key")
                .ok(),
            Some("")
        );
    }

    #[test]
    fn test_deserialize_from_toml_table() {
        let config: AdapterConfig =
            toml::from_str("slack_api_key = \"xoxb\"\nslack_user_group_id = \"S1\"\n")
                .unwrap();
        assert_eq!(config.get("slack_api_key"), Some("xoxb"));
        assert_eq!(config.iter().count(), 2);
    }

    #[test]
    fn test_try_map_values_stops_on_error() {
        let config = AdapterConfig::from_pairs([("a", "1"), ("b", "2")]);
        let mapped = config
            .clone()
            .try_map_values(|_, v| Ok(format!("{v}{v}")))
            .unwrap();
        assert_eq!(mapped.get("b"), Some("22"));

        let failed = config.try_map_values(|k, _| Err(Error::InvalidConfig(k.to_string())));
        assert!(failed.is_err());
    }
}
