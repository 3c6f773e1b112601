//! Slack Web API client.

use super::{SlackApi, SlackUser};
use crate::adapters::http::{HttpConfig, build_http_client, join_url, read_json, send};
use crate::adapters::{BackendError, BackendResult};
use crate::context::SyncContext;
use crate::models::InternalKey;
use reqwest::blocking::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Default Slack Web API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Blocking Slack Web API client authenticated with a bot token.
pub struct HttpSlackClient {
    token: SecretString,
    base_url: String,
    client: Client,
}

impl HttpSlackClient {
    /// Creates a client for the public Slack API.
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
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

    fn get(&self, method: &str) -> RequestBuilder {
        self.client
            .get(join_url(&self.base_url, method))
            .bearer_auth(self.token.expose_secret())
    }

    fn post(&self, method: &str) -> RequestBuilder {
        self.client
            .post(join_url(&self.base_url, method))
            .bearer_auth(self.token.expose_secret())
    }

    /// Sends a request and unwraps Slack's `ok`/`error` envelope.
    fn call<T: DeserializeOwned>(
        &self,
        ctx: &SyncContext,
        request: RequestBuilder,
    ) -> BackendResult<T> {
        let envelope: Envelope<T> = read_json(send(ctx, request)?)?;
        if !envelope.ok {
            return Err(BackendError::Api {
                code: envelope
                    .error
                    .unwrap_or_else(|| "unknown_error".to_string()),
            });
        }
        envelope
            .body
            .ok_or_else(|| BackendError::Decode("missing response payload".to_string()))
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: Option<T>,
}

#[derive(Deserialize)]
struct UserGroupUsers {
    users: Vec<String>,
}

#[derive(Deserialize)]
struct UsersInfo {
    users: Vec<User>,
}

#[derive(Deserialize)]
struct UserLookup {
    user: User,
}

#[derive(Deserialize)]
struct Empty {}

#[derive(Deserialize)]
struct User {
    id: String,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: Profile,
}

#[derive(Deserialize, Default)]
struct Profile {
    #[serde(default)]
    email: Option<String>,
}

impl From<User> for SlackUser {
    fn from(user: User) -> Self {
        Self {
            id: InternalKey::from(user.id),
            email: user.profile.email,
            is_bot: user.is_bot,
        }
    }
}

fn join_ids(user_ids: &[InternalKey]) -> String {
    user_ids
        .iter()
        .map(InternalKey::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

impl SlackApi for HttpSlackClient {
    fn usergroup_members(
        &self,
        ctx: &SyncContext,
        user_group_id: &str,
    ) -> BackendResult<Vec<InternalKey>> {
        let request = self
            .get("usergroups.users.list")
            .query(&[("usergroup", user_group_id)]);
        let body: UserGroupUsers = self.call(ctx, request)?;
        Ok(body.users.into_iter().map(InternalKey::from).collect())
    }

    fn users_info(
        &self,
        ctx: &SyncContext,
        user_ids: &[InternalKey],
    ) -> BackendResult<Vec<SlackUser>> {
        let request = self.post("users.info").form(&[("users", join_ids(user_ids))]);
        let body: UsersInfo = self.call(ctx, request)?;
        Ok(body.users.into_iter().map(SlackUser::from).collect())
    }

    fn user_by_email(&self, ctx: &SyncContext, email: &str) -> BackendResult<SlackUser> {
        let request = self.get("users.lookupByEmail").query(&[("email", email)]);
        let body: UserLookup = self.call(ctx, request)?;
        Ok(body.user.into())
    }

    fn update_usergroup_members(
        &self,
        ctx: &SyncContext,
        user_group_id: &str,
        user_ids: &[InternalKey],
    ) -> BackendResult<()> {
        let request = self.post("usergroups.users.update").form(&[
            ("usergroup", user_group_id.to_string()),
            ("users", join_ids(user_ids)),
        ]);
        let _: Empty = self.call(ctx, request)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> HttpSlackClient {
        HttpSlackClient::new(SecretString::from("xoxb-test")).with_base_url(server.url())
    }

    #[test]
    fn test_usergroup_members() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/usergroups.users.list")
            .match_query(Matcher::UrlEncoded("usergroup".into(), "S0123".into()))
            .match_header("authorization", "Bearer xoxb-test")
            .with_body(r#"{"ok":true,"users":["U1","U2"]}"#)
            .create();

        let members = client(&server).usergroup_members(&SyncContext::new(), "S0123");

        mock.assert();
        assert_eq!(
            members.unwrap(),
            vec![InternalKey::from("U1"), InternalKey::from("U2")]
        );
    }

    #[test]
    fn test_users_info_sends_comma_joined_ids() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/users.info")
            .match_body(Matcher::UrlEncoded("users".into(), "U1,U2".into()))
            .with_body(
                r#"{"ok":true,"users":[
                    {"id":"U1","profile":{"email":"a@x"}},
                    {"id":"U2","is_bot":true,"profile":{}}
                ]}"#,
            )
            .create();

        let users = client(&server)
            .users_info(
                &SyncContext::new(),
                &[InternalKey::from("U1"), InternalKey::from("U2")],
            )
            .unwrap();

        mock.assert();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].email.as_deref(), Some("a@x"));
        assert!(!users[0].is_bot);
        assert!(users[1].is_bot);
        assert!(users[1].email.is_none());
    }

    #[test]
    fn test_api_error_code_is_surfaced() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/usergroups.users.update")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("usergroup".into(), "S0123".into()),
                Matcher::UrlEncoded("users".into(), String::new()),
            ]))
            .with_body(r#"{"ok":false,"error":"invalid_arguments"}"#)
            .create();

        let result = client(&server).update_usergroup_members(&SyncContext::new(), "S0123", &[]);

        mock.assert();
        assert!(result.is_err_and(|e| e.is_api_code("invalid_arguments")));
    }

    #[test]
    fn test_lookup_by_email() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/users.lookupByEmail")
            .match_query(Matcher::UrlEncoded("email".into(), "a@x".into()))
            .with_body(r#"{"ok":true,"user":{"id":"U9","profile":{"email":"a@x"}}}"#)
            .create();

        let user = client(&server).user_by_email(&SyncContext::new(), "a@x");

        mock.assert();
        assert!(user.is_ok_and(|u| u.id.as_str() == "U9"));
    }

    #[test]
    fn test_http_status_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/usergroups.users.list")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("slow down")
            .create();

        let result = client(&server).usergroup_members(&SyncContext::new(), "S0123");

        assert!(matches!(result, Err(BackendError::Status { status: 429, .. })));
    }
}
