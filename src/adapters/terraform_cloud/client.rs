//! Terraform Cloud API v2 client.

use super::{Membership, MembershipPage, PAGE_SIZE, TerraformCloudApi};
use crate::adapters::BackendResult;
use crate::adapters::http::{HttpConfig, build_http_client, join_url, read_json, send};
use crate::context::SyncContext;
use crate::models::InternalKey;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Default Terraform Cloud API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://app.terraform.io/api/v2";

const JSON_API: &str = "application/vnd.api+json";
const MEMBERSHIP_TYPE: &str = "organization-memberships";

/// Blocking Terraform Cloud client authenticated with an API token.
pub struct HttpTerraformCloudClient {
    token: SecretString,
    base_url: String,
    client: Client,
}

impl HttpTerraformCloudClient {
    /// Creates a client for the public Terraform Cloud API.
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: build_http_client(HttpConfig::from_env()),
        }
    }

    /// Overrides the API endpoint, e.g. for Terraform Enterprise.
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

    fn authorise(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.token.expose_secret())
            .header(CONTENT_TYPE, JSON_API)
    }

    fn memberships_url(&self, organisation: &str) -> String {
        join_url(
            &self.base_url,
            &format!("organizations/{organisation}/organization-memberships"),
        )
    }
}

#[derive(Deserialize)]
struct Document<T> {
    data: T,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Deserialize)]
struct Meta {
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct Pagination {
    #[serde(rename = "next-page")]
    next_page: Option<u32>,
}

#[derive(Deserialize)]
struct Resource {
    id: String,
    attributes: Attributes,
}

#[derive(Deserialize)]
struct Attributes {
    email: String,
}

impl From<Resource> for Membership {
    fn from(resource: Resource) -> Self {
        Self {
            id: InternalKey::from(resource.id),
            email: resource.attributes.email,
        }
    }
}

#[derive(Serialize)]
struct CreateDocument<'a> {
    data: CreateResource<'a>,
}

#[derive(Serialize)]
struct CreateResource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    attributes: CreateAttributes<'a>,
}

#[derive(Serialize)]
struct CreateAttributes<'a> {
    email: &'a str,
}

impl TerraformCloudApi for HttpTerraformCloudClient {
    fn list_memberships(
        &self,
        ctx: &SyncContext,
        organisation: &str,
        page: u32,
    ) -> BackendResult<MembershipPage> {
        let request = self
            .authorise(self.client.get(self.memberships_url(organisation)))
            .query(&[("page[number]", page), ("page[size]", PAGE_SIZE)]);
        let document: Document<Vec<Resource>> = read_json(send(ctx, request)?)?;

        Ok(MembershipPage {
            memberships: document.data.into_iter().map(Membership::from).collect(),
            next_page: document
                .meta
                .and_then(|meta| meta.pagination)
                .and_then(|pagination| pagination.next_page),
        })
    }

    fn create_membership(
        &self,
        ctx: &SyncContext,
        organisation: &str,
        email: &str,
    ) -> BackendResult<Membership> {
        let body = CreateDocument {
            data: CreateResource {
                kind: MEMBERSHIP_TYPE,
                attributes: CreateAttributes { email },
            },
        };
        let request = self
            .authorise(self.client.post(self.memberships_url(organisation)))
            .json(&body);
        let document: Document<Resource> = read_json(send(ctx, request)?)?;
        Ok(document.data.into())
    }

    fn delete_membership(
        &self,
        ctx: &SyncContext,
        membership_id: &InternalKey,
    ) -> BackendResult<()> {
        let url = join_url(
            &self.base_url,
            &format!("organization-memberships/{membership_id}"),
        );
        send(ctx, self.authorise(self.client.delete(url)))?;
        Ok(())
    }
}
