//! Panel gateway: the remote hosting panel seen as fallible async calls
//!
//! The provisioning core only needs three operations from the panel (list the
//! servers, restart one, look up a user) and treats each of them as a remote
//! call that can fail independently. [`PterodactylGateway`] speaks the
//! Pterodactyl/Pelican REST API; tests use in-memory implementations of
//! [`PanelGateway`].
//!
//! Listing and user lookups are retried here with the shared [`RetryPolicy`].
//! Restarts are never retried: the workflow paces them and records each
//! outcome exactly once.

use crate::fetch::{RetryPolicy, Retryable};
use crate::utils::normalize_host;
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

const PAGE_SIZE: u32 = 100;

/// Read-only view of a panel server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    /// Stable panel UUID, also the name of the server's volume directory
    pub identifier: String,
    pub display_name: String,
    pub owner_user_id: u64,
}

impl ServerRecord {
    pub fn new(
        identifier: impl Into<String>,
        display_name: impl Into<String>,
        owner_user_id: u64,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            owner_user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub root_admin: bool,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("panel answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected panel response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
#[error("invalid panel url `{0}`")]
pub struct InvalidPanelUrl(pub String);

impl Retryable for GatewayError {
    fn is_transient(&self) -> bool {
        match self {
            GatewayError::Http(e) => e.is_timeout() || e.is_connect(),
            GatewayError::Status { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Decode(_) => false,
        }
    }
}

#[async_trait]
pub trait PanelGateway: Send + Sync {
    /// Hostname of the panel, checked against the blacklist before each call.
    fn host(&self) -> &str;

    async fn list_servers(&self) -> Result<Vec<ServerRecord>, GatewayError>;

    /// `Ok(false)` means the panel refused the power action.
    async fn restart_server(&self, identifier: &str) -> Result<bool, GatewayError>;

    async fn get_user(&self, user_id: u64) -> Result<UserRecord, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    attributes: T,
}

#[derive(Debug, Deserialize)]
struct ServerAttributes {
    uuid: String,
    name: String,
    user: u64,
}

#[derive(Debug, Deserialize)]
struct UserAttributes {
    id: u64,
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    root_admin: bool,
}

#[derive(Debug, Deserialize)]
struct ServerPage {
    data: Vec<Envelope<ServerAttributes>>,
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    total_pages: u32,
}

/// Parses one page of `GET /api/application/servers`; returns the records and the page count.
pub fn parse_server_page(body: &str) -> Result<(Vec<ServerRecord>, u32), GatewayError> {
    let page: ServerPage = serde_json::from_str(body)?;
    let total_pages = page.meta.map(|m| m.pagination.total_pages).unwrap_or(1);
    let servers = page
        .data
        .into_iter()
        .map(|entry| ServerRecord {
            identifier: entry.attributes.uuid,
            display_name: entry.attributes.name,
            owner_user_id: entry.attributes.user,
        })
        .collect();
    Ok((servers, total_pages))
}

pub fn parse_user(body: &str) -> Result<UserRecord, GatewayError> {
    let envelope: Envelope<UserAttributes> = serde_json::from_str(body)?;
    let attrs = envelope.attributes;
    Ok(UserRecord {
        id: attrs.id,
        username: attrs.username,
        email: attrs.email,
        root_admin: attrs.root_admin,
    })
}

pub struct PterodactylGateway {
    client: reqwest::Client,
    base_url: String,
    host: String,
    application_key: String,
    client_key: String,
    retry: RetryPolicy,
}

impl PterodactylGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        application_key: String,
        client_key: String,
        retry: RetryPolicy,
    ) -> Result<Self, InvalidPanelUrl> {
        reqwest::Url::parse(base_url).map_err(|_| InvalidPanelUrl(base_url.to_string()))?;
        let host =
            normalize_host(base_url).ok_or_else(|| InvalidPanelUrl(base_url.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            host,
            application_key,
            client_key,
            retry,
        })
    }

    pub fn servers_url(&self, page: u32) -> String {
        format!(
            "{}/api/application/servers?page={}&per_page={}",
            self.base_url, page, PAGE_SIZE
        )
    }

    pub fn power_url(&self, identifier: &str) -> String {
        format!("{}/api/client/servers/{}/power", self.base_url, identifier)
    }

    pub fn user_url(&self, user_id: u64) -> String {
        format!("{}/api/application/users/{}", self.base_url, user_id)
    }

    async fn get_text(&self, url: &str) -> Result<String, GatewayError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.application_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(GatewayError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            })
        }
    }
}

#[async_trait]
impl PanelGateway for PterodactylGateway {
    fn host(&self) -> &str {
        &self.host
    }

    async fn list_servers(&self) -> Result<Vec<ServerRecord>, GatewayError> {
        let mut servers = Vec::new();
        let mut page = 1;

        loop {
            let url = self.servers_url(page);
            let body = self.retry.run("list servers", || self.get_text(&url)).await?;
            let (mut records, total_pages) = parse_server_page(&body)?;
            debug!("Fetched server page {}/{} ({} entries)", page, total_pages, records.len());
            servers.append(&mut records);

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        Ok(servers)
    }

    async fn restart_server(&self, identifier: &str) -> Result<bool, GatewayError> {
        let response = self
            .client
            .post(self.power_url(identifier))
            .bearer_auth(&self.client_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&serde_json::json!({ "signal": "restart" }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Restart accepted for {}", identifier);
            return Ok(true);
        }

        let body = response.text().await.unwrap_or_default();
        let err = GatewayError::Status {
            status: status.as_u16(),
            body: truncate(&body, 200),
        };
        if err.is_transient() {
            Err(err)
        } else {
            info!("Restart refused for {}: {}", identifier, err);
            Ok(false)
        }
    }

    async fn get_user(&self, user_id: u64) -> Result<UserRecord, GatewayError> {
        let url = self.user_url(user_id);
        let body = self.retry.run("get user", || self.get_text(&url)).await?;
        parse_user(&body)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
