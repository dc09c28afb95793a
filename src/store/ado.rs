//! Azure DevOps REST adapter.
//!
//! Implements `ItemStore` and `ProjectDirectory` on top of the tracker's
//! REST API (version 7.1 by default). Requests authenticate with a personal
//! access token sent as HTTP basic credentials with an empty user name.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use super::{BATCH_LIMIT, ItemStore, ProjectDirectory, StoreError, wiql};
use crate::models::{Item, ItemId, ItemQuery, join_ids};

/// Default tracker host.
pub const DEFAULT_BASE_URL: &str = "https://dev.azure.com";

/// User-Agent sent with every request
const USER_AGENT: &str = concat!("workboard/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in `StoreError::Status`
const MAX_ERROR_BODY: usize = 512;

/// Connection settings for the tracker, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdoSettings {
    pub organization: String,
    pub project: String,
    /// Team used for iteration lookups when the caller names none
    pub team: Option<String>,
    /// Personal access token (sensitive!)
    pub pat: String,
    pub api_version: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl AdoSettings {
    /// The team to use when none is given: configured team or `<project> Team`.
    pub fn default_team(&self) -> String {
        self.team
            .clone()
            .unwrap_or_else(|| format!("{} Team", self.project))
    }
}

/// HTTP client for one organization/project pair.
#[derive(Debug, Clone)]
pub struct AdoClient {
    http: reqwest::Client,
    settings: AdoSettings,
}

#[derive(Debug, Deserialize)]
struct WiqlRef {
    id: ItemId,
}

#[derive(Debug, Deserialize)]
struct WiqlLink {
    #[serde(default)]
    target: Option<WiqlRef>,
}

#[derive(Debug, Deserialize)]
struct WiqlResponse {
    #[serde(default, rename = "workItems")]
    work_items: Vec<WiqlRef>,
    #[serde(default, rename = "workItemRelations")]
    work_item_relations: Vec<WiqlLink>,
}

/// Batch responses carry `null` entries for ids omitted by `errorPolicy=omit`.
#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    value: Vec<Option<Item>>,
}

impl AdoClient {
    /// Build a client; fails only if the TLS backend cannot be initialized.
    pub fn new(settings: AdoSettings) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self { http, settings })
    }

    /// `{base}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.settings.base_url)
            .map_err(|e| StoreError::Unavailable(format!("invalid base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Unavailable("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `{org}/{project}/_apis/{path...}`
    fn project_api(&self, path: &[&str]) -> Result<Url, StoreError> {
        let mut segments = vec![
            self.settings.organization.as_str(),
            self.settings.project.as_str(),
            "_apis",
        ];
        segments.extend_from_slice(path);
        self.url(&segments)
    }

    /// `{org}/_apis/projects/{project}/teams/{path...}`
    fn teams_api(&self, path: &[&str]) -> Result<Url, StoreError> {
        let mut segments = vec![
            self.settings.organization.as_str(),
            "_apis",
            "projects",
            self.settings.project.as_str(),
            "teams",
        ];
        segments.extend_from_slice(path);
        self.url(&segments)
    }

    /// URL of one batch fetch.
    pub fn batch_url(&self, ids: &[ItemId], include_relations: bool) -> Result<Url, StoreError> {
        let mut url = self.project_api(&["wit", "workitems"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("ids", &join_ids(ids));
            if include_relations {
                query.append_pair("$expand", "relations");
            }
            query.append_pair("errorPolicy", "omit");
            query.append_pair("api-version", &self.settings.api_version);
        }
        Ok(url)
    }

    fn with_api_version(&self, mut url: Url) -> Url {
        url.query_pairs_mut()
            .append_pair("api-version", &self.settings.api_version);
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = request
            .basic_auth("", Some(&self.settings.pat))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() && status != StatusCode::NON_AUTHORITATIVE_INFORMATION {
            return response
                .json::<T>()
                .await
                .map_err(|e| StoreError::Decode(e.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, StoreError> {
        tracing::debug!(%url, "GET");
        self.send(self.http.get(url)).await
    }

    async fn wiql<T: DeserializeOwned>(&self, query: &str) -> Result<T, StoreError> {
        let url = self.with_api_version(self.project_api(&["wit", "wiql"])?);
        tracing::debug!(%url, query, "POST wiql");
        self.send(
            self.http
                .post(url)
                .json(&serde_json::json!({ "query": query })),
        )
        .await
    }
}

/// Map a non-success response to a store error.
///
/// The tracker answers bad credentials either with 401 or with a 203
/// sign-in page, so both count as `Unauthorized`.
fn classify_failure(status: StatusCode, body: &str) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::NON_AUTHORITATIVE_INFORMATION => {
            StoreError::Unauthorized
        }
        _ => StoreError::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        },
    }
}

#[async_trait]
impl ItemStore for AdoClient {
    async fn find_ids(&self, query: &ItemQuery) -> Result<Vec<ItemId>, StoreError> {
        let response: WiqlResponse = self.wiql(&wiql::render(query)).await?;
        Ok(response.work_items.into_iter().map(|r| r.id).collect())
    }

    async fn fetch_by_ids(
        &self,
        ids: &[ItemId],
        include_relations: bool,
    ) -> Result<Vec<Item>, StoreError> {
        if ids.len() > BATCH_LIMIT {
            return Err(StoreError::BatchTooLarge(ids.len()));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let response: BatchResponse = self.get(self.batch_url(ids, include_relations)?).await?;
        Ok(response.value.into_iter().flatten().collect())
    }

    async fn child_ids(&self, parent: ItemId) -> Result<Vec<ItemId>, StoreError> {
        let response: WiqlResponse = self.wiql(&wiql::render_children(parent)).await?;
        // The first link row is the parent itself with no source.
        Ok(response
            .work_item_relations
            .into_iter()
            .filter_map(|link| link.target.map(|t| t.id))
            .filter(|id| *id != parent)
            .collect())
    }
}

#[async_trait]
impl ProjectDirectory for AdoClient {
    async fn iterations(
        &self,
        team: Option<&str>,
        current_only: bool,
    ) -> Result<Value, StoreError> {
        let team = team
            .map(str::to_string)
            .unwrap_or_else(|| self.settings.default_team());
        let mut url = self.url(&[
            self.settings.organization.as_str(),
            self.settings.project.as_str(),
            team.as_str(),
            "_apis",
            "work",
            "teamsettings",
            "iterations",
        ])?;
        if current_only {
            url.query_pairs_mut().append_pair("$timeframe", "current");
        }
        self.get(self.with_api_version(url)).await
    }

    async fn teams(&self) -> Result<Value, StoreError> {
        let url = self.with_api_version(self.teams_api(&[])?);
        self.get(url).await
    }

    async fn team_members(&self, team: &str) -> Result<Value, StoreError> {
        let url = self.with_api_version(self.teams_api(&[team, "members"])?);
        self.get(url).await
    }

    async fn pull_requests(&self, status: &str, top: u32) -> Result<Value, StoreError> {
        let mut url = self.project_api(&["git", "pullrequests"])?;
        url.query_pairs_mut()
            .append_pair("searchCriteria.status", status)
            .append_pair("$top", &top.to_string());
        self.get(self.with_api_version(url)).await
    }

    async fn run_wiql(&self, query: &str) -> Result<Value, StoreError> {
        self.wiql(query).await
    }
}
