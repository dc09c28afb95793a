//! Route handlers.

use axum::{
    Json, async_trait,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::AppState;
use crate::Error;
use crate::hierarchy::TreeView;
use crate::models::{Item, ItemId, WorkItemType};
use crate::queries::ItemList;

const DEFAULT_PR_STATUS: &str = "active";
const DEFAULT_PR_TOP: u32 = 20;

/// Error response: `{ "error": message }` with a status derived from the error.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            Error::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `Query` whose rejections are reported as `{ "error": ... }` with status 400.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

/// `Json` body whose rejections are reported as `{ "error": ... }` with status 400.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError(Error::InvalidFilter(format!(
        "invalid query string: {}",
        rejection.body_text()
    )))
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError(Error::InvalidFilter(format!(
        "invalid request body: {}",
        rejection.body_text()
    )))
}

fn parse_id(raw: &str) -> Result<ItemId, ApiError> {
    Ok(raw.parse::<ItemId>()?)
}

#[derive(Debug, Deserialize)]
pub struct TeamParams {
    team: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TypeParams {
    #[serde(rename = "type")]
    work_item_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IterationParams {
    #[serde(rename = "assignedTo")]
    assigned_to: Option<String>,
    #[serde(rename = "type")]
    work_item_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(rename = "type")]
    work_item_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestParams {
    status: Option<String>,
    #[serde(rename = "$top")]
    top: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WiqlRequest {
    #[serde(default)]
    query: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    ids: Vec<ItemId>,
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "configured": state.info.configured,
        "org": state.info.organization,
        "project": state.info.project,
        "version": env!("CARGO_PKG_VERSION"),
        "startedAt": state.info.started_at.to_rfc3339(),
    }))
}

// Project directory passthrough

pub async fn iterations(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<TeamParams>,
) -> ApiResult<Value> {
    let data = state
        .directory
        .iterations(params.team.as_deref(), false)
        .await
        .map_err(Error::store)?;
    Ok(Json(data))
}

pub async fn current_iteration(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<TeamParams>,
) -> ApiResult<Value> {
    let data = state
        .directory
        .iterations(params.team.as_deref(), true)
        .await
        .map_err(Error::store)?;
    Ok(Json(data))
}

pub async fn teams(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(Json(state.directory.teams().await.map_err(Error::store)?))
}

pub async fn team_members(
    State(state): State<AppState>,
    Path(team): Path<String>,
) -> ApiResult<Value> {
    let data = state
        .directory
        .team_members(&team)
        .await
        .map_err(Error::store)?;
    Ok(Json(data))
}

pub async fn pull_requests(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PullRequestParams>,
) -> ApiResult<Value> {
    let status = params.status.as_deref().unwrap_or(DEFAULT_PR_STATUS);
    let top = params.top.unwrap_or(DEFAULT_PR_TOP);
    let data = state
        .directory
        .pull_requests(status, top)
        .await
        .map_err(Error::store)?;
    Ok(Json(data))
}

pub async fn wiql(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<WiqlRequest>,
) -> ApiResult<Value> {
    if request.query.trim().is_empty() {
        return Err(Error::InvalidFilter("query must not be empty".to_string()).into());
    }
    let data = state
        .directory
        .run_wiql(&request.query)
        .await
        .map_err(Error::store)?;
    Ok(Json(data))
}

// Work items

pub async fn work_items(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<TypeParams>,
) -> ApiResult<ItemList> {
    let selector = params.work_item_type.as_deref().unwrap_or("Epic");
    let types = WorkItemType::parse_selector(selector)?;
    Ok(Json(state.queries().items_by_type(types).await?.into()))
}

pub async fn epics(State(state): State<AppState>) -> ApiResult<ItemList> {
    Ok(Json(state.queries().epics().await?.into()))
}

pub async fn work_item(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Item> {
    let id = parse_id(&id)?;
    Ok(Json(state.queries().item(id).await?))
}

pub async fn children(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ItemList> {
    let id = parse_id(&id)?;
    Ok(Json(state.queries().children(id).await?.into()))
}

pub async fn batch(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BatchRequest>,
) -> ApiResult<ItemList> {
    Ok(Json(state.queries().batch(&request.ids).await?.into()))
}

pub async fn search(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> ApiResult<ItemList> {
    let work_item_type = WorkItemType::parse_filter(params.work_item_type.as_deref())?;
    Ok(Json(state.queries().search(&params.q, work_item_type).await?.into()))
}

// Iterations

pub async fn iteration_items(
    State(state): State<AppState>,
    Path(iteration): Path<String>,
    ApiQuery(params): ApiQuery<IterationParams>,
) -> ApiResult<ItemList> {
    let work_item_type = WorkItemType::parse_filter(params.work_item_type.as_deref())?;
    let items = state
        .queries()
        .iteration_items(&iteration, params.assigned_to.as_deref(), work_item_type)
        .await?;
    Ok(Json(items.into()))
}

pub async fn iteration_tree(
    State(state): State<AppState>,
    Path(iteration): Path<String>,
    ApiQuery(params): ApiQuery<IterationParams>,
) -> ApiResult<TreeView> {
    let closure = state
        .queries()
        .iteration_tree(&iteration, params.assigned_to.as_deref())
        .await?;
    Ok(Json(closure.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(Error::InvalidFilter("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError(Error::NotFound(ItemId(3))).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError(Error::NotConfigured("organization".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError(Error::store(StoreError::Unauthorized)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
