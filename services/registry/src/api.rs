//! JSON API for a dashboard front end, proxying the registry.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::{delete, get};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::RegistryClient;
use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::RegistryResult;
use crate::manifest::Manifest;

/// Build the dashboard API router around a registry client.
///
/// Returns a Router that can be served with any tower-compatible server
pub fn router(client: RegistryClient) -> Router {
    Router::new()
        .route("/api/meta", get(meta))
        .route("/api/repos", get(list_repositories))
        .route("/api/repos/{name}/tags", get(list_tags))
        .route("/api/repos/{name}/tags/{tag}", delete(delete_tag))
        .route("/api/repos/{name}/manifests/{reference}", get(get_manifest))
        .route("/api/repos/{name}/digests/{reference}", get(get_digest))
        .with_state(client)
}

/// Continuation parameters for listing endpoints
#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    last: Option<String>,
    n: Option<i64>,
}

#[derive(Debug, Serialize)]
struct RepositoryList {
    repositories: Vec<String>,
    next: Option<String>,
}

#[derive(Debug, Serialize)]
struct TagList {
    name: String,
    tags: Vec<String>,
    next: Option<String>,
}

async fn meta(State(client): State<RegistryClient>) -> Json<Value> {
    Json(json!({ "endpoint": client.endpoint_label() }))
}

async fn list_repositories(
    State(client): State<RegistryClient>,
    Query(query): Query<PageQuery>,
) -> RegistryResult<Json<RepositoryList>> {
    let n = query.n.or(Some(DEFAULT_PAGE_SIZE));
    let page = client.list_catalog_page(query.last.as_deref(), n).await?;

    Ok(Json(RepositoryList {
        repositories: page.items,
        next: page.next,
    }))
}

async fn list_tags(
    State(client): State<RegistryClient>,
    Path(name): Path<String>,
    Query(query): Query<PageQuery>,
) -> RegistryResult<Json<TagList>> {
    let page = client
        .list_tags_page(&name, query.last.as_deref(), query.n)
        .await?;

    Ok(Json(TagList {
        name,
        tags: page.items,
        next: page.next,
    }))
}

async fn get_manifest(
    State(client): State<RegistryClient>,
    Path((name, reference)): Path<(String, String)>,
) -> RegistryResult<Json<Manifest>> {
    Ok(Json(client.get_manifest(&name, &reference).await?))
}

async fn get_digest(
    State(client): State<RegistryClient>,
    Path((name, reference)): Path<(String, String)>,
) -> RegistryResult<Json<Value>> {
    let digest = client.resolve_digest(&name, &reference).await?;
    Ok(Json(json!({ "digest": digest })))
}

async fn delete_tag(
    State(client): State<RegistryClient>,
    Path((name, tag)): Path<(String, String)>,
) -> RegistryResult<Json<Value>> {
    client.delete_tag(&name, &tag).await?;
    Ok(Json(json!({ "success": true })))
}
