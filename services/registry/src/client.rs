//! Client for the registry HTTP API (`/v2/...`).

use std::sync::Arc;

use api_client::{ApiClient, BasicAuth, RequestBuilder, Response};
use futures::{Stream, TryStreamExt as _};
use http::Method;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::manifest::{DOCKER_CONTENT_DIGEST, MANIFEST_ACCEPT, Manifest};
use crate::pagination::{self, Page};

type Request = RequestBuilder<Option<BasicAuth>>;

/// Catalog response body
#[derive(Debug, Deserialize)]
struct Catalog {
    repositories: Option<Vec<String>>,
}

/// Tag list response body
#[derive(Debug, Deserialize)]
struct TagList {
    tags: Option<Vec<String>>,
}

/// A client for one registry.
///
/// Cheap to clone; clones share the connection pool and configuration.
/// Every operation makes a single request (deletion makes two, in sequence)
/// and never retries.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    inner: ApiClient<Option<BasicAuth>>,
    config: Arc<RegistryConfig>,
    cancel: Option<CancellationToken>,
}

impl RegistryClient {
    /// Create a client for the configured registry.
    ///
    /// Fails if the configured URL cannot be used as a base URL.
    pub fn new(config: RegistryConfig) -> RegistryResult<Self> {
        let base = config.base_url()?;
        let inner = ApiClient::new(base, config.credentials());
        Ok(Self::from_parts(inner, config))
    }

    /// Create a client from `REGISTRY_URL`, `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`.
    pub fn from_env() -> RegistryResult<Self> {
        Self::new(RegistryConfig::from_env())
    }

    /// Create a client which sends requests through `inner` instead of the network.
    pub fn new_with_inner_service<S>(config: RegistryConfig, inner: S) -> RegistryResult<Self>
    where
        S: tower::Service<
                http::Request<hyperdriver::Body>,
                Response = http::Response<hyperdriver::Body>,
                Error = hyperdriver::client::Error,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let base = config.base_url()?;
        let inner = ApiClient::new_with_inner_service(base, config.credentials(), inner);
        Ok(Self::from_parts(inner, config))
    }

    fn from_parts(inner: ApiClient<Option<BasicAuth>>, config: RegistryConfig) -> Self {
        let inner = match config.timeout {
            Some(timeout) => inner.with_timeout(timeout),
            None => inner,
        };

        Self {
            inner,
            config: Arc::new(config),
            cancel: None,
        }
    }

    /// A copy of this client whose requests are abandoned when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: Some(token),
            ..self.clone()
        }
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// A short `host[:port]` label for the registry.
    pub fn endpoint_label(&self) -> String {
        self.config.endpoint_label()
    }

    fn request(&self, method: Method, path: &str) -> Request {
        let request = self.inner.request(method, path);
        match &self.cancel {
            Some(token) => request.cancel_on(token.clone()),
            None => request,
        }
    }

    async fn send(&self, request: Request, context: &str) -> RegistryResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|error| RegistryError::from_client(error, context))?;
        response
            .error_for_status(context)
            .await
            .map_err(|error| RegistryError::from_client(error, context))
    }

    /// Fetch one page of the repository catalog.
    #[tracing::instrument(skip(self))]
    pub async fn list_catalog_page(
        &self,
        last: Option<&str>,
        n: Option<i64>,
    ) -> RegistryResult<Page<String>> {
        const CONTEXT: &str = "Failed to fetch catalog";

        let path = pagination::with_query("/v2/_catalog", last, n);
        let response = self.send(self.request(Method::GET, &path), CONTEXT).await?;

        let next = pagination::next_token(response.headers());
        let catalog: Catalog = response
            .json()
            .await
            .map_err(|error| RegistryError::from_client(error, CONTEXT))?;

        Ok(Page {
            items: catalog.repositories.unwrap_or_default(),
            next,
        })
    }

    /// The repositories on the first catalog page.
    pub async fn list_repositories(&self) -> RegistryResult<Vec<String>> {
        Ok(self.list_catalog_page(None, None).await?.items)
    }

    /// Every repository in the catalog, following continuation tokens.
    pub fn repositories(
        &self,
        page_size: Option<i64>,
    ) -> impl Stream<Item = RegistryResult<String>> + Send + use<> {
        let client = self.clone();
        walk(move |last| {
            let client = client.clone();
            async move { client.list_catalog_page(last.as_deref(), page_size).await }
        })
    }

    /// Fetch one page of tags for a repository.
    #[tracing::instrument(skip(self))]
    pub async fn list_tags_page(
        &self,
        name: &str,
        last: Option<&str>,
        n: Option<i64>,
    ) -> RegistryResult<Page<String>> {
        let name = require(name, "name")?;
        let context = format!("Failed to fetch tags for {name}");

        let path = pagination::with_query(&format!("/v2/{name}/tags/list"), last, n);
        let response = self.send(self.request(Method::GET, &path), &context).await?;

        let next = pagination::next_token(response.headers());
        let list: TagList = response
            .json()
            .await
            .map_err(|error| RegistryError::from_client(error, &context))?;

        Ok(Page {
            items: list.tags.unwrap_or_default(),
            next,
        })
    }

    /// The tags on the first page for a repository.
    pub async fn list_tags(&self, name: &str) -> RegistryResult<Vec<String>> {
        Ok(self.list_tags_page(name, None, None).await?.items)
    }

    /// Every tag of a repository, following continuation tokens.
    pub fn tags(
        &self,
        name: &str,
        page_size: Option<i64>,
    ) -> impl Stream<Item = RegistryResult<String>> + Send + use<> {
        let client = self.clone();
        let name = name.to_owned();
        walk(move |last| {
            let client = client.clone();
            let name = name.clone();
            async move {
                client
                    .list_tags_page(&name, last.as_deref(), page_size)
                    .await
            }
        })
    }

    /// Fetch a manifest by tag or digest.
    ///
    /// The digest is `None` when the registry does not send `Docker-Content-Digest`.
    #[tracing::instrument(skip(self))]
    pub async fn get_manifest(&self, name: &str, reference: &str) -> RegistryResult<Manifest> {
        let name = require(name, "name")?;
        let reference = require(reference, "ref")?;
        let context = format!("Failed to fetch manifest for {name}:{reference}");

        let request = self
            .request(Method::GET, &format!("/v2/{name}/manifests/{reference}"))
            .header(http::header::ACCEPT, MANIFEST_ACCEPT);
        let response = self.send(request, &context).await?;

        let digest = response.header(DOCKER_CONTENT_DIGEST).map(str::to_owned);
        let content_type = response
            .header(http::header::CONTENT_TYPE)
            .map(str::to_owned);
        let document: Map<String, Value> = response
            .json()
            .await
            .map_err(|error| RegistryError::from_client(error, &context))?;

        Ok(Manifest::new(digest, content_type, document))
    }

    /// Look up the digest a tag currently points to, without fetching the manifest.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_digest(&self, name: &str, reference: &str) -> RegistryResult<String> {
        let name = require(name, "name")?;
        let reference = require(reference, "ref")?;
        let context = format!("Failed to get digest for {name}:{reference}");

        let request = self
            .request(Method::HEAD, &format!("/v2/{name}/manifests/{reference}"))
            .header(http::header::ACCEPT, MANIFEST_ACCEPT);
        let response = self.send(request, &context).await?;

        response
            .header(DOCKER_CONTENT_DIGEST)
            .filter(|digest| !digest.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| RegistryError::MissingDigest {
                name: name.to_owned(),
                reference: reference.to_owned(),
            })
    }

    /// Resolve several references concurrently.
    ///
    /// Returns one outcome per reference, in order. A failure does not stop
    /// the other lookups.
    #[tracing::instrument(skip(self, references))]
    pub async fn resolve_digests<I, S>(
        &self,
        name: &str,
        references: I,
    ) -> Vec<RegistryResult<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let references: Vec<S> = references.into_iter().collect();
        futures::future::join_all(
            references
                .iter()
                .map(|reference| self.resolve_digest(name, reference.as_ref())),
        )
        .await
    }

    /// Delete the manifest a tag points to.
    ///
    /// Resolves the tag to a digest, then deletes by digest. Nothing is deleted
    /// when resolution fails. Returns the deleted digest.
    #[tracing::instrument(skip(self))]
    pub async fn delete_tag(&self, name: &str, tag: &str) -> RegistryResult<String> {
        let name = require(name, "name")?;
        let tag = require(tag, "tag")?;

        let digest = self.resolve_digest(name, tag).await?;
        let context = format!("Failed to delete manifest {digest}");

        let request = self.request(Method::DELETE, &format!("/v2/{name}/manifests/{digest}"));
        self.send(request, &context).await?;

        tracing::info!(%name, %tag, %digest, "deleted manifest");
        Ok(digest)
    }
}

fn require<'a>(value: &'a str, field: &'static str) -> RegistryResult<&'a str> {
    if value.trim().is_empty() {
        Err(RegistryError::InvalidInput { field })
    } else {
        Ok(value)
    }
}

/// Stream the items of every page, starting from the first.
///
/// Stops when a page has no continuation token, or repeats the previous one.
fn walk<F, Fut>(fetch: F) -> impl Stream<Item = RegistryResult<String>> + Send
where
    F: Fn(Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = RegistryResult<Page<String>>> + Send,
{
    futures::stream::try_unfold(
        (fetch, Some(None::<String>)),
        |(fetch, cursor)| async move {
            let Some(last) = cursor else {
                return Ok::<_, RegistryError>(None);
            };

            let page = fetch(last.clone()).await?;
            let next = page.next.filter(|next| Some(next) != last.as_ref());
            let items = futures::stream::iter(page.items.into_iter().map(Ok::<_, RegistryError>));

            Ok(Some((items, (fetch, next.map(Some)))))
        },
    )
    .try_flatten()
}
