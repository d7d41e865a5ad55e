//! Integration tests for the registry client and dashboard API

use std::time::Duration;

use api_client::mock::{MockResponse, MockService};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use futures::TryStreamExt as _;
use http_body_util::BodyExt as _;
use registry::manifest::{DOCKER_CONTENT_DIGEST, DOCKER_MANIFEST_V2, MANIFEST_ACCEPT, OCI_IMAGE_INDEX};
use registry::{ErrorKind, ManifestKind, RegistryClient, RegistryConfig};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Helper to create a client backed by a mock registry
fn test_client(config: RegistryConfig) -> (RegistryClient, MockService) {
    let mock = MockService::new();
    let client = RegistryClient::new_with_inner_service(config, mock.clone()).unwrap();
    (client, mock)
}

fn anonymous() -> RegistryConfig {
    RegistryConfig::new("http://registry.test")
}

fn digest_response(digest: &str) -> MockResponse {
    MockResponse::new(StatusCode::OK)
        .with_header(header::CONTENT_TYPE, DOCKER_MANIFEST_V2)
        .with_header(DOCKER_CONTENT_DIGEST, digest)
}

#[tokio::test]
async fn test_catalog_page_with_next_link() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/_catalog",
        MockResponse::new(StatusCode::OK)
            .with_header(header::LINK, r#"</v2/_catalog?last=b&n=2>; rel="next""#)
            .with_json(&json!({"repositories": ["a", "b"]})),
    );

    let page = client.list_catalog_page(None, Some(2)).await.unwrap();
    assert_eq!(page.items, ["a", "b"]);
    assert_eq!(page.next.as_deref(), Some("b"));

    let request = mock.last_request().unwrap();
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.uri.path(), "/v2/_catalog");
    assert_eq!(request.uri.query(), Some("n=2"));
}

#[tokio::test]
async fn test_catalog_without_query_or_link() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/_catalog",
        MockResponse::new(StatusCode::OK).with_json(&json!({"repositories": null})),
    );

    let page = client.list_catalog_page(None, Some(-5)).await.unwrap();
    assert!(page.items.is_empty());
    assert!(!page.has_next());
    assert_eq!(mock.last_request().unwrap().uri.query(), None);
}

#[tokio::test]
async fn test_mount_path_is_preserved() {
    for url in ["http://registry.test/mount", "http://registry.test/mount/"] {
        let (client, mock) = test_client(RegistryConfig::new(url));
        mock.add(
            Method::GET,
            "/mount/v2/_catalog",
            MockResponse::new(StatusCode::OK).with_json(&json!({"repositories": ["app"]})),
        );

        assert_eq!(client.list_repositories().await.unwrap(), ["app"], "{url}");
        assert_eq!(
            mock.last_request().unwrap().uri.to_string(),
            "http://registry.test/mount/v2/_catalog"
        );
    }
}

#[tokio::test]
async fn test_basic_auth_when_configured() {
    let (client, mock) = test_client(anonymous().with_credentials("admin", "hunter2"));
    mock.add(
        Method::GET,
        "/v2/_catalog",
        MockResponse::new(StatusCode::OK).with_json(&json!({"repositories": []})),
    );

    client.list_repositories().await.unwrap();
    let request = mock.last_request().unwrap();
    assert_eq!(
        request.headers[header::AUTHORIZATION],
        "Basic YWRtaW46aHVudGVyMg=="
    );

    let (client, mock) = test_client(RegistryConfig {
        username: Some("admin".into()),
        ..anonymous()
    });
    mock.add(
        Method::GET,
        "/v2/_catalog",
        MockResponse::new(StatusCode::OK).with_json(&json!({"repositories": []})),
    );

    client.list_repositories().await.unwrap();
    let request = mock.last_request().unwrap();
    assert!(!request.headers.contains_key(header::AUTHORIZATION));
}

#[tokio::test]
async fn test_repositories_stream_follows_pages() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/_catalog?n=2",
        MockResponse::new(StatusCode::OK)
            .with_header(header::LINK, r#"</v2/_catalog?last=b&n=2>; rel="next""#)
            .with_json(&json!({"repositories": ["a", "b"]})),
    );
    mock.add(
        Method::GET,
        "/v2/_catalog?last=b&n=2",
        MockResponse::new(StatusCode::OK)
            .with_header(header::LINK, r#"</v2/_catalog?n=2&last=d>; rel="next""#)
            .with_json(&json!({"repositories": ["c", "d"]})),
    );
    mock.add(
        Method::GET,
        "/v2/_catalog?last=d&n=2",
        MockResponse::new(StatusCode::OK).with_json(&json!({"repositories": ["e"]})),
    );

    let repositories: Vec<String> = client.repositories(Some(2)).try_collect().await.unwrap();
    assert_eq!(repositories, ["a", "b", "c", "d", "e"]);
    assert_eq!(mock.count(&Method::GET, "/v2/_catalog"), 3);
}

#[tokio::test]
async fn test_tags_stream_stops_on_error() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/app/tags/list",
        MockResponse::new(StatusCode::OK)
            .with_header(header::LINK, r#"</v2/app/tags/list?last=v1>; rel="next""#)
            .with_json(&json!({"name": "app", "tags": ["v1"]})),
    );
    mock.add(
        Method::GET,
        "/v2/app/tags/list?last=v1",
        MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR).with_body("boom"),
    );

    let error = client
        .tags("app", None)
        .try_collect::<Vec<_>>()
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Status);
    assert_eq!(
        error.to_string(),
        "Failed to fetch tags for app (status 500 Internal Server Error) - boom"
    );
}

#[tokio::test]
async fn test_tags_not_found() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/missing/tags/list",
        MockResponse::new(StatusCode::NOT_FOUND).with_json(&json!({
            "errors": [{"code": "NAME_UNKNOWN", "message": "repository name not known to registry"}]
        })),
    );

    let error = client.list_tags("missing").await.unwrap_err();
    assert!(error.is_not_found());
    let message = error.to_string();
    assert!(message.contains("404"), "{message}");
    assert!(message.contains(r#"{"errors":[{"code":"NAME_UNKNOWN""#), "{message}");
}

#[tokio::test]
async fn test_null_tags_are_empty() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/library/alpine/tags/list",
        MockResponse::new(StatusCode::OK).with_json(&json!({"name": "library/alpine", "tags": null})),
    );

    let page = client
        .list_tags_page("library/alpine", None, None)
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.next, None);
}

#[tokio::test]
async fn test_get_manifest_merges_headers() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/app/manifests/latest",
        MockResponse::new(StatusCode::OK)
            .with_json(&json!({
                "schemaVersion": 2,
                "mediaType": OCI_IMAGE_INDEX,
                "manifests": [
                    {"digest": "sha256:amd", "size": 500, "platform": {"os": "linux", "architecture": "amd64"}}
                ]
            }))
            .with_header(DOCKER_CONTENT_DIGEST, "sha256:idx"),
    );

    let manifest = client.get_manifest("app", "latest").await.unwrap();
    assert_eq!(manifest.digest.as_deref(), Some("sha256:idx"));
    assert_eq!(manifest.content_type.as_deref(), Some("application/json"));
    assert_eq!(manifest.kind(), ManifestKind::Index);
    assert_eq!(manifest.total_size(), Some(500));

    let serialized = serde_json::to_value(&manifest).unwrap();
    assert_eq!(serialized["digest"], "sha256:idx");
    assert_eq!(serialized["schemaVersion"], 2);
    assert_eq!(serialized["manifests"][0]["platform"]["architecture"], "amd64");

    let request = mock.last_request().unwrap();
    assert_eq!(request.headers[header::ACCEPT], MANIFEST_ACCEPT);
}

#[tokio::test]
async fn test_get_manifest_without_digest_header() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/app/manifests/v1",
        MockResponse::new(StatusCode::OK).with_json(&json!({"schemaVersion": 2, "layers": []})),
    );

    let manifest = client.get_manifest("app", "v1").await.unwrap();
    assert_eq!(manifest.digest, None);
    assert_eq!(manifest.total_size(), Some(0));
}

#[tokio::test]
async fn test_get_manifest_with_invalid_body() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/app/manifests/v1",
        MockResponse::new(StatusCode::OK).with_body("not json"),
    );

    let error = client.get_manifest("app", "v1").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Body);
}

#[tokio::test]
async fn test_resolve_digest_requires_header() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::HEAD,
        "/v2/app/manifests/latest",
        MockResponse::new(StatusCode::OK),
    );

    let error = client.resolve_digest("app", "latest").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MissingDigest);
    assert_eq!(error.to_string(), "No digest found for app:latest");

    let request = mock.last_request().unwrap();
    assert_eq!(request.method, Method::HEAD);
    assert_eq!(request.headers[header::ACCEPT], MANIFEST_ACCEPT);
}

#[tokio::test]
async fn test_delete_tag_deletes_by_digest() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::HEAD,
        "/v2/myapp/manifests/latest",
        digest_response("sha256:abc"),
    );
    mock.add(
        Method::DELETE,
        "/v2/myapp/manifests/sha256:abc",
        MockResponse::new(StatusCode::ACCEPTED),
    );

    let digest = client.delete_tag("myapp", "latest").await.unwrap();
    assert_eq!(digest, "sha256:abc");

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::HEAD);
    assert_eq!(requests[1].method, Method::DELETE);
    assert_eq!(requests[1].uri.path(), "/v2/myapp/manifests/sha256:abc");
}

#[tokio::test]
async fn test_delete_tag_without_digest_issues_no_delete() {
    let (client, mock) = test_client(anonymous());

    let error = client.delete_tag("myapp", "gone").await.unwrap_err();
    assert!(error.is_not_found());
    assert!(
        error
            .to_string()
            .starts_with("Failed to get digest for myapp:gone (status 404 Not Found)")
    );
    assert!(mock.requests().iter().all(|r| r.method != Method::DELETE));

    mock.add(
        Method::HEAD,
        "/v2/myapp/manifests/nodigest",
        MockResponse::new(StatusCode::OK),
    );
    let error = client.delete_tag("myapp", "nodigest").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MissingDigest);
    assert!(mock.requests().iter().all(|r| r.method != Method::DELETE));
}

#[tokio::test]
async fn test_delete_failure_names_the_digest() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::HEAD,
        "/v2/myapp/manifests/latest",
        digest_response("sha256:abc"),
    );
    mock.add(
        Method::DELETE,
        "/v2/myapp/manifests/sha256:abc",
        MockResponse::new(StatusCode::METHOD_NOT_ALLOWED).with_json(&json!({
            "errors": [{"code": "UNSUPPORTED", "message": "The operation is unsupported."}]
        })),
    );

    let error = client.delete_tag("myapp", "latest").await.unwrap_err();
    assert_eq!(error.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
    assert!(
        error
            .to_string()
            .starts_with("Failed to delete manifest sha256:abc (status 405 Method Not Allowed) - ")
    );
}

#[tokio::test]
async fn test_blank_input_makes_no_request() {
    let (client, mock) = test_client(anonymous());

    let error = client.delete_tag("myapp", " ").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidInput);
    assert_eq!(error.to_string(), "Invalid tag");

    let error = client.get_manifest("", "latest").await.unwrap_err();
    assert_eq!(error.to_string(), "Invalid name");

    let error = client.resolve_digest("app", "").await.unwrap_err();
    assert_eq!(error.to_string(), "Invalid ref");

    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_resolve_digests_is_all_settled() {
    let (client, mock) = test_client(anonymous());
    let references: Vec<String> = (0..10).map(|i| format!("v{i}")).collect();
    for (i, reference) in references.iter().enumerate() {
        if i % 3 != 0 || i == 0 {
            mock.add(
                Method::HEAD,
                &format!("/v2/app/manifests/{reference}"),
                digest_response(&format!("sha256:{i}")),
            );
        }
    }

    let outcomes = client.resolve_digests("app", &references).await;
    assert_eq!(outcomes.len(), 10);
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 7);
    assert_eq!(outcomes.iter().filter(|o| o.is_err()).count(), 3);

    assert_eq!(outcomes[1].as_ref().unwrap(), "sha256:1");
    assert!(outcomes[3].as_ref().unwrap_err().is_not_found());
    assert_eq!(mock.requests().len(), 10);
}

#[tokio::test]
async fn test_cancelled_request() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/_catalog",
        MockResponse::new(StatusCode::OK)
            .with_json(&json!({"repositories": []}))
            .with_delay(Duration::from_secs(30)),
    );

    let token = CancellationToken::new();
    let client = client.with_cancellation(token.clone());
    let pending = tokio::spawn(async move { client.list_repositories().await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let error = pending.await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Cancelled);
    assert_eq!(error.to_string(), "Failed to fetch catalog: request cancelled");
}

#[tokio::test]
async fn test_timed_out_request() {
    let (client, mock) = test_client(anonymous().with_timeout(Duration::from_millis(20)));
    mock.add(
        Method::HEAD,
        "/v2/app/manifests/latest",
        digest_response("sha256:abc").with_delay(Duration::from_secs(30)),
    );

    let error = client.resolve_digest("app", "latest").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TimedOut);
}

#[tokio::test]
async fn test_cancel_while_reading_manifest_body() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/app/manifests/latest",
        MockResponse::new(StatusCode::OK)
            .with_header(DOCKER_CONTENT_DIGEST, "sha256:abc")
            .with_stalled_body(),
    );

    let token = CancellationToken::new();
    let client = client.with_cancellation(token.clone());
    let pending = tokio::spawn(async move { client.get_manifest("app", "latest").await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let error = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("cancellation ends the request")
        .unwrap()
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Cancelled);
    assert_eq!(
        error.to_string(),
        "Failed to fetch manifest for app:latest: request cancelled"
    );
}

#[tokio::test]
async fn test_timeout_while_reading_tags_body() {
    let (client, mock) = test_client(anonymous().with_timeout(Duration::from_millis(20)));
    mock.add(
        Method::GET,
        "/v2/app/tags/list",
        MockResponse::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, "application/json")
            .with_stalled_body(),
    );

    let error = tokio::time::timeout(Duration::from_secs(5), client.list_tags("app"))
        .await
        .expect("the deadline ends the request")
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TimedOut);
}

#[tokio::test]
async fn test_timeout_while_reading_error_body() {
    let (client, mock) = test_client(anonymous().with_timeout(Duration::from_millis(20)));
    mock.add(
        Method::GET,
        "/v2/_catalog",
        MockResponse::new(StatusCode::UNAUTHORIZED)
            .with_header(header::CONTENT_TYPE, "application/json")
            .with_stalled_body(),
    );

    let error = tokio::time::timeout(Duration::from_secs(5), client.list_repositories())
        .await
        .expect("the deadline ends the request")
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TimedOut);
    assert_eq!(error.status(), None);
}

async fn call(app: axum::Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_api_meta() {
    let (client, _mock) = test_client(RegistryConfig::new("http://registry.test:5000/mount"));
    let app = registry::api::router(client);

    let (status, body) = call(app, Method::GET, "/api/meta").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"endpoint": "registry.test:5000"}));
}

#[tokio::test]
async fn test_api_repositories_default_page_size() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/_catalog",
        MockResponse::new(StatusCode::OK)
            .with_header(header::LINK, r#"</v2/_catalog?last=app&n=50>; rel="next""#)
            .with_json(&json!({"repositories": ["app"]})),
    );
    let app = registry::api::router(client);

    let (status, body) = call(app.clone(), Method::GET, "/api/repos").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"repositories": ["app"], "next": "app"}));
    assert_eq!(mock.last_request().unwrap().uri.query(), Some("n=50"));

    call(app, Method::GET, "/api/repos?last=app&n=10").await;
    assert_eq!(mock.last_request().unwrap().uri.query(), Some("last=app&n=10"));
}

#[tokio::test]
async fn test_api_tags_and_errors() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/app/tags/list",
        MockResponse::new(StatusCode::OK).with_json(&json!({"name": "app", "tags": ["v1", "v2"]})),
    );
    let app = registry::api::router(client);

    let (status, body) = call(app.clone(), Method::GET, "/api/repos/app/tags").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "app", "tags": ["v1", "v2"], "next": null}));

    let (status, body) = call(app, Method::GET, "/api/repos/missing/tags").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({"error": "Failed to fetch tags for missing (status 404 Not Found)"})
    );
}

#[tokio::test]
async fn test_api_manifest_digest_and_delete() {
    let (client, mock) = test_client(anonymous());
    mock.add(
        Method::GET,
        "/v2/app/manifests/latest",
        MockResponse::new(StatusCode::OK)
            .with_json(&json!({"schemaVersion": 2, "mediaType": DOCKER_MANIFEST_V2, "layers": []}))
            .with_header(DOCKER_CONTENT_DIGEST, "sha256:abc"),
    );
    mock.add(
        Method::HEAD,
        "/v2/app/manifests/latest",
        digest_response("sha256:abc"),
    );
    mock.add(
        Method::DELETE,
        "/v2/app/manifests/sha256:abc",
        MockResponse::new(StatusCode::ACCEPTED),
    );
    mock.add(
        Method::HEAD,
        "/v2/app/manifests/nodigest",
        MockResponse::new(StatusCode::OK),
    );
    let app = registry::api::router(client);

    let (status, body) = call(app.clone(), Method::GET, "/api/repos/app/manifests/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["digest"], "sha256:abc");
    assert_eq!(body["mediaType"], DOCKER_MANIFEST_V2);

    let (status, body) = call(app.clone(), Method::GET, "/api/repos/app/digests/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"digest": "sha256:abc"}));

    let (status, body) = call(app.clone(), Method::GET, "/api/repos/app/digests/nodigest").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({"error": "No digest found for app:nodigest"}));

    let (status, body) = call(app, Method::DELETE, "/api/repos/app/tags/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
    assert_eq!(mock.count(&Method::DELETE, "/v2/app/manifests/sha256:abc"), 1);
}
