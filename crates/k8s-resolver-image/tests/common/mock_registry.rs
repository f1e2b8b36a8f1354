//! In-process registry built on wiremock
//!
//! Speaks just enough of the distribution API for a monolithic push:
//! blob HEAD, upload start, upload PUT and manifest PUT.

use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

pub const TEST_TOKEN: &str = "t0k3n";

/// Registry host ("127.0.0.1:port") of the mock server
pub fn registry_host(server: &MockServer) -> String {
    server.address().to_string()
}

fn authorized(mock: MockBuilder, bearer: bool) -> MockBuilder {
    if bearer {
        mock.and(header("authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
    } else {
        mock
    }
}

/// Accept a push of `repository`; with `bearer`, every call needs the test token
pub async fn mock_push(server: &MockServer, repository: &str, tag: &str, digest: &str, bearer: bool) {
    authorized(
        Mock::given(method("HEAD")).and(path_regex(format!(r"^/v2/{}/blobs/sha256:[0-9a-f]+$", repository))),
        bearer,
    )
    .respond_with(ResponseTemplate::new(404))
    .mount(server)
    .await;

    authorized(
        Mock::given(method("POST")).and(path(format!("/v2/{}/blobs/uploads/", repository))),
        bearer,
    )
    .respond_with(
        ResponseTemplate::new(202)
            .insert_header("location", format!("/v2/{}/blobs/uploads/upload-1", repository).as_str()),
    )
    .mount(server)
    .await;

    authorized(
        Mock::given(method("PUT")).and(path(format!("/v2/{}/blobs/uploads/upload-1", repository))),
        bearer,
    )
    .respond_with(ResponseTemplate::new(201))
    .mount(server)
    .await;

    authorized(
        Mock::given(method("PUT")).and(path(format!("/v2/{}/manifests/{}", repository, tag))),
        bearer,
    )
    .respond_with(ResponseTemplate::new(201).insert_header("docker-content-digest", digest))
    .mount(server)
    .await;
}

/// Registry that needs no authentication
pub async fn mock_open_ping(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Registry that answers the ping with a Bearer challenge served by itself
pub async fn mock_bearer_ping(server: &MockServer, scope: &str) {
    let challenge = format!(
        r#"Bearer realm="{}/token",service="mock-registry""#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/v2/"))
        .respond_with(ResponseTemplate::new(401).insert_header("www-authenticate", challenge.as_str()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("service", "mock-registry"))
        .and(query_param("scope", scope))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": TEST_TOKEN })))
        .mount(server)
        .await;
}

/// Tag lookup answering with `digest`
pub async fn mock_manifest_head(server: &MockServer, repository: &str, tag: &str, digest: &str) {
    Mock::given(method("HEAD"))
        .and(path(format!("/v2/{}/manifests/{}", repository, tag)))
        .respond_with(ResponseTemplate::new(200).insert_header("docker-content-digest", digest))
        .mount(server)
        .await;
}
