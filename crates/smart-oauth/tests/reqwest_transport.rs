//! Exercises the blocking reqwest transport against a local HTTP server.
//!
//! The blocking client must be created and dropped off the async runtime, so
//! every client interaction runs inside `spawn_blocking`.

use serde_json::json;
use smart_oauth::{
    AuthType, ClientConfiguration, HttpTransport, ReqwestTransport, SmartClient, TransportError,
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/fhir/.well-known/smart-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_endpoint": format!("{}/token", server.uri()),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "capabilities": ["launch-standalone", "client-public", "client-confidential-symmetric"],
            "grant_types_supported": ["authorization_code", "refresh_token"],
            "code_challenge_methods_supported": ["S256"]
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn config(base: &str) -> ClientConfiguration {
    ClientConfiguration::builder()
        .client_id("c1")
        .client_secret("s1")
        .redirect_uri("https://app/cb")
        .scopes(["openid"])
        .issuer(format!("{}/fhir/", base))
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_public_code_exchange_over_http() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("client_id=c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok1",
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let base = server.uri();
    let tokens = tokio::task::spawn_blocking(move || {
        let client = SmartClient::new(config(&base))?;
        client.request_access_token("abc", VERIFIER, None)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(tokens.access_token(), "tok1");
    assert_eq!(tokens.token_type(), Some("Bearer"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_confidential_refresh_over_http() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("authorization", "Basic YzE6czE="))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok2"})))
        .mount(&server)
        .await;

    let base = server.uri();
    let tokens = tokio::task::spawn_blocking(move || {
        let client = SmartClient::builder()
            .configuration(config(&base))
            .auth_type(AuthType::ConfidentialSymmetric)
            .build()?;
        client.refresh_access_token("r1", None, None)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(tokens.access_token(), "tok2");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_token_error_keeps_status_and_body() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
        )
        .mount(&server)
        .await;

    let base = server.uri();
    let err = tokio::task::spawn_blocking(move || {
        let client = SmartClient::new(config(&base))?;
        client.request_access_token("abc", VERIFIER, None)
    })
    .await
    .unwrap()
    .unwrap_err();

    assert!(err.is_auth());
    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("invalid_grant"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_success_status_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&server)
        .await;

    let url = format!("{}/missing", server.uri());
    let err = tokio::task::spawn_blocking(move || {
        let transport = ReqwestTransport::new()?;
        transport.get(&url)
    })
    .await
    .unwrap()
    .unwrap_err();

    match err {
        TransportError::Status { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "nope");
        }
        other => panic!("unexpected error: {other}"),
    }
}
