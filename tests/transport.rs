//! Transport tests: retry bounds, rate limits and status mapping.
//!
//! Uses wiremock to mock the Snyk API.

use std::time::{Duration, Instant};

use reqwest::Method;
use serde_json::json;
use snyker::{ClientConfig, RequestSpec, SnykClient, SnykError};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A client that retries without sleeping.
fn fast_client(server: &MockServer) -> SnykClient {
    SnykClient::with_config(
        "test-token",
        ClientConfig {
            base_url: server.uri(),
            backoff_factor: 0.0,
            default_rate_limit_wait: 0.0,
            ..ClientConfig::default()
        },
    )
    .unwrap()
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

#[tokio::test]
async fn test_sends_bearer_token_and_version() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/orgs/o1"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param("version", "2024-10-15"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "o1"}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server);
    let response = client
        .send(&RequestSpec::get("rest/orgs/o1").query("version", "2024-10-15"))
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.data()["id"], "o1");
}

#[tokio::test]
async fn test_retries_until_success() {
    let server = MockServer::start().await;
    let failures = 4;

    Mock::given(method("GET"))
        .and(path("/rest/groups"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(failures)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let client = fast_client(&server);
    let response = client
        .execute(Method::GET, "rest/groups", &[], None)
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(request_count(&server).await, failures as usize + 1);
}

#[tokio::test]
async fn test_exhausts_after_max_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(json!({"errors": [{"detail": "maintenance"}]})),
        )
        .mount(&server)
        .await;

    let client = fast_client(&server);
    let err = client
        .execute(Method::GET, "rest/groups", &[], None)
        .await
        .unwrap_err();

    match err {
        SnykError::TransportExhausted {
            attempts,
            last_status,
            last_payload,
        } => {
            assert_eq!(attempts, 15);
            assert_eq!(last_status, Some(503));
            assert_eq!(
                last_payload.unwrap()["errors"][0]["detail"],
                "maintenance"
            );
        }
        other => panic!("expected TransportExhausted, got {other:?}"),
    }
    assert_eq!(request_count(&server).await, 15);
}

#[tokio::test]
async fn test_configured_attempt_budget() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = SnykClient::with_config(
        "test-token",
        ClientConfig {
            base_url: server.uri(),
            backoff_factor: 0.0,
            max_attempts: 3,
            ..ClientConfig::default()
        },
    )
    .unwrap();

    let err = client
        .execute(Method::GET, "rest/groups", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, SnykError::TransportExhausted { attempts: 3, .. }));
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let cases = [
        (401, "unauthorized"),
        (403, "forbidden"),
        (404, "not_found"),
        (400, "invalid"),
        (422, "invalid"),
        (409, "api"),
    ];

    for (status, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(json!({"errors": [{"title": "nope", "detail": "denied"}]})),
            )
            .mount(&server)
            .await;

        let client = fast_client(&server);
        let err = client
            .execute(Method::GET, "rest/orgs/o1", &[], None)
            .await
            .unwrap_err();

        let matched = match (expected, &err) {
            ("unauthorized", SnykError::Unauthorized(msg)) => msg == "denied",
            ("forbidden", SnykError::Forbidden(_)) => true,
            ("not_found", SnykError::NotFound(msg)) => msg.contains("rest/orgs/o1"),
            ("invalid", SnykError::InvalidRequest { status: s, .. }) => *s == status,
            ("api", SnykError::Api { status: s, message }) => *s == 409 && message == "denied",
            _ => false,
        };
        assert!(matched, "status {status} mapped to {err:?}");
        assert_eq!(err.status(), Some(status));
        assert_eq!(request_count(&server).await, 1, "status {status} was retried");
    }
}

#[tokio::test]
async fn test_retry_after_header_is_honored() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let client = fast_client(&server);
    let started = Instant::now();
    client
        .execute(Method::GET, "rest/groups", &[], None)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_rate_limit_without_header_uses_default_wait() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let client = SnykClient::with_config(
        "test-token",
        ClientConfig {
            base_url: server.uri(),
            backoff_factor: 0.0,
            default_rate_limit_wait: 0.3,
            ..ClientConfig::default()
        },
    )
    .unwrap();

    let started = Instant::now();
    client
        .execute(Method::GET, "rest/groups", &[], None)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_oversized_retry_after_uses_default_wait() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "99999999999999999999"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let client = fast_client(&server);
    let response = client
        .execute(Method::GET, "rest/groups", &[], None)
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_timeouts_are_retried_until_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = SnykClient::with_config(
        "test-token",
        ClientConfig {
            base_url: server.uri(),
            backoff_factor: 0.0,
            max_attempts: 3,
            request_timeout: 0.1,
            ..ClientConfig::default()
        },
    )
    .unwrap();

    let err = client
        .execute(Method::GET, "rest/groups", &[], None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SnykError::TransportExhausted {
            attempts: 3,
            last_status: None,
            last_payload: None,
        }
    ));
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_connection_failures_are_retried_until_exhausted() {
    // Bind then release a port so nothing is listening on it.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let client = SnykClient::with_config(
        "test-token",
        ClientConfig {
            base_url: format!("http://127.0.0.1:{port}"),
            backoff_factor: 0.0,
            max_attempts: 4,
            ..ClientConfig::default()
        },
    )
    .unwrap();

    let err = client
        .execute(Method::GET, "rest/groups", &[], None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SnykError::TransportExhausted {
            attempts: 4,
            last_status: None,
            ..
        }
    ));
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = fast_client(&server);
    let response = client
        .execute(Method::DELETE, "rest/orgs/o1/policies/p1", &[], None)
        .await
        .unwrap();

    assert!(response.payload.is_null());
    assert!(response.data().is_null());
}

#[tokio::test]
async fn test_non_json_success_body_is_a_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = fast_client(&server);
    let err = client
        .execute(Method::GET, "rest/groups", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, SnykError::ParseError(_)));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/closed-beta/groups/g1/assets/search"))
        .and(wiremock::matchers::body_json(json!({"query": {"type": "repository"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server);
    client
        .send(&RequestSpec::post(
            "closed-beta/groups/g1/assets/search",
            json!({"query": {"type": "repository"}}),
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_closed_client_rejects_calls() {
    let server = MockServer::start().await;
    let client = fast_client(&server);

    client.close();
    assert!(client.is_closed());

    let err = client
        .execute(Method::GET, "rest/groups", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, SnykError::ClientClosed));
    assert_eq!(request_count(&server).await, 0);
}

#[test]
fn test_empty_token_is_unauthenticated() {
    let err = SnykClient::new("  ", "https://api.snyk.io").unwrap_err();
    assert!(matches!(err, SnykError::Unauthenticated(_)));
}
