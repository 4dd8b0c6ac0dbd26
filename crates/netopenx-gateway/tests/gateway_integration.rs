//! End-to-end tests for the gateway against a mock NetOpenX backend.
//!
//! Wires up: mock token endpoint → token manager → gateway client → mock
//! resource endpoints, and verifies caching, single-flight refresh, retry
//! bounds, 401 recovery and envelope normalization as observable behavior.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use httpmock::prelude::*;
use serde_json::json;

use netopenx_gateway::http::TokenManager;
use netopenx_gateway::{
    ApiError, AuthError, GatewayClient, GatewayClientConfig, GatewayConfig, RetryPolicy,
};

fn config_for(server: &MockServer) -> GatewayConfig {
    GatewayConfig {
        base_url: server.base_url(),
        branch_code: "0".to_string(),
        username: "apiuser".to_string(),
        password: "secret".to_string(),
        db_name: "NETSIS".to_string(),
        db_user: "TEMELSET".to_string(),
        db_password: "dbsecret".to_string(),
        db_type: "vtMSSQL".to_string(),
    }
}

/// Millisecond-scale retry schedule so exhaustion tests stay fast; the
/// production 2s/4s/8s schedule is covered by the retry unit tests.
fn fast_client_config() -> GatewayClientConfig {
    GatewayClientConfig {
        retry_policy: RetryPolicy::default().with_base_delay(Duration::from_millis(5)),
        timeout: Duration::from_secs(5),
    }
}

fn client_for(server: &MockServer) -> GatewayClient {
    GatewayClient::new(config_for(server), fast_client_config()).unwrap()
}

fn mock_token<'a>(server: &'a MockServer, token: &str) -> httpmock::Mock<'a> {
    let body = format!(r#"{{"access_token":"{token}","expires_in":3600}}"#);
    server.mock(move |when, then| {
        when.method(POST).path("/token");
        then.status(200)
            .header("content-type", "application/json")
            .body(body.clone());
    })
}

#[tokio::test]
async fn authenticated_get_unwraps_data_envelope() {
    let server = MockServer::start();
    let token_mock = mock_token(&server, "tok-1");
    let resource_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/ARPs")
            .header("authorization", "Bearer tok-1");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"Data":[{"CARI_KOD":"C-001"},{"CARI_KOD":"C-002"}]}"#);
    });

    let client = client_for(&server);
    let payload = client.get("ARPs").await.unwrap();

    assert_eq!(
        payload,
        json!([{"CARI_KOD": "C-001"}, {"CARI_KOD": "C-002"}])
    );
    token_mock.assert_calls(1);
    resource_mock.assert_calls(1);
}

#[tokio::test]
async fn token_is_cached_across_calls() {
    let server = MockServer::start();
    let token_mock = mock_token(&server, "tok-1");
    let resource_mock = server.mock(|when, then| {
        when.method(GET).path("/ARPs");
        then.status(200)
            .header("content-type", "application/json")
            .body("[]");
    });

    let client = client_for(&server);
    let first = client.get("ARPs").await.unwrap();
    let second = client.get("ARPs").await.unwrap();

    assert_eq!(first, second);
    resource_mock.assert_calls(2);
    // Two resource calls, one login.
    token_mock.assert_calls(1);
}

#[tokio::test]
async fn expired_token_triggers_exactly_one_refresh() {
    let server = MockServer::start();
    let token_mock = mock_token(&server, "tok-1");

    let manager = TokenManager::with_validity(
        Arc::new(config_for(&server)),
        reqwest::Client::new(),
        Duration::from_millis(80),
    );

    let before = manager.get_token().await.unwrap();
    // Within the validity window: cache hit, no new login.
    let cached = manager.get_token().await.unwrap();
    assert_eq!(before, cached);
    token_mock.assert_calls(1);

    tokio::time::sleep(Duration::from_millis(120)).await;
    manager.get_token().await.unwrap();
    token_mock.assert_calls(2);
}

#[tokio::test]
async fn concurrent_callers_share_one_login() {
    let server = MockServer::start();
    let body = r#"{"access_token":"tok-shared","expires_in":3600}"#;
    let token_mock = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200)
            .header("content-type", "application/json")
            // Hold the response long enough that every caller arrives while
            // the refresh is still in flight.
            .delay(Duration::from_millis(250))
            .body(body);
    });

    let manager = TokenManager::new(Arc::new(config_for(&server)), reqwest::Client::new());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_token().await })
        })
        .collect();

    let results = join_all(tasks).await;
    for result in results {
        assert_eq!(result.unwrap().unwrap(), "tok-shared");
    }
    token_mock.assert_calls(1);
}

#[tokio::test]
async fn concurrent_callers_share_one_failed_login() {
    let server = MockServer::start();
    let token_mock = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(400)
            .delay(Duration::from_millis(250))
            .body(r#"{"error":"invalid_grant"}"#);
    });

    let manager = TokenManager::new(Arc::new(config_for(&server)), reqwest::Client::new());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_token().await })
        })
        .collect();

    // Every caller receives the one shared outcome, failure included.
    let results = join_all(tasks).await;
    for result in results {
        let err = result.unwrap().unwrap_err();
        match err {
            AuthError::BackendRejected { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("invalid_grant"));
            }
            other => panic!("expected BackendRejected, got {other:?}"),
        }
    }
    token_mock.assert_calls(1);
}

#[tokio::test]
async fn terminal_status_is_not_retried() {
    let server = MockServer::start();
    mock_token(&server, "tok-1");
    let resource_mock = server.mock(|when, then| {
        when.method(GET).path("/ARPs/NOPE");
        then.status(404).body("no such cari");
    });

    let client = client_for(&server);
    let err = client.get("ARPs/NOPE").await.unwrap_err();

    match err {
        ApiError::BackendRejected { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such cari");
        }
        other => panic!("expected BackendRejected, got {other:?}"),
    }
    resource_mock.assert_calls(1);
}

#[tokio::test]
async fn persistent_server_errors_exhaust_the_ceiling() {
    let server = MockServer::start();
    mock_token(&server, "tok-1");
    let resource_mock = server.mock(|when, then| {
        when.method(GET).path("/ARPs");
        then.status(503).body("maintenance");
    });

    let client = client_for(&server);
    let err = client.get("ARPs").await.unwrap_err();

    match err {
        ApiError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 4);
            assert_eq!(last.status_code, Some(503));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    // Initial attempt plus three retries.
    resource_mock.assert_calls(4);
}

#[tokio::test]
async fn rejected_token_is_refreshed_once_and_the_call_retried() {
    let server = MockServer::start();

    // Prime the cache with the soon-to-be-revoked token.
    let mut stale_token_mock = mock_token(&server, "tok-stale");
    let warmup_mock = server.mock(|when, then| {
        when.method(GET).path("/warmup");
        then.status(200).body("{}");
    });

    let client = client_for(&server);
    client.get("warmup").await.unwrap();
    warmup_mock.assert_calls(1);

    // From now on the backend hands out a fresh token and rejects the old
    // one, as it would after a backend-side revocation.
    stale_token_mock.delete();
    let fresh_token_mock = mock_token(&server, "tok-fresh");
    let rejected_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/ARPs")
            .header("authorization", "Bearer tok-stale");
        then.status(401).body("token revoked");
    });
    let accepted_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/ARPs")
            .header("authorization", "Bearer tok-fresh");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"Data":[1,2]}"#);
    });

    let payload = client.get("ARPs").await.unwrap();

    assert_eq!(payload, json!([1, 2]));
    // Exactly one extra refresh and one extra transport attempt.
    rejected_mock.assert_calls(1);
    fresh_token_mock.assert_calls(1);
    accepted_mock.assert_calls(1);
}

#[tokio::test]
async fn server_error_on_the_post_refresh_resend_is_not_retried() {
    let server = MockServer::start();

    let mut stale_token_mock = mock_token(&server, "tok-stale");
    let warmup_mock = server.mock(|when, then| {
        when.method(GET).path("/warmup");
        then.status(200).body("{}");
    });

    let client = client_for(&server);
    client.get("warmup").await.unwrap();
    warmup_mock.assert_calls(1);

    stale_token_mock.delete();
    mock_token(&server, "tok-fresh");
    server.mock(|when, then| {
        when.method(GET)
            .path("/ARPs")
            .header("authorization", "Bearer tok-stale");
        then.status(401).body("token revoked");
    });
    let failing_resend_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/ARPs")
            .header("authorization", "Bearer tok-fresh");
        then.status(503).body("maintenance");
    });

    let err = client.get("ARPs").await.unwrap_err();

    // The resend is one attempt; its failure is a plain rejection, not an
    // exhausted retry ceiling.
    match err {
        ApiError::BackendRejected { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected BackendRejected, got {other:?}"),
    }
    failing_resend_mock.assert_calls(1);
}

#[tokio::test]
async fn login_transport_trouble_is_retried_then_surfaced() {
    let server = MockServer::start();
    let token_mock = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(503).body("login backend down");
    });
    let resource_mock = server.mock(|when, then| {
        when.method(GET).path("/ARPs");
        then.status(200).body("[]");
    });

    let client = client_for(&server);
    let err = client.get("ARPs").await.unwrap_err();

    match err {
        ApiError::Unauthenticated(AuthError::BackendRejected { status, .. }) => {
            assert_eq!(status, 503)
        }
        other => panic!("expected Unauthenticated, got {other:?}"),
    }
    // Token acquisition runs under the retry policy too.
    token_mock.assert_calls(4);
    // No transport call is attempted without a token.
    resource_mock.assert_calls(0);
}

#[tokio::test]
async fn rejected_login_is_terminal() {
    let server = MockServer::start();
    let token_mock = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(400).body(r#"{"error":"invalid_grant"}"#);
    });

    let client = client_for(&server);
    let err = client.get("ARPs").await.unwrap_err();

    assert!(matches!(
        err,
        ApiError::Unauthenticated(AuthError::BackendRejected { status: 400, .. })
    ));
    token_mock.assert_calls(1);
}

#[tokio::test]
async fn undecodable_success_body_is_terminal() {
    let server = MockServer::start();
    mock_token(&server, "tok-1");
    let resource_mock = server.mock(|when, then| {
        when.method(GET).path("/ARPs");
        then.status(200).body("<html>proxy error</html>");
    });

    let client = client_for(&server);
    let err = client.get("ARPs").await.unwrap_err();

    assert!(matches!(err, ApiError::MalformedResponse { .. }));
    // Contract mismatch, not transience: never retried.
    resource_mock.assert_calls(1);
}

#[tokio::test]
async fn post_sends_json_body_and_unwraps_reply() {
    let server = MockServer::start();
    mock_token(&server, "tok-1");
    let resource_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/ARPs")
            .header("content-type", "application/json")
            .body_includes(r#""CARI_KOD":"C-100""#);
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"Data":{"CARI_KOD":"C-100"}}"#);
    });

    let client = client_for(&server);
    let body = json!({"CariTemelBilgi": {"CARI_KOD": "C-100"}, "CARI_KOD": "C-100"});
    let payload = client.post("ARPs", &body).await.unwrap();

    assert_eq!(payload, json!({"CARI_KOD": "C-100"}));
    resource_mock.assert_calls(1);
}

#[tokio::test]
async fn delete_with_empty_body_yields_null() {
    let server = MockServer::start();
    mock_token(&server, "tok-1");
    let resource_mock = server.mock(|when, then| {
        when.method(DELETE).path("/ARPs/C-001");
        then.status(200);
    });

    let client = client_for(&server);
    let payload = client.delete("ARPs/C-001").await.unwrap();

    assert_eq!(payload, serde_json::Value::Null);
    resource_mock.assert_calls(1);
}

#[tokio::test]
async fn list_query_parameters_are_forwarded() {
    let server = MockServer::start();
    mock_token(&server, "tok-1");
    let resource_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/ARPs")
            .query_param("limit", "50")
            .query_param("sort", "CARI_KOD ASC");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"Data":[]}"#);
    });

    let client = client_for(&server);
    let payload = client
        .get_with_query("ARPs", &[("limit", "50"), ("sort", "CARI_KOD ASC")])
        .await
        .unwrap();

    assert_eq!(payload, json!([]));
    resource_mock.assert_calls(1);
}
