//! End-to-end tests for the session endpoint.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use session_gateway::config::{SessionMode, UnknownSessionPolicy};

mod common;

use common::{endpoint, rpc, start_gateway, start_gateway_with, test_config, API_KEY};

const SESSION: &str = "mcp-session-id";

#[tokio::test]
async fn first_post_mints_session_and_reuses_it() {
    let handle = start_gateway(test_config()).await;
    let client = reqwest::Client::new();

    let res = client.post(endpoint(&handle)).json(&rpc(1, "ping")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let session = res.headers()[SESSION].to_str().unwrap().to_string();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["id"], 1);
    assert_eq!(handle.registry().len(), 1);

    let res = client
        .post(endpoint(&handle))
        .header(SESSION, &session)
        .json(&rpc(2, "ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(SESSION).is_none());
    assert_eq!(handle.registry().len(), 1);

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn client_chosen_id_is_adopted() {
    let handle = start_gateway(test_config()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(endpoint(&handle))
        .header(SESSION, "client-picked")
        .json(&rpc(1, "ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()[SESSION], "client-picked");
    assert!(handle.registry().get(&"client-picked".parse().unwrap()).is_some());

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn notification_is_accepted() {
    let handle = start_gateway(test_config()).await;
    let res = reqwest::Client::new()
        .post(endpoint(&handle))
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn privileged_call_without_key_is_rejected_with_request_id() {
    let mut config = test_config();
    config.auth.require_api_auth = true;
    let handle = start_gateway(config).await;
    let client = reqwest::Client::new();

    let res = client
        .post(endpoint(&handle))
        .bearer_auth("wrong")
        .json(&rpc(7, "tools/call"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["error"]["code"], -32000);
    assert_eq!(body["error"]["message"], "Unauthorized: Invalid or missing API key");
    assert_eq!(body["id"], 7);
    assert!(handle.registry().is_empty());

    let res = client
        .post(endpoint(&handle))
        .json(&rpc(8, "resources/read"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(handle.registry().is_empty());

    let res = client
        .post(endpoint(&handle))
        .bearer_auth(API_KEY)
        .json(&rpc(9, "tools/call"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(handle.registry().len(), 1);

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn discovery_passes_without_credential() {
    let mut config = test_config();
    config.auth.require_api_auth = true;
    let handle = start_gateway(config).await;

    let res = reqwest::Client::new()
        .post(endpoint(&handle))
        .json(&rpc(1, "tools/list"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["result"]["tools"][0]["name"], "echo");

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn auth_not_required_lets_privileged_calls_through() {
    let handle = start_gateway(test_config()).await;
    let res = reqwest::Client::new()
        .post(endpoint(&handle))
        .json(&rpc(1, "tools/call"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let handle = start_gateway(test_config()).await;
    let res = reqwest::Client::new()
        .post(endpoint(&handle))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn terminate_unknown_and_twice() {
    let handle = start_gateway(test_config()).await;
    let client = reqwest::Client::new();

    let res = client.delete(endpoint(&handle)).header(SESSION, "nobody").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "success": true, "message": "Session not found" }));

    let res = client.post(endpoint(&handle)).json(&rpc(1, "ping")).send().await.unwrap();
    let session = res.headers()[SESSION].to_str().unwrap().to_string();
    let channel = handle.registry().get(&session.parse().unwrap()).unwrap();

    let res = client.delete(endpoint(&handle)).header(SESSION, &session).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Session terminated");
    assert!(channel.is_closed());
    assert!(handle.registry().is_empty());

    let res = client.delete(endpoint(&handle)).header(SESSION, &session).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Session not found");

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn terminate_unknown_can_be_not_found() {
    let mut config = test_config();
    config.session.unknown_session_delete = UnknownSessionPolicy::NotFound;
    let handle = start_gateway(config).await;
    let client = reqwest::Client::new();

    let res = client.delete(endpoint(&handle)).header(SESSION, "nobody").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.delete(endpoint(&handle)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn request_after_terminate_opens_new_session() {
    let handle = start_gateway(test_config()).await;
    let client = reqwest::Client::new();

    let res = client.post(endpoint(&handle)).json(&rpc(1, "ping")).send().await.unwrap();
    let session = res.headers()[SESSION].to_str().unwrap().to_string();
    client.delete(endpoint(&handle)).header(SESSION, &session).send().await.unwrap();

    let res = client
        .post(endpoint(&handle))
        .header(SESSION, &session)
        .json(&rpc(2, "ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[SESSION].to_str().unwrap(), session);
    assert_eq!(handle.registry().len(), 1);

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn stream_requires_known_session() {
    let handle = start_gateway(test_config()).await;
    let client = reqwest::Client::new();

    let res = client.get(endpoint(&handle)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client.get(endpoint(&handle)).header(SESSION, "nobody").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(handle.registry().is_empty());

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn invalid_session_header_is_bad_request() {
    let handle = start_gateway(test_config()).await;
    let res = reqwest::Client::new()
        .post(endpoint(&handle))
        .header(SESSION, "a".repeat(300))
        .json(&rpc(1, "ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(handle.registry().is_empty());

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn unsupported_verb_is_405() {
    let handle = start_gateway(test_config()).await;
    let client = reqwest::Client::new();

    let res = client.put(endpoint(&handle)).json(&rpc(1, "ping")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32000);

    let res = client
        .request(reqwest::Method::OPTIONS, endpoint(&handle))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn responses_carry_request_id() {
    let handle = start_gateway(test_config()).await;
    let res = reqwest::Client::new()
        .post(endpoint(&handle))
        .header("x-request-id", "trace-me")
        .json(&rpc(1, "ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "trace-me");

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn failed_first_request_leaves_no_session() {
    let handle = start_gateway_with(test_config(), Arc::new(common::BrokenFactory)).await;
    let res = reqwest::Client::new()
        .post(endpoint(&handle))
        .json(&rpc(1, "ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32603);
    assert!(handle.registry().is_empty());

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn stateless_mode_closes_every_channel() {
    let mut config = test_config();
    config.session.mode = SessionMode::Stateless;
    let factory = Arc::new(common::RecordingFactory::new(common::hub_factory()));
    let handle = start_gateway_with(config, factory.clone()).await;
    let client = reqwest::Client::new();

    for id in 0..3 {
        let res = client.post(endpoint(&handle)).json(&rpc(id, "ping")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get(SESSION).is_none());
    }

    let opened = factory.opened();
    assert_eq!(opened.len(), 3);
    assert!(opened.iter().all(|channel| channel.is_closed()));
    assert!(handle.registry().is_empty());

    let res = client.delete(endpoint(&handle)).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Stateless mode - no session to terminate");

    let health: Value = client
        .get(format!("http://{}/health", handle.local_addr()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({ "status": "ok", "transport": "streamable-http", "sessions": 0 }));

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn health_counts_sessions() {
    let handle = start_gateway(test_config()).await;
    let client = reqwest::Client::new();
    client.post(endpoint(&handle)).json(&rpc(1, "ping")).send().await.unwrap();
    client.post(endpoint(&handle)).json(&rpc(1, "ping")).send().await.unwrap();

    let health: Value = client
        .get(format!("http://{}/health", handle.local_addr()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["sessions"], 2);

    handle.drain_and_stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_contact_creates_one_session() {
    let handle = start_gateway(test_config()).await;
    let client = reqwest::Client::new();
    let url = endpoint(&handle);

    let requests = (0..16).map(|id| {
        let client = client.clone();
        let url = url.clone();
        tokio::spawn(async move {
            client
                .post(url)
                .header(SESSION, "shared-session")
                .json(&rpc(id, "ping"))
                .send()
                .await
                .unwrap()
        })
    });
    let responses: Vec<_> = futures_util::future::join_all(requests)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert!(responses.iter().all(|res| res.status() == StatusCode::OK));
    let minted = responses
        .iter()
        .filter(|res| res.headers().get(SESSION).is_some())
        .count();
    assert_eq!(minted, 1);
    assert_eq!(handle.registry().len(), 1);

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn late_failure_spares_recreated_session() {
    let factory = Arc::new(common::GatedFactory::new(common::hub_factory()));
    let handle = start_gateway_with(test_config(), factory.clone()).await;
    let client = reqwest::Client::new();
    let url = endpoint(&handle);

    let first = tokio::spawn({
        let client = client.clone();
        let url = url.clone();
        async move {
            client
                .post(url)
                .header(SESSION, "contested")
                .json(&rpc(1, "ping"))
                .send()
                .await
                .unwrap()
                .status()
        }
    });
    factory.entered.notified().await;

    let res = client.delete(&url).header(SESSION, "contested").send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Session terminated");

    let res = client
        .post(&url)
        .header(SESSION, "contested")
        .json(&rpc(2, "ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[SESSION], "contested");
    let current = handle.registry().get(&"contested".parse().unwrap()).unwrap();

    factory.release.notify_one();
    assert_eq!(first.await.unwrap(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(handle.registry().len(), 1);
    assert!(!current.is_closed());

    handle.drain_and_stop().await;
}

#[tokio::test]
async fn terminate_reports_close_failure() {
    let factory = Arc::new(common::UncloseableFactory::new(common::hub_factory()));
    let handle = start_gateway_with(test_config(), factory).await;
    let client = reqwest::Client::new();

    let res = client.post(endpoint(&handle)).json(&rpc(1, "ping")).send().await.unwrap();
    let session = res.headers()[SESSION].to_str().unwrap().to_string();

    let res = client.delete(endpoint(&handle)).header(SESSION, &session).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32603);
    assert!(handle.registry().is_empty());

    handle.drain_and_stop().await;
}
