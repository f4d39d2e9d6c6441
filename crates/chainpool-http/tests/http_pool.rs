//! HTTP integration tests against mock full nodes.

use std::sync::Arc;
use std::time::Duration;

use chainpool_core::endpoint::{endpoint_id, EndpointRegistry};
use chainpool_core::policy::{CircuitBreakerConfig, CircuitState};
use chainpool_core::{
    EndpointSource, NodeClient, NodeSettings, PoolError, PooledObjectFactory, StaticSource,
};
use chainpool_http::{
    init_with_source, HttpClientConfig, HttpClientFactory, HttpNodeClient, RemoteListSource,
};
use mockito::Matcher;

const HEALTH_OK: &str = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;

async fn healthy_node(server: &mut mockito::Server) -> mockito::Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJsonString(r#"{"method":"health"}"#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(HEALTH_OK)
        .expect_at_least(1)
        .create_async()
        .await
}

fn no_retry() -> HttpClientConfig {
    HttpClientConfig {
        retry: chainpool_core::policy::RetryConfig {
            max_retries: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

// ─── Node client ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_probe_succeeds_on_empty_result() {
    let mut server = mockito::Server::new_async().await;
    let mock = healthy_node(&mut server).await;

    let client = HttpNodeClient::default_for(server.url()).unwrap();
    client.health().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn health_probe_fails_on_http_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(503)
        .with_body("node is syncing")
        .create_async()
        .await;

    let client = HttpNodeClient::connect(server.url(), "n", &no_retry()).unwrap();
    let err = client.health().await.unwrap_err();
    assert!(err.to_string().contains("503"), "unexpected error: {err}");
}

#[tokio::test]
async fn call_deserializes_domain_result() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJsonString(r#"{"method":"status"}"#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"node_info":{"network":"irishub-1"}}}"#)
        .create_async()
        .await;

    let client = HttpNodeClient::default_for(server.url()).unwrap();
    let status: serde_json::Value = client.call("status", serde_json::json!({})).await.unwrap();
    assert_eq!(status["node_info"]["network"], "irishub-1");
}

// ─── Factory ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_validation_takes_endpoint_out_of_rotation() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server.mock("POST", "/").with_status(500).create_async().await;

    let registry = Arc::new(
        EndpointRegistry::with_circuit(
            &server.url(),
            CircuitBreakerConfig {
                failure_threshold: 2,
                open_duration: Duration::from_secs(60),
                success_threshold: 1,
            },
        )
        .unwrap(),
    );
    let factory = HttpClientFactory::new(Arc::clone(&registry), no_retry(), Duration::from_secs(2));

    let client = factory.make_object().await.unwrap();
    assert!(!factory.validate_object(&client).await);
    assert!(!factory.validate_object(&client).await);

    let endpoint = registry.lookup(&endpoint_id(&server.url())).unwrap();
    assert_eq!(endpoint.circuit_state(), CircuitState::Open);
    assert!(!endpoint.available());
    factory.destroy_object(client).await;
}

#[tokio::test]
async fn validation_is_bounded_by_timeout() {
    // nothing listens here: reserve a port on the mock server, then drop it
    let url = {
        let server = mockito::Server::new_async().await;
        server.url()
    };
    let registry = Arc::new(EndpointRegistry::init(&url).unwrap());
    let factory = HttpClientFactory::new(registry, no_retry(), Duration::from_millis(200));

    let client = factory.make_object().await.unwrap();
    let started = std::time::Instant::now();
    assert!(!factory.validate_object(&client).await);
    assert!(started.elapsed() < Duration::from_secs(2));
}

// ─── Discovery ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn remote_list_is_fetched_per_chain() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/irishub_1/rpc_nodes")
        .with_status(200)
        .with_body("http://a:26657,http://b:26657\n")
        .create_async()
        .await;

    let source = RemoteListSource::new(format!("{}/{{chain_id}}/rpc_nodes", server.url())).unwrap();
    let list = source.endpoints("irishub_1").await.unwrap();
    assert_eq!(list, "http://a:26657,http://b:26657");
    mock.assert_async().await;
}

#[tokio::test]
async fn missing_remote_list_is_fatal() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let source = RemoteListSource::new(format!("{}/{{chain_id}}", server.url())).unwrap();
    let settings = NodeSettings::new("unknown-chain", 2, 1);
    let err = init_with_source(&settings, &source).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, PoolError::Discovery { .. }));
}

// ─── Whole pool ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn pool_serves_clients_from_live_node() {
    let mut server = mockito::Server::new_async().await;
    let _mock = healthy_node(&mut server).await;

    let settings = NodeSettings {
        idle_sweep_secs: 0,
        ..NodeSettings::new("irishub_1", 2, 1)
    };
    let pool = init_with_source(&settings, &StaticSource::new(server.url()))
        .await
        .unwrap();
    assert_eq!(pool.pool().num_idle(), 1);

    let client = pool
        .get_client_with_timeout(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(client.url(), server.url());
    pool.heart_beat(&client).await.unwrap();
    pool.release(client).await;

    let stats = pool.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.returned, 1);
    pool.close().await;
    assert!(matches!(pool.get_client().await, Err(PoolError::Closed)));
}
