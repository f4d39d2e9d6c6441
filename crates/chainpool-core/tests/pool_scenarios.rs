//! End-to-end pool behaviour against an in-memory network of fake nodes.
//!
//! The factory here picks endpoints from a real `EndpointRegistry` and
//! builds clients whose health depends on which nodes are marked down.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chainpool_core::endpoint::endpoint_id;
use chainpool_core::policy::RetryConfig;
use chainpool_core::{
    AcquireConfig, ClientPool, EndpointRegistry, EndpointSource, JsonRpcRequest, JsonRpcResponse,
    NodeClient, ObjectPool, PoolConfig, PoolError, PooledObjectFactory, RequestIds, StaticSource,
    TransportError,
};

// ─── Fake network ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Network {
    down: Mutex<HashSet<String>>,
}

impl Network {
    fn take_down(&self, addr: &str) {
        self.down.lock().unwrap().insert(addr.to_string());
    }

    fn is_down(&self, addr: &str) -> bool {
        self.down.lock().unwrap().contains(addr)
    }
}

#[derive(Debug)]
struct FakeNodeClient {
    endpoint: String,
    network: Arc<Network>,
    ids: RequestIds,
}

#[async_trait]
impl NodeClient for FakeNodeClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        if self.network.is_down(&self.endpoint) {
            return Err(TransportError::Http(format!("{}: connection refused", self.endpoint)));
        }
        Ok(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: req.id,
            result: Some(serde_json::json!({})),
            error: None,
        })
    }

    fn url(&self) -> &str {
        &self.endpoint
    }

    fn next_id(&self) -> i64 {
        self.ids.next()
    }
}

struct FakeFactory {
    registry: Arc<EndpointRegistry>,
    network: Arc<Network>,
}

#[async_trait]
impl PooledObjectFactory for FakeFactory {
    type Object = FakeNodeClient;

    // Connecting is lazy, as with HTTP: a dead node only shows up in validation.
    async fn make_object(&self) -> Result<FakeNodeClient, PoolError> {
        let endpoint = self.registry.next_available().ok_or(PoolError::NoEndpoints)?;
        Ok(FakeNodeClient {
            endpoint: endpoint.address().to_string(),
            network: Arc::clone(&self.network),
            ids: RequestIds::default(),
        })
    }

    async fn destroy_object(&self, _obj: FakeNodeClient) {}

    async fn validate_object(&self, obj: &FakeNodeClient) -> bool {
        let id = endpoint_id(obj.url());
        let healthy = obj.health().await.is_ok();
        if healthy {
            self.registry.record_success(&id);
        } else {
            self.registry.record_failure(&id);
        }
        healthy
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn config(max_total: usize, idle: usize) -> PoolConfig {
    PoolConfig {
        max_total,
        max_idle: idle,
        min_idle: idle,
        test_on_borrow: true,
        test_on_create: true,
        test_while_idle: true,
        ..Default::default()
    }
}

fn fast_retry() -> AcquireConfig {
    AcquireConfig {
        retry: RetryConfig::fixed(Duration::from_millis(5), 0),
        retry_forever: true,
    }
}

async fn init(
    source: &dyn EndpointSource,
    config: PoolConfig,
    network: Arc<Network>,
) -> Result<ClientPool<FakeFactory>, PoolError> {
    let raw = source.endpoints("irishub_1").await?;
    let registry = Arc::new(EndpointRegistry::init(&raw)?);
    let pool = ObjectPool::new(FakeFactory { registry, network }, config)?;
    pool.prepare_pool().await?;
    Ok(ClientPool::new(pool, fast_retry()))
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_endpoints_two_slots_one_idle() {
    let network = Arc::new(Network::default());
    let source = StaticSource::new("http://a,http://b,http://c");
    let pool = init(&source, config(2, 1), network).await.unwrap();
    assert_eq!(pool.pool().num_idle(), 1);

    let first = pool.get_client().await.unwrap();
    let second = pool.get_client().await.unwrap();
    assert_ne!(first.id(), second.id());

    let third = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get_client().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!third.is_finished(), "third borrow must wait for a release");

    let first_id = first.id();
    pool.release(first).await;
    let third = tokio::time::timeout(Duration::from_secs(1), third)
        .await
        .expect("third borrow should complete after release")
        .unwrap()
        .unwrap();
    assert_eq!(third.id(), first_id);
    assert!(pool.stats().active <= 2);
}

#[tokio::test]
async fn empty_endpoint_list_fails_before_pool_exists() {
    let network = Arc::new(Network::default());
    let err = init(&StaticSource::new(""), config(2, 1), network)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, PoolError::NoEndpoints));
}

#[tokio::test]
async fn unreachable_endpoint_is_invalidated_and_never_reused() {
    let network = Arc::new(Network::default());
    let source = StaticSource::new("http://a,http://b");
    let pool = init(&source, config(2, 0), Arc::clone(&network)).await.unwrap();

    let client = pool.get_client().await.unwrap();
    assert_eq!(client.url(), "http://a");
    let dead_id = client.id();

    network.take_down("http://a");
    assert!(pool.heart_beat(&client).await.is_err());
    pool.invalidate(client).await;

    for _ in 0..6 {
        let c = pool.get_client().await.unwrap();
        assert_ne!(c.id(), dead_id);
        assert_eq!(c.url(), "http://b");
        assert!(pool.heart_beat(&c).await.is_ok());
        pool.release(c).await;
    }
}

#[tokio::test]
async fn prepare_pool_skips_past_a_dead_endpoint() {
    let network = Arc::new(Network::default());
    network.take_down("http://a");
    let source = StaticSource::new("http://a,http://b,http://c");
    let pool = init(&source, config(3, 2), network).await.unwrap();

    assert_eq!(pool.pool().num_idle(), 2);
    let stats = pool.stats();
    assert_eq!(stats.created, 3);
    assert_eq!(stats.destroyed, 1);
    assert_eq!(stats.validation_failures, 1);

    let mut urls = Vec::new();
    for _ in 0..2 {
        urls.push(pool.get_client().await.unwrap().url().to_string());
    }
    urls.sort();
    assert_eq!(urls, ["http://b", "http://c"]);
}

#[tokio::test]
async fn borrow_replaces_idle_client_whose_node_went_down() {
    let network = Arc::new(Network::default());
    let source = StaticSource::new("http://a,http://b");
    let pool = init(&source, config(2, 1), Arc::clone(&network)).await.unwrap();
    assert_eq!(pool.pool().num_idle(), 1);

    network.take_down("http://a");
    let client = pool.pool().borrow_object().await.unwrap();
    assert_eq!(client.url(), "http://b");
    assert_eq!(client.id(), 2);

    let stats = pool.stats();
    assert_eq!(stats.validation_failures, 1);
    assert_eq!(stats.destroyed, 1);
    assert_eq!(stats.created, 2);
    assert_eq!(pool.pool().num_idle(), 0);
}

#[tokio::test]
async fn idle_set_never_exceeds_max_idle() {
    let network = Arc::new(Network::default());
    let pool = init(&StaticSource::new("http://a"), PoolConfig { max_idle: 2, ..config(5, 0) }, network)
        .await
        .unwrap();

    let mut held = Vec::new();
    for _ in 0..5 {
        held.push(pool.get_client().await.unwrap());
    }
    for c in held {
        pool.release(c).await;
        assert!(pool.pool().num_idle() <= 2);
    }
    assert_eq!(pool.pool().num_idle(), 2);
    assert_eq!(pool.stats().destroyed, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_borrowers_never_share_or_exceed_max_total() {
    let network = Arc::new(Network::default());
    let source = StaticSource::new("http://a,http://b,http://c");
    let pool = init(&source, config(3, 1), network).await.unwrap();

    let live = Arc::new(Mutex::new(HashSet::new()));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let pool = pool.clone();
        let live = Arc::clone(&live);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                let c = pool.get_client().await.unwrap();
                {
                    let mut live = live.lock().unwrap();
                    assert!(live.insert(c.id()), "object {} borrowed twice", c.id());
                    peak.fetch_max(live.len(), Ordering::SeqCst);
                }
                tokio::task::yield_now().await;
                live.lock().unwrap().remove(&c.id());
                pool.release(c).await;
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(pool.stats().created <= 3 + pool.stats().destroyed);
}

#[tokio::test]
async fn zero_timeout_on_exhausted_pool_times_out() {
    let network = Arc::new(Network::default());
    let pool = init(&StaticSource::new("http://a"), config(1, 0), network)
        .await
        .unwrap();
    let _held = pool.get_client().await.unwrap();

    let started = std::time::Instant::now();
    let err = pool.get_client_with_timeout(Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, PoolError::Timeout { ms: 0 }));
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn generous_timeout_matches_plain_borrow() {
    let network = Arc::new(Network::default());
    let pool = init(&StaticSource::new("http://a,http://b"), config(2, 1), network)
        .await
        .unwrap();
    // the pre-warmed object is the one a plain borrow would hand out
    let client = pool
        .get_client_with_timeout(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(client.id(), 1);
    assert_eq!(pool.stats().created, 1);
}

#[tokio::test]
async fn close_fails_pending_and_future_borrows() {
    let network = Arc::new(Network::default());
    let pool = init(&StaticSource::new("http://a"), config(1, 1), network)
        .await
        .unwrap();
    let held = pool.get_client().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get_client().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.close().await;

    let res = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(res, Err(PoolError::Closed)));
    assert!(matches!(
        pool.get_client_with_timeout(Duration::from_secs(1)).await,
        Err(PoolError::Closed)
    ));
    pool.release(held).await;
}
