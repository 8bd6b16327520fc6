//! End-to-end tests over real TCP.
//!
//! Raw-socket backends answer with scripted statuses so retries, client
//! errors and connection failures go through reqwest exactly as in production.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{closed_port, start_programmable_backend};
use resilient_fetch::{
    EngineConfig, ErrorKind, FetchEngine, FetchError, HttpTransport, RequestDescriptor,
    TransportError,
};

fn http_engine(config: EngineConfig) -> FetchEngine {
    let transport = HttpTransport::new(&config.transport, &config.timeouts).unwrap();
    FetchEngine::builder(config).transport(transport).build().unwrap()
}

fn fast_retries() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 50;
    config.retries.jitter = 0.0;
    config.timeouts.total_ms = 5000;
    config.timeouts.connect_ms = 1000;
    config
}

#[tokio::test]
async fn test_retry_until_backend_recovers() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let addr = start_programmable_backend(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                (503, "Service Unavailable".to_string())
            } else {
                (200, "Success".to_string())
            }
        }
    })
    .await;

    let engine = http_engine(fast_retries());
    let request = RequestDescriptor::get(format!("http://{addr}/data")).build().unwrap();
    let outcome = engine.fetch_one(&request).await;

    assert!(outcome.is_success(), "unexpected outcome: {:?}", outcome.error());
    assert_eq!(outcome.status(), Some(200));
    assert_eq!(outcome.attempts(), 3);
    assert_eq!(outcome.text().as_deref(), Some("Success"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_error_returned_without_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let addr = start_programmable_backend(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { (404, "Not Found".to_string()) }
    })
    .await;

    let engine = http_engine(fast_retries());
    let request = RequestDescriptor::get(format!("http://{addr}/missing")).build().unwrap();
    let outcome = engine.fetch_one(&request).await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::Transport));
    assert_eq!(outcome.status(), Some(404));
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connection_refused_exhausts_retries() {
    let addr = closed_port().await;

    let engine = http_engine(fast_retries());
    let request = RequestDescriptor::get(format!("http://{addr}/")).build().unwrap();
    let outcome = engine.fetch_one(&request).await;

    match outcome.error() {
        Some(FetchError::RetriesExhausted { attempts, last }) => {
            assert_eq!(*attempts, 3);
            assert!(matches!(last, TransportError::Connect(_)), "last error: {last:?}");
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    let scope = addr.to_string();
    assert_eq!(engine.circuit_state(&scope).unwrap().consecutive_failures, 1);
}

#[tokio::test]
async fn test_slow_backend_hits_request_deadline() {
    let addr = start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        (200, "late".to_string())
    })
    .await;

    let engine = http_engine(fast_retries());
    let request = RequestDescriptor::get(format!("http://{addr}/slow"))
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let outcome = engine.fetch_one(&request).await;

    assert!(!outcome.is_success());
    assert!(
        matches!(
            outcome.error_kind(),
            Some(ErrorKind::Timeout) | Some(ErrorKind::RetriesExhausted)
        ),
        "unexpected outcome: {:?}",
        outcome.error()
    );
    assert!(outcome.elapsed() < Duration::from_secs(2));
}
