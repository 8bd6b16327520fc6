//! Failure injection tests.
//!
//! Drive the engine through scripted transports that fail, stall or panic,
//! and check that every failure surfaces as an outcome with the right kind.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::MockTransport;
use resilient_fetch::{
    CircuitMode, EngineConfig, ErrorKind, FetchEngine, FetchError, OutcomeSource, RawResponse,
    RequestDescriptor, RetryStrategy, TransportError,
};

fn engine(transport: Arc<MockTransport>, config: EngineConfig) -> FetchEngine {
    FetchEngine::builder(config).transport(transport).build().unwrap()
}

fn no_retries() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retries.strategy = RetryStrategy::None;
    config.retries.max_attempts = 1;
    config.cache.enabled = false;
    config
}

fn get(target: &str) -> RequestDescriptor {
    RequestDescriptor::get(target).build().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_circuit_opens_and_recovers() {
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = healthy.clone();
    let transport = MockTransport::new(move |_, _| {
        let status = if flag.load(Ordering::SeqCst) { 200 } else { 503 };
        Ok(RawResponse::new(status, "body"))
    })
    .shared();

    let mut config = no_retries();
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.cooldown_ms = 1000;
    let engine = engine(transport.clone(), config);

    for i in 0..3 {
        let outcome = engine.fetch_one(&get(&format!("https://flaky.example/{i}"))).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RetriesExhausted));
    }
    assert_eq!(engine.circuit_state("flaky.example").unwrap().mode, CircuitMode::Open);

    // Open circuit rejects without touching the transport
    let rejected = engine.fetch_one(&get("https://flaky.example/rejected")).await;
    assert_eq!(
        rejected.error(),
        Some(&FetchError::CircuitOpen {
            scope: "flaky.example".to_string()
        })
    );
    assert_eq!(rejected.attempts(), 0);
    assert_eq!(transport.calls(), 3);

    // Other scopes are unaffected
    let other = engine.fetch_one(&get("https://other.example/")).await;
    assert_eq!(other.error_kind(), Some(ErrorKind::RetriesExhausted));
    assert_eq!(transport.calls(), 4);

    tokio::time::advance(Duration::from_millis(1000)).await;
    healthy.store(true, Ordering::SeqCst);

    let trial = engine.fetch_one(&get("https://flaky.example/trial")).await;
    assert!(trial.is_success());
    let circuit = engine.circuit_state("flaky.example").unwrap();
    assert_eq!(circuit.mode, CircuitMode::Closed);
    assert_eq!(circuit.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_trial_reopens_circuit() {
    let transport = MockTransport::new(|_, _| Ok(RawResponse::new(500, ""))).shared();

    let mut config = no_retries();
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.cooldown_ms = 1000;
    let engine = engine(transport.clone(), config);

    for i in 0..3 {
        engine.fetch_one(&get(&format!("https://down.example/{i}"))).await;
    }
    tokio::time::advance(Duration::from_millis(1000)).await;

    let trial = engine.fetch_one(&get("https://down.example/trial")).await;
    assert_eq!(trial.error_kind(), Some(ErrorKind::RetriesExhausted));
    assert_eq!(engine.circuit_state("down.example").unwrap().mode, CircuitMode::Open);
    assert_eq!(transport.calls(), 4);

    // Cooldown restarted with the failed trial
    tokio::time::advance(Duration::from_millis(500)).await;
    let rejected = engine.fetch_one(&get("https://down.example/again")).await;
    assert_eq!(rejected.error_kind(), Some(ErrorKind::CircuitOpen));
    assert_eq!(transport.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_batch() {
    let transport = MockTransport::new(|request, _| {
        let failing = ["/2", "/5", "/8"].iter().any(|p| request.target().ends_with(p));
        let status = if failing { 404 } else { 200 };
        Ok(RawResponse::new(status, request.target().to_string()))
    })
    .shared();
    let engine = engine(transport.clone(), EngineConfig::default());

    let requests: Vec<_> = (0..10)
        .map(|i| get(&format!("https://mixed.example/{i}")))
        .collect();
    let report = engine.fetch_many(requests, 4).await;

    assert_eq!(report.total(), 10);
    assert_eq!(report.successes, 7);
    assert_eq!(report.failures, 3);
    assert_eq!(report.success_rate(), 70.0);
    assert!(!report.is_complete_success());

    for (i, outcome) in report.outcomes.iter().enumerate() {
        if [2, 5, 8].contains(&i) {
            assert_eq!(outcome.error_kind(), Some(ErrorKind::Transport));
            assert_eq!(outcome.status(), Some(404));
        } else {
            assert_eq!(outcome.text().as_deref(), Some(format!("https://mixed.example/{i}").as_str()));
        }
    }
    // Client errors are not retried
    assert_eq!(transport.calls(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_slow_transport_times_out() {
    let transport = MockTransport::echo()
        .with_latency(Duration::from_secs(10))
        .shared();
    let engine = engine(transport.clone(), EngineConfig::default());

    let request = RequestDescriptor::get("https://slow.example/")
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let outcome = engine.fetch_one(&request).await;

    assert_eq!(outcome.error(), Some(&FetchError::Timeout(Duration::from_secs(1))));
    assert_eq!(outcome.attempts(), 1);
    assert!(outcome.elapsed() >= Duration::from_secs(1));
    assert!(outcome.elapsed() < Duration::from_secs(2));
    assert_eq!(engine.circuit_state("slow.example").unwrap().consecutive_failures, 1);
    assert_eq!(engine.transport_calls(), 0);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_schedule() {
    let transport = MockTransport::new(|_, call| {
        let status = if call < 4 { 503 } else { 200 };
        Ok(RawResponse::new(status, "done"))
    })
    .shared();

    let mut config = EngineConfig::default();
    config.timeouts.total_ms = 60_000;
    config.retries.max_attempts = 5;
    config.retries.base_delay_ms = 1000;
    config.retries.max_delay_ms = 60_000;
    config.retries.jitter = 0.0;
    let engine = engine(transport.clone(), config);

    let outcome = engine.fetch_one(&get("https://backoff.example/")).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.attempts(), 5);

    let times = transport.call_times();
    let gaps: Vec<u64> = times
        .windows(2)
        .map(|w| (w[1] - w[0]).as_millis() as u64)
        .collect();
    assert_eq!(gaps, vec![1000, 2000, 4000, 8000]);
}

#[tokio::test(start_paused = true)]
async fn test_retry_sleep_cut_short_by_deadline() {
    let transport = MockTransport::new(|_, _| Ok(RawResponse::new(503, ""))).shared();

    let mut config = EngineConfig::default();
    config.retries.max_attempts = 5;
    config.retries.base_delay_ms = 1000;
    config.retries.max_delay_ms = 10_000;
    config.retries.jitter = 0.0;
    let engine = engine(transport.clone(), config);

    let request = RequestDescriptor::get("https://budget.example/")
        .timeout(Duration::from_millis(2500))
        .build()
        .unwrap();
    let outcome = engine.fetch_one(&request).await;

    // Attempts at 0s and 1s, then the 2s backoff runs past the deadline
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
    assert_eq!(outcome.attempts(), 2);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_connect_errors_exhaust_retries() {
    let transport = MockTransport::new(|_, _| Err(TransportError::Connect("refused".into()))).shared();

    let mut config = EngineConfig::default();
    config.retries.base_delay_ms = 10;
    config.retries.jitter = 0.0;
    let engine = engine(transport.clone(), config);

    let outcome = engine.fetch_one(&get("https://gone.example/")).await;
    assert_eq!(
        outcome.error(),
        Some(&FetchError::RetriesExhausted {
            attempts: 3,
            last: TransportError::Connect("refused".into()),
        })
    );
    assert_eq!(outcome.status(), None);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_times_out_independently() {
    let transport = MockTransport::echo()
        .with_latency(Duration::from_secs(5))
        .shared();
    let engine = engine(transport.clone(), EngineConfig::default());

    let patient = RequestDescriptor::get("https://shared.example/")
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    let hasty = RequestDescriptor::get("https://shared.example/")
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    assert_eq!(patient.fingerprint(), hasty.fingerprint());

    let executor = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.fetch_one(&patient).await })
    };
    tokio::task::yield_now().await;
    assert_eq!(engine.in_flight(), 1);

    let waiter = engine.fetch_one(&hasty).await;
    assert_eq!(waiter.error(), Some(&FetchError::Timeout(Duration::from_secs(1))));

    let executed = executor.await.unwrap();
    assert!(executed.is_success());
    assert_eq!(executed.source(), OutcomeSource::Network);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiters_share_executor_failure() {
    let transport = MockTransport::echo()
        .with_latency(Duration::from_secs(5))
        .shared();
    let engine = engine(transport.clone(), EngineConfig::default());

    let executor_request = RequestDescriptor::get("https://shared.example/")
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let waiter_request = RequestDescriptor::get("https://shared.example/")
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();

    let executor = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.fetch_one(&executor_request).await })
    };
    tokio::task::yield_now().await;

    let waiter = engine.fetch_one(&waiter_request).await;
    assert_eq!(waiter.error_kind(), Some(ErrorKind::Timeout));
    assert_eq!(waiter.source(), OutcomeSource::Network);

    assert_eq!(executor.await.unwrap().error_kind(), Some(ErrorKind::Timeout));
    assert_eq!(transport.calls(), 1);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_aborted_executor_cancels_waiters() {
    let transport = MockTransport::echo()
        .with_latency(Duration::from_secs(5))
        .shared();
    let engine = engine(transport.clone(), EngineConfig::default());
    let request = get("https://shared.example/");

    let executor = {
        let engine = engine.clone();
        let request = request.clone();
        tokio::spawn(async move { engine.fetch_one(&request).await })
    };
    tokio::task::yield_now().await;

    let waiter = {
        let engine = engine.clone();
        let request = request.clone();
        tokio::spawn(async move { engine.fetch_one(&request).await })
    };
    tokio::task::yield_now().await;

    executor.abort();
    let outcome = waiter.await.unwrap();
    assert_eq!(outcome.error(), Some(&FetchError::Cancelled));
    assert_eq!(engine.in_flight(), 0);

    // The next caller starts a fresh execution
    let retried = engine.fetch_one(&request).await;
    assert!(retried.is_success());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_in_flight() {
    let transport = MockTransport::echo()
        .with_latency(Duration::from_secs(10))
        .shared();
    let engine = engine(transport.clone(), EngineConfig::default());
    let request = get("https://busy.example/");

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let engine = engine.clone();
            let request = request.clone();
            tokio::spawn(async move { engine.fetch_one(&request).await })
        })
        .collect();
    tokio::task::yield_now().await;
    assert_eq!(engine.in_flight(), 1);

    engine.shutdown();
    for task in tasks {
        let outcome = task.await.unwrap();
        assert_eq!(outcome.error(), Some(&FetchError::Cancelled));
    }

    assert_eq!(engine.in_flight(), 0);
    assert_eq!(engine.transport_calls(), 0);
    // Cancellation is not a target failure
    assert_eq!(engine.circuit_state("busy.example").unwrap().consecutive_failures, 0);

    let late = engine.fetch_one(&get("https://busy.example/late")).await;
    assert_eq!(late.error(), Some(&FetchError::Cancelled));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_queued_batch_members() {
    let transport = MockTransport::echo()
        .with_latency(Duration::from_secs(10))
        .shared();
    let engine = engine(transport.clone(), EngineConfig::default());

    let requests: Vec<_> = (0..3)
        .map(|i| get(&format!("https://queued.example/{i}")))
        .collect();
    let batch = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.fetch_many(requests, 1).await })
    };
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
    assert_eq!(engine.in_flight(), 1);

    engine.shutdown();
    let report = batch.await.unwrap();

    assert_eq!(report.failures, 3);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.error() == Some(&FetchError::Cancelled)));
    assert_eq!(report.outcomes[2].attempts(), 0);
    assert_eq!(transport.calls(), 1);
    assert!(report.elapsed < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_wait_and_timeout() {
    let transport = MockTransport::echo().shared();

    let mut config = EngineConfig::default();
    config.rate_limit.enabled = true;
    config.rate_limit.requests_per_second = 1.0;
    config.rate_limit.burst_size = 1;
    let engine = engine(transport.clone(), config);

    assert!(engine.fetch_one(&get("https://limited.example/1")).await.is_success());

    let hurried = RequestDescriptor::get("https://limited.example/2")
        .timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let rejected = engine.fetch_one(&hurried).await;
    assert_eq!(
        rejected.error(),
        Some(&FetchError::RateLimitTimeout {
            scope: "limited.example".to_string()
        })
    );
    assert_eq!(rejected.attempts(), 0);
    assert_eq!(transport.calls(), 1);

    // A patient request waits for the next token
    let waited = engine.fetch_one(&get("https://limited.example/3")).await;
    assert!(waited.is_success());
    assert!(waited.elapsed() >= Duration::from_millis(900));
    assert_eq!(transport.calls(), 2);

    // Separate scopes have separate buckets
    let other = engine.fetch_one(&get("https://unlimited.example/")).await;
    assert!(other.is_success());
    assert_eq!(other.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_transport_isolated_in_batch() {
    let transport = MockTransport::new(|request, _| {
        if request.target().ends_with("/boom") {
            panic!("transport blew up");
        }
        Ok(RawResponse::new(200, "fine"))
    })
    .shared();
    let engine = engine(transport.clone(), EngineConfig::default());

    let requests = vec![
        get("https://panic.example/a"),
        get("https://panic.example/boom"),
        get("https://panic.example/c"),
    ];
    let report = engine.fetch_many(requests, 2).await;

    assert_eq!(report.successes, 2);
    assert_eq!(report.outcomes[1].error(), Some(&FetchError::Cancelled));
    assert!(report.outcomes[0].is_success());
    assert!(report.outcomes[2].is_success());
    assert_eq!(engine.in_flight(), 0);
}
