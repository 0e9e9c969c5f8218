//! Batch dispatch tests
//!
//! Ordering, permit bound, failure isolation and deadline behaviour of the
//! dispatcher against a fake text-generation backend.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{call, expected_reply, EchoClient, Latency};
use pretty_assertions::assert_eq;
use rowgen::batch::reply::{error_reply, ARITY_MESSAGE, CANCELLED_MESSAGE, REQUIRED_MESSAGE};
use rowgen::batch::{BatchDispatcher, BatchRequest, CallRecord, DispatchConfig};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn dispatcher(client: &Arc<EchoClient>, max_concurrency: usize, time_limit: Duration) -> BatchDispatcher {
    BatchDispatcher::new(
        client.clone(),
        DispatchConfig::new()
            .with_concurrency_limit(max_concurrency)
            .with_time_limit(time_limit),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replies_stay_aligned_under_random_latency() {
    let client = Arc::new(EchoClient::new(Latency::RandomUpTo(20)));
    let dispatcher = dispatcher(&client, 8, Duration::from_secs(30));

    let calls: Vec<CallRecord> = (0..60)
        .map(|i| call(&format!("prompt-{i}"), &format!("model-{}", i % 3)))
        .collect();
    let response = dispatcher
        .dispatch(BatchRequest::with_calls(calls), CancellationToken::new())
        .await;

    assert_eq!(response.replies.len(), 60);
    assert_eq!(response.error_message, None);
    for (i, reply) in response.replies.iter().enumerate() {
        assert_eq!(
            reply,
            &expected_reply(&format!("prompt-{i}"), &format!("model-{}", i % 3)),
            "reply {i} is misaligned"
        );
    }
    assert_eq!(client.calls(), 60);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_calls_never_exceed_limit() {
    let client = Arc::new(EchoClient::new(Latency::Fixed(Duration::from_millis(10))));
    let dispatcher = dispatcher(&client, 4, Duration::from_secs(30));

    let calls: Vec<CallRecord> = (0..40).map(|i| call(&format!("p{i}"), "m")).collect();
    let (response, summary) = dispatcher
        .dispatch_with_summary(BatchRequest::with_calls(calls), CancellationToken::new())
        .await;

    assert_eq!(response.replies.len(), 40);
    assert_eq!(summary.succeeded, 40);
    assert!(
        client.peak_running() <= 4,
        "peak of {} concurrent calls exceeds the limit",
        client.peak_running()
    );
    assert!(client.peak_running() >= 2, "calls should overlap");
}

#[tokio::test]
async fn test_wrong_arity_is_isolated() {
    let client = Arc::new(EchoClient::new(Latency::None));
    let dispatcher = dispatcher(&client, 10, Duration::from_secs(30));

    let request = BatchRequest::with_calls(vec![
        call("a", "m"),
        CallRecord::new(vec![json!("only-prompt")]),
        CallRecord::new(vec![json!("p"), json!("m"), json!("extra")]),
        CallRecord::new(vec![]),
        call("b", "m"),
    ]);
    let response = dispatcher.dispatch(request, CancellationToken::new()).await;

    assert_eq!(
        response.replies,
        vec![
            expected_reply("a", "m"),
            error_reply(ARITY_MESSAGE),
            error_reply(ARITY_MESSAGE),
            error_reply(ARITY_MESSAGE),
            expected_reply("b", "m"),
        ]
    );
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_expired_before_dispatch_cancels_every_call() {
    let client = Arc::new(EchoClient::new(Latency::None));
    let dispatcher = dispatcher(&client, 10, Duration::from_secs(30));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = BatchRequest::with_calls(vec![
        call("a", "m"),
        CallRecord::new(vec![json!("bad arity")]),
        call("b", "m"),
    ]);
    let (response, summary) = dispatcher.dispatch_with_summary(request, cancel).await;

    assert_eq!(response.replies, vec![error_reply(CANCELLED_MESSAGE); 3]);
    assert_eq!(summary.cancelled, 3);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_empty_batch_yields_empty_replies() {
    let client = Arc::new(EchoClient::new(Latency::None));
    let dispatcher = dispatcher(&client, 10, Duration::from_secs(30));

    let response = dispatcher
        .dispatch(BatchRequest::default(), CancellationToken::new())
        .await;

    assert!(response.replies.is_empty());
    assert_eq!(response.error_message, None);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_mixed_batch_end_to_end() {
    let client = Arc::new(EchoClient::new(Latency::None));
    let dispatcher = dispatcher(&client, 10, Duration::from_secs(30));

    let request = BatchRequest::with_calls(vec![
        call("hello", "modelA"),
        call("", "modelA"),
        call("world", "modelB"),
    ]);
    let response = dispatcher.dispatch(request, CancellationToken::new()).await;

    assert_eq!(
        response.replies,
        vec![
            expected_reply("hello", "modelA"),
            r#"{"error":"Invalid input: PromptInput and Model are required"}"#.to_string(),
            expected_reply("world", "modelB"),
        ]
    );
    assert_eq!(response.replies[1], error_reply(REQUIRED_MESSAGE));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_permit_serializes_calls() {
    let latency = Duration::from_millis(50);
    let client = Arc::new(EchoClient::new(Latency::Fixed(latency)));
    let dispatcher = dispatcher(&client, 1, Duration::from_secs(30));

    let calls: Vec<CallRecord> = (0..5).map(|i| call(&format!("p{i}"), "m")).collect();
    let start = Instant::now();
    let response = dispatcher
        .dispatch(BatchRequest::with_calls(calls), CancellationToken::new())
        .await;
    let elapsed = start.elapsed();

    let expected: Vec<String> = (0..5).map(|i| expected_reply(&format!("p{i}"), "m")).collect();
    assert_eq!(response.replies, expected);
    assert_eq!(client.peak_running(), 1);
    assert!(
        elapsed >= latency * 5 - Duration::from_millis(10),
        "calls should run one at a time, took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_downstream_failure_is_isolated() {
    let client = Arc::new(EchoClient::new(Latency::None));
    let dispatcher = dispatcher(&client, 10, Duration::from_secs(30));

    let request = BatchRequest::with_calls(vec![call("ok", "m"), call("fail", "m"), call("fine", "m")]);
    let (response, summary) = dispatcher
        .dispatch_with_summary(request, CancellationToken::new())
        .await;

    assert_eq!(
        response.replies,
        vec![
            expected_reply("ok", "m"),
            error_reply("error making request: connection refused"),
            expected_reply("fine", "m"),
        ]
    );
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_waiting_and_running_calls() {
    let client = Arc::new(EchoClient::new(Latency::Fixed(Duration::from_millis(100))));
    let dispatcher = dispatcher(&client, 1, Duration::from_millis(150));

    let calls: Vec<CallRecord> = (0..5).map(|i| call(&format!("p{i}"), "m")).collect();
    let (response, summary) = dispatcher
        .dispatch_with_summary(BatchRequest::with_calls(calls), CancellationToken::new())
        .await;

    assert_eq!(response.replies.len(), 5);
    assert_eq!(response.replies[0], expected_reply("p0", "m"));
    for reply in &response.replies[1..] {
        assert_eq!(reply, &error_reply(CANCELLED_MESSAGE));
    }
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.cancelled, 4);
    // Only the first call and the one that got the next permit reached the backend
    assert_eq!(client.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_join_waits_for_calls_that_ignore_the_deadline() {
    let latency = Duration::from_millis(200);
    let client = Arc::new(EchoClient::ignoring_deadline(Latency::Fixed(latency)));
    let dispatcher = dispatcher(&client, 2, Duration::from_millis(50));

    let start = tokio::time::Instant::now();
    let response = dispatcher
        .dispatch(
            BatchRequest::with_calls(vec![call("a", "m"), call("b", "m")]),
            CancellationToken::new(),
        )
        .await;

    assert!(start.elapsed() >= latency);
    assert_eq!(
        response.replies,
        vec![expected_reply("a", "m"), expected_reply("b", "m")]
    );
}

#[tokio::test]
async fn test_external_cancellation_mid_batch() {
    let client = Arc::new(EchoClient::new(Latency::Fixed(Duration::from_secs(10))));
    let dispatcher = dispatcher(&client, 2, Duration::from_secs(30));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let calls: Vec<CallRecord> = (0..4).map(|i| call(&format!("p{i}"), "m")).collect();
    let start = Instant::now();
    let response = dispatcher.dispatch(BatchRequest::with_calls(calls), cancel).await;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(response.replies, vec![error_reply(CANCELLED_MESSAGE); 4]);
}
