//! Retry bookkeeping across the wire: counting, ceilings and retry ids.

mod helpers;

use std::time::Duration;

use helpers::{message, parse, setup_test_app};
use rstest::rstest;
use serde_json::{Value, json};
use weft_core::ports::{QueueBackend, ReceiveOptions};
use weft_core::{SubmitRequest, TaskOutcome, WorkerError};

#[tokio::test]
async fn test_inline_add_returns_result_without_sending() {
    let app = setup_test_app(|_| {});
    app.backend.create_queue("default").await;

    let outcome = app
        .dispatcher
        .submit(
            SubmitRequest::new("tests.tasks.add")
                .args(vec![json!(2), json!(3)])
                .queue("default")
                .inline(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.into_value(), Some(json!(5)));
    assert_eq!(app.backend.message_count("default").await, 0);
}

#[rstest]
#[case::ceiling_one(1)]
#[case::ceiling_five(5)]
#[tokio::test]
async fn test_counted_retry_stops_at_max_retries(#[case] max_retries: u32) {
    let app = setup_test_app(|_| {});
    app.backend.create_queue("default").await;

    // retry = max - 1 → 1 回だけ再投入される
    let outcome = app
        .dispatcher
        .execute(&message("tests.tasks.always_retry", max_retries, max_retries - 1))
        .await
        .unwrap();
    assert!(outcome.is_enqueued());

    let bodies = app.backend.take_messages("default").await;
    assert_eq!(bodies.len(), 1);
    let successor = parse(&bodies[0]);
    assert_eq!(successor["retry"], max_retries);
    assert_eq!(successor["maxRetries"], max_retries);

    // retry = max → 打ち切り、何も送らない
    let err = app.dispatcher.execute(&bodies[0]).await.unwrap_err();
    assert!(matches!(err, WorkerError::MaxRetriesReached { retries } if retries == max_retries));
    assert_eq!(app.backend.message_count("default").await, 0);
}

#[tokio::test]
async fn test_retry_counter_at_u32_max_stops_instead_of_wrapping() {
    let app = setup_test_app(|_| {});
    app.backend.create_queue("default").await;

    let err = app
        .dispatcher
        .execute(&message("tests.tasks.always_retry", u32::MAX, u32::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::MaxRetriesReached { retries } if retries == u32::MAX));
    assert_eq!(app.backend.message_count("default").await, 0);

    // 上限に達していなければ u32::MAX まで数えられる
    app.dispatcher
        .execute(&message("tests.tasks.always_retry", u32::MAX, u32::MAX - 1))
        .await
        .unwrap();
    let successor = parse(&app.backend.take_messages("default").await[0]);
    assert_eq!(successor["retry"], u32::MAX);
}

#[tokio::test]
async fn test_uncounted_retries_never_reach_the_ceiling() {
    let app = setup_test_app(|_| {});
    app.backend.create_queue("default").await;

    let mut body = message("tests.tasks.retry_uncounted", 0, 0);
    for _ in 0..25 {
        let outcome = app.dispatcher.execute(&body).await.unwrap();
        assert!(outcome.is_enqueued());

        let mut bodies = app.backend.take_messages("default").await;
        assert_eq!(bodies.len(), 1);
        body = bodies.remove(0);
        assert_eq!(parse(&body)["retry"], 0);
    }
}

#[tokio::test]
async fn test_retry_id_is_minted_once_per_chain() {
    let app = setup_test_app(|_| {});
    app.backend.create_queue("default").await;

    let first = message("tests.tasks.always_retry", 10, 0);
    assert_eq!(parse(&first)["retryId"], Value::Null);

    app.dispatcher.execute(&first).await.unwrap();
    let second = app.backend.take_messages("default").await.remove(0);
    let retry_id = parse(&second)["retryId"].clone();
    assert!(retry_id.as_str().is_some_and(|id| id.starts_with("retry-")));

    app.dispatcher.execute(&second).await.unwrap();
    let third = app.backend.take_messages("default").await.remove(0);
    assert_eq!(parse(&third)["retryId"], retry_id);
    assert_eq!(parse(&third)["retry"], 2);

    // queue / id / groupId は引き継がれる
    assert_eq!(parse(&third)["queue"], "default");
    assert_eq!(parse(&third)["id"], "task-test");
}

#[tokio::test]
async fn test_directive_ceiling_override_is_carried_forward() {
    let app = setup_test_app(|_| {});
    app.backend.create_queue("default").await;

    let body = json!({
        "func": "tests.tasks.retry_with_ceiling",
        "args": [],
        "kwargs": {"ceiling": 10},
        "maxRetries": 1,
        "retry": 1,
    })
    .to_string();

    app.dispatcher.execute(&body).await.unwrap();
    let successor = parse(&app.backend.take_messages("default").await[0]);
    assert_eq!(successor["retry"], 2);
    assert_eq!(successor["maxRetries"], 10);
}

#[tokio::test(start_paused = true)]
async fn test_directive_delay_defers_the_successor() {
    let app = setup_test_app(|_| {});
    let queue = app.backend.create_queue("default").await;

    app.dispatcher
        .execute(&message("tests.tasks.retry_later", 3, 0))
        .await
        .unwrap();
    assert_eq!(app.backend.message_count("default").await, 1);

    let options = ReceiveOptions {
        max_messages: 10,
        wait_time: Duration::ZERO,
        attribute_names: vec![],
    };
    let received = app.backend.receive_messages(&queue, &options).await.unwrap();
    assert!(received.is_empty());

    tokio::time::advance(Duration::from_secs(61)).await;
    let received = app.backend.receive_messages(&queue, &options).await.unwrap();
    assert_eq!(received.len(), 1);
}

#[tokio::test]
async fn test_force_serialization_resubmits_the_same_content() {
    let app = setup_test_app(|s| s.force_serialization = true);
    app.backend.create_queue("default").await;

    app.dispatcher
        .execute(&message("tests.tasks.always_retry", 3, 0))
        .await
        .unwrap();
    let successor = parse(&app.backend.take_messages("default").await[0]);
    assert_eq!(successor["func"], "tests.tasks.always_retry");
    assert_eq!(successor["retry"], 1);
}

#[tokio::test]
async fn test_retry_to_missing_queue_is_invalid_queue() {
    let app = setup_test_app(|_| {});

    let err = app
        .dispatcher
        .execute(&message("tests.tasks.always_retry", 3, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::InvalidQueue(name) if name == "default"));
}

#[rstest]
#[case::not_json("definitely not json")]
#[case::unknown_function(r#"{"func": "tests.tasks.missing", "args": [], "kwargs": {}}"#)]
#[case::unknown_module(r#"{"func": "nowhere.missing", "args": [], "kwargs": {}}"#)]
#[case::no_args(r#"{"func": "tests.tasks.add", "kwargs": {}}"#)]
#[tokio::test]
async fn test_bad_messages_are_invalid_message_format(#[case] body: &str) {
    let app = setup_test_app(|_| {});

    let err = app.dispatcher.execute(body).await.unwrap_err();
    assert!(matches!(err, WorkerError::InvalidMessageFormat { .. }));
}

#[tokio::test]
async fn test_plain_failure_is_execution_failed() {
    let app = setup_test_app(|_| {});
    app.backend.create_queue("default").await;

    let err = app
        .dispatcher
        .execute(&message("tests.tasks.explode", 5, 0))
        .await
        .unwrap_err();
    assert!(err.is_execution_failed());
    assert_eq!(app.backend.message_count("default").await, 0);

    let outcome = app
        .dispatcher
        .execute(&json!({"func": "tests.tasks.add", "args": [1, 2], "kwargs": {}}).to_string())
        .await
        .unwrap();
    assert_eq!(outcome, TaskOutcome::Completed(json!(3)));
}
