mod common;

use airq_chords::web::create_app;
use airq_chords::{DeliveryQueue, QueueStatus, RetryPolicy};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{uri, ScriptedTransport};
use std::time::Duration;
use tower::ServiceExt;

#[tokio::test]
async fn healthz_answers_ok() {
    let (queue, _worker) = DeliveryQueue::spawn(ScriptedTransport::always_ok(), RetryPolicy::default());
    let app = create_app(queue);

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn status_reports_queue_counters() {
    let (queue, _worker) =
        DeliveryQueue::spawn(ScriptedTransport::always_failing(), RetryPolicy::default());
    queue.enqueue(uri("a"), Duration::from_secs(600)).unwrap();
    queue.enqueue(uri("b"), Duration::from_secs(600)).unwrap();

    let app = create_app(queue);
    let response = app
        .oneshot(Request::builder().uri("/v1/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let status: QueueStatus = serde_json::from_slice(&body).expect("Should parse status JSON");
    assert_eq!(status.enqueued, 2);
    assert_eq!(status.delivered, 0);
}

#[tokio::test]
async fn status_unavailable_after_shutdown() {
    let (queue, worker) = DeliveryQueue::spawn(ScriptedTransport::always_ok(), RetryPolicy::default());
    queue.shutdown().await.unwrap();
    worker.await.unwrap();

    let response = create_app(queue)
        .oneshot(Request::builder().uri("/v1/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
