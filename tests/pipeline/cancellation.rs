use super::{COMPLETIONS_PATH, content_frame, pipeline, sse, turn};
use relaychat::SessionOutcome;
use relaychat::core::{GenerationStatus, MessageMarker};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn slow_response(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(sse(&[&content_frame(text)]))
        .set_delay(Duration::from_secs(30))
}

#[tokio::test]
async fn stop_while_waiting_for_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(slow_response("too late"))
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, false).await;
    let handle = pipeline.orchestrator.submit(turn("hello?")).await;

    let mut snapshots = pipeline.orchestrator.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|s| {
            s.as_ref()
                .is_some_and(|s| s.status == GenerationStatus::Generating)
        }),
    )
    .await
    .expect("session never reached Generating")
    .unwrap();

    tokio::time::timeout(Duration::from_secs(5), pipeline.orchestrator.stop())
        .await
        .expect("stop did not release the pending request");
    let snapshot = handle.wait().await;

    assert_eq!(snapshot.outcome, SessionOutcome::Cancelled);
    assert!(snapshot.accumulated_visible.is_empty());
    let messages = pipeline.messages().await;
    assert_eq!(messages.last().unwrap().marker, Some(MessageMarker::Cancelled));
    assert!(!messages.iter().any(|m| m.text == "too late"));
}

#[tokio::test]
async fn resubmitting_supersedes_the_slow_generation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_string_contains("first question"))
        .and(|request: &wiremock::Request| {
            !String::from_utf8_lossy(&request.body).contains("second question")
        })
        .respond_with(slow_response("stale"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_string_contains("second question"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse(&[&content_frame("fresh")])),
        )
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, false).await;
    let first = pipeline.orchestrator.submit(turn("first question")).await;
    let mut snapshots = pipeline.orchestrator.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|s| {
            s.as_ref()
                .is_some_and(|s| s.status == GenerationStatus::Generating)
        }),
    )
    .await
    .expect("first session never reached Generating")
    .unwrap();

    let second = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.orchestrator.submit(turn("second question")),
    )
    .await
    .expect("supersession waited on the slow request");

    assert_eq!(first.wait().await.outcome, SessionOutcome::Cancelled);
    let finished = second.wait().await;
    assert_eq!(finished.outcome, SessionOutcome::Finished);
    assert_eq!(finished.accumulated_visible, "fresh");

    let markers: Vec<_> = pipeline
        .messages()
        .await
        .into_iter()
        .filter_map(|m| m.marker)
        .collect();
    assert_eq!(markers, vec![MessageMarker::Cancelled]);
}
