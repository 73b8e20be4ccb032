use super::{COMPLETIONS_PATH, content_frame, pipeline, sse, turn};
use relaychat::SessionOutcome;
use relaychat::core::{GenerationStatus, MessageMarker, Role};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

#[tokio::test]
async fn streams_an_answer_end_to_end() {
    let server = MockServer::start().await;
    let hello = content_frame("Hello");
    let world = content_frame(", world");
    let usage = r#"{"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":2,"total_tokens":11}}"#;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("authorization", "Bearer sk-mock-0123456789"))
        .and(body_string_contains("\"stream\":true"))
        .respond_with(sse_response(sse(&[&hello, &world, usage])))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, false).await;
    let snapshot = pipeline.orchestrator.submit(turn("greet me")).await.wait().await;

    assert_eq!(snapshot.outcome, SessionOutcome::Finished);
    assert_eq!(snapshot.status, GenerationStatus::Completed);
    assert_eq!(snapshot.accumulated_visible, "Hello, world");

    let messages = pipeline.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].text, "Hello, world");
    assert!(!messages[1].pending);

    let summary = pipeline.usage.summary().await.unwrap();
    assert_eq!(summary.record_count, 1);
    assert_eq!(summary.total_output_tokens, 2);
}

#[tokio::test]
async fn inline_think_tags_become_reasoning() {
    let server = MockServer::start().await;
    let first = content_frame("<thi");
    let second = content_frame("nk>check units</think>The answer");
    let third = content_frame(" is 4.");
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(sse_response(sse(&[&first, &second, &third])))
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, false).await;
    let snapshot = pipeline.orchestrator.submit(turn("2+2?")).await.wait().await;

    assert_eq!(snapshot.accumulated_visible, "The answer is 4.");
    assert_eq!(snapshot.accumulated_reasoning, "check units");
    let answer = pipeline.messages().await.pop().unwrap();
    assert_eq!(answer.reasoning_text.as_deref(), Some("check units"));
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let server = MockServer::start().await;
    let good = content_frame("still here");
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(sse_response(sse(&["{not json", &good])))
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, false).await;
    let snapshot = pipeline.orchestrator.submit(turn("hi")).await.wait().await;

    assert_eq!(snapshot.outcome, SessionOutcome::Finished);
    assert_eq!(snapshot.accumulated_visible, "still here");
}

#[tokio::test]
async fn http_error_becomes_an_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, false).await;
    let snapshot = pipeline.orchestrator.submit(turn("hi")).await.wait().await;

    let SessionOutcome::Failed(summary) = snapshot.outcome else {
        panic!("expected failure");
    };
    assert!(summary.contains("429"));
    let messages = pipeline.messages().await;
    assert_eq!(messages.last().unwrap().marker, Some(MessageMarker::Error));
    assert!(messages.iter().all(|m| m.role != Role::Assistant));
}

#[tokio::test]
async fn search_results_reach_the_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{"title": "Rust 2024", "url": "https://blog.rust-lang.org", "content": "Edition news"}]
        })))
        .mount(&server)
        .await;
    let answer = content_frame("Edition 2024 shipped.");
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_string_contains("[search results]"))
        .and(body_string_contains("https://blog.rust-lang.org"))
        .respond_with(sse_response(sse(&[&answer])))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, true).await;
    let snapshot = pipeline
        .orchestrator
        .submit(turn("what's new in rust?"))
        .await
        .wait()
        .await;

    assert_eq!(snapshot.outcome, SessionOutcome::Finished);
    assert_eq!(snapshot.search_results.len(), 1);
    let stored = pipeline.messages().await.pop().unwrap();
    assert_eq!(stored.search_results[0].title, "Rust 2024");
}

#[tokio::test]
async fn search_outage_does_not_block_the_answer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    let answer = content_frame("From memory: ...");
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(sse_response(sse(&[&answer])))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, true).await;
    let snapshot = pipeline.orchestrator.submit(turn("news?")).await.wait().await;

    assert_eq!(snapshot.outcome, SessionOutcome::Finished);
    assert!(snapshot.search_results.is_empty());
    assert_eq!(snapshot.accumulated_visible, "From memory: ...");
}
