use super::*;
use futures_util::stream;

fn byte_chunks(chunks: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, std::io::Error>> + Send + 'static {
    let owned: Vec<std::result::Result<Vec<u8>, std::io::Error>> =
        chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
    stream::iter(owned)
}

async fn collect(chunks: &[&str], wire: WireFormat) -> Vec<Result<DeltaEvent>> {
    decode_stream(byte_chunks(chunks), wire).collect().await
}

async fn collect_ok(chunks: &[&str], wire: WireFormat) -> Vec<DeltaEvent> {
    collect(chunks, wire)
        .await
        .into_iter()
        .map(|item| item.unwrap())
        .collect()
}

fn visible(events: &[DeltaEvent]) -> String {
    events.iter().map(|e| e.visible_text.as_str()).collect()
}

fn reasoning(events: &[DeltaEvent]) -> String {
    events.iter().map(|e| e.reasoning_text.as_str()).collect()
}

fn content_frame(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    )
}

#[tokio::test]
async fn done_with_no_frames_ends_cleanly_with_terminal_event() {
    let events = collect_ok(&["data: [DONE]\n\n"], WireFormat::ChatCompletions).await;
    assert_eq!(events, vec![DeltaEvent::terminal()]);
}

#[tokio::test]
async fn done_terminates_every_streaming_wire() {
    for wire in [WireFormat::ChatCompletions, WireFormat::Responses] {
        let events = collect_ok(&[": ping\n", "data: [DONE]\n", "data: ignored\n"], wire).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal);
    }
}

#[tokio::test]
async fn malformed_frame_between_valid_frames_is_skipped() {
    let first = content_frame("Hel");
    let second = content_frame("lo");
    let events = collect_ok(
        &[&first, "data: {not json\n\n", &second, "data: [DONE]\n\n"],
        WireFormat::ChatCompletions,
    )
    .await;

    assert_eq!(visible(&events), "Hello");
    assert_eq!(events.len(), 3);
    assert!(events.last().unwrap().is_terminal);
}

#[tokio::test]
async fn role_announcement_frame_yields_no_event() {
    let answer = content_frame("Hi");
    let events = collect_ok(
        &[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            &answer,
            "data: [DONE]\n\n",
        ],
        WireFormat::ChatCompletions,
    )
    .await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].visible_text, "Hi");
    assert!(events[1].is_terminal);
}

#[tokio::test]
async fn frames_split_across_network_chunks_are_reassembled() {
    let frame = content_frame("split frame");
    let (head, tail) = frame.split_at(12);
    let events = collect_ok(&[head, tail, "data: [DO", "NE]\n"], WireFormat::ChatCompletions).await;
    assert_eq!(visible(&events), "split frame");
}

#[tokio::test]
async fn crlf_framed_stream_decodes() {
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\r\n\r\ndata: [DONE]\r\n\r\n";
    let events = collect_ok(&[body], WireFormat::ChatCompletions).await;
    assert_eq!(visible(&events), "hi");
}

#[tokio::test]
async fn dedicated_reasoning_fields_pass_through() {
    let frames = [
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"reasoning_content\":\"think \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"reasoning_details\":[{\"type\":\"reasoning.text\",\"text\":\"more\"}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"answer\"}}]}\n\n",
        "data: [DONE]\n\n",
    ];
    let events = collect_ok(&frames, WireFormat::ChatCompletions).await;
    assert_eq!(reasoning(&events), "think more");
    assert_eq!(visible(&events), "answer");
}

#[tokio::test]
async fn inline_think_tags_are_split_across_frames() {
    let a = content_frame("A<think>B");
    let b = content_frame("C</think>D");
    let events = collect_ok(&[&a, &b, "data: [DONE]\n\n"], WireFormat::ChatCompletions).await;

    assert_eq!(events[0], DeltaEvent::text("A", ""));
    assert_eq!(events[1], DeltaEvent::text("D", "BC"));
}

#[tokio::test]
async fn usage_frame_is_forwarded() {
    let frames = [
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":3,\"total_tokens\":15}}\n\n",
        "data: [DONE]\n\n",
    ];
    let events = collect_ok(&frames, WireFormat::ChatCompletions).await;
    assert_eq!(
        events[0].usage,
        Some(TokenUsage {
            prompt_tokens: 12,
            completion_tokens: 3,
            total_tokens: Some(15)
        })
    );
}

#[tokio::test]
async fn unclosed_think_span_is_flushed_in_terminal_event() {
    let frame = content_frame("ok<think>still going");
    let events = collect_ok(&[&frame], WireFormat::ChatCompletions).await;
    let terminal = events.last().unwrap();
    assert!(terminal.is_terminal);
    assert_eq!(terminal.reasoning_text, "still going");
}

#[tokio::test]
async fn body_ending_without_newline_still_decodes_last_frame() {
    let events = collect_ok(
        &["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"],
        WireFormat::ChatCompletions,
    )
    .await;
    assert_eq!(visible(&events), "tail");
}

#[tokio::test]
async fn responses_events_map_to_deltas_and_usage() {
    let frames = [
        "event: response.created\ndata: {\"type\":\"response.created\",\"response\":{}}\n\n",
        "data: {\"type\":\"response.reasoning_summary_text.delta\",\"delta\":\"plan\"}\n\n",
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hi\"}\n\n",
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\" there\"}\n\n",
        "data: {\"type\":\"response.completed\",\"response\":{\"usage\":{\"input_tokens\":5,\"output_tokens\":2,\"total_tokens\":7}}}\n\n",
    ];
    let events = collect_ok(&frames, WireFormat::Responses).await;

    assert_eq!(reasoning(&events), "plan");
    assert_eq!(visible(&events), "Hi there");
    let usage = events.iter().find_map(|e| e.usage).unwrap();
    assert_eq!(usage.prompt_tokens, 5);
    assert_eq!(usage.completion_tokens, 2);
}

#[tokio::test]
async fn responses_error_event_ends_stream_with_error() {
    let frames = [
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\"par\"}\n\n",
        "data: {\"type\":\"error\",\"message\":\"quota exhausted\"}\n\n",
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\"never\"}\n\n",
    ];
    let items = collect(&frames, WireFormat::Responses).await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap().visible_text, "par");
    let error = items[1].as_ref().unwrap_err();
    assert!(error.to_string().contains("quota exhausted"));
}

#[tokio::test]
async fn transport_error_mid_body_surfaces_as_connection_error() {
    let source = stream::iter(vec![
        Ok(content_frame("x").into_bytes()),
        Err(std::io::Error::other("reset by peer")),
    ]);
    let items: Vec<_> = decode_stream(source, WireFormat::ChatCompletions).collect().await;
    assert!(matches!(items.last(), Some(Err(ChatError::Connection(_)))));
}

#[tokio::test]
async fn anthropic_one_shot_maps_thinking_and_usage() {
    let body = r#"{
        "content": [
            {"type": "thinking", "thinking": "consider", "signature": "sig"},
            {"type": "text", "text": "Bonjour"}
        ],
        "usage": {"input_tokens": 9, "output_tokens": 4}
    }"#;
    let events: Vec<_> = decode_one_shot(body, WireFormat::AnthropicMessages)
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].visible_text, "Bonjour");
    assert_eq!(events[0].reasoning_text, "consider");
    assert_eq!(events[0].usage.unwrap().total_tokens, Some(13));
    assert!(events[1].is_terminal);
}

#[tokio::test]
async fn gemini_one_shot_separates_thought_parts() {
    let body = r#"{
        "candidates": [{"content": {"role": "model", "parts": [
            {"text": "hmm", "thought": true},
            {"text": "Answer"}
        ]}}],
        "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 1, "totalTokenCount": 4}
    }"#;
    let events: Vec<_> = decode_one_shot(body, WireFormat::GeminiGenerate)
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    assert_eq!(events[0].visible_text, "Answer");
    assert_eq!(events[0].reasoning_text, "hmm");
    assert_eq!(events[0].usage.unwrap().prompt_tokens, 3);
}

#[test]
fn undecodable_one_shot_body_is_a_decode_error() {
    let Err(error) = decode_one_shot("<html>", WireFormat::GeminiGenerate) else {
        panic!("expected decode failure");
    };
    assert!(matches!(error, ChatError::Decode(_)));
}

#[tokio::test]
async fn non_success_status_is_a_transport_error_with_scrubbed_body() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string("{\"error\":\"invalid key sk-live1234567890abcdef\"}"),
        )
        .mount(&server)
        .await;

    let client = crate::providers::http_client::build_provider_client();
    let response = client.post(server.uri()).send().await.unwrap();
    let Err(error) = open_response(response, WireFormat::ChatCompletions).await else {
        panic!("expected transport error");
    };
    match error {
        ChatError::Transport { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("invalid key"));
            assert!(!body.contains("sk-live1234567890abcdef"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
