//! Turns provider response bodies into canonical [`DeltaEvent`]s.
//!
//! Streaming formats are read line by line. A frame that fails to decode is
//! dropped and the stream keeps going; only a transport failure or an
//! explicit error event ends it early. Every stream finishes with exactly one
//! terminal event.

use super::anthropic_types as anthropic;
use super::catalog::WireFormat;
use super::gemini_types as gemini;
use super::openai_types as openai;
use super::responses_types as responses;
use super::sse::{LineBuffer, SseLine, classify_line};
use crate::core::{DeltaEvent, TokenUsage};
use crate::error::{ChatError, Result};
use crate::reasoning::{ReasoningDelta, ReasoningExtractor};
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<DeltaEvent>> + Send + 'static>>;

/// Check the status of `response` and wrap its body in a [`DeltaStream`].
pub async fn open_response(response: reqwest::Response, wire: WireFormat) -> Result<DeltaStream> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatError::transport(status.as_u16(), &body));
    }

    if wire.is_streaming() {
        return Ok(decode_stream(response.bytes_stream(), wire));
    }

    let body = response.text().await?;
    decode_one_shot(&body, wire)
}

/// Decode an SSE byte stream. Dropping the returned stream drops the source.
pub fn decode_stream<S, B, E>(byte_stream: S, wire: WireFormat) -> DeltaStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let stream = async_stream::try_stream! {
        let mut byte_stream = Box::pin(byte_stream);
        let mut lines = LineBuffer::new();
        let mut frames = FrameDecoder::new(wire);
        let mut done = false;

        while !done {
            let Some(chunk) = byte_stream.next().await else {
                break;
            };
            let chunk = chunk.map_err(|error| ChatError::Connection(error.to_string()))?;
            lines.push_chunk(chunk.as_ref());

            while let Some(line) = lines.next_line() {
                match frames.feed_line(&line)? {
                    LineOutcome::Event(event) => yield event,
                    LineOutcome::Nothing => {}
                    LineOutcome::Done => {
                        done = true;
                        break;
                    }
                }
            }
        }

        if !done {
            if let Some(line) = lines.finish() {
                if let LineOutcome::Event(event) = frames.feed_line(&line)? {
                    yield event;
                }
            }
        }

        yield frames.finish();
    };

    Box::pin(stream)
}

/// Adapt a complete non-streaming body into one delta plus the terminal event.
pub fn decode_one_shot(body: &str, wire: WireFormat) -> Result<DeltaStream> {
    let mut extractor = ReasoningExtractor::new();
    let event = match wire {
        WireFormat::AnthropicMessages => anthropic_event(body, &mut extractor)?,
        WireFormat::GeminiGenerate => gemini_event(body, &mut extractor)?,
        WireFormat::ChatCompletions | WireFormat::Responses => {
            return Err(ChatError::Decode(format!(
                "{wire:?} responses are streamed, not decoded in one shot"
            )));
        }
    };
    let terminal = terminal_event(extractor.finish());

    let events: Vec<Result<DeltaEvent>> = event.into_iter().chain([terminal]).map(Ok).collect();
    Ok(Box::pin(futures_util::stream::iter(events)))
}

fn anthropic_event(body: &str, extractor: &mut ReasoningExtractor) -> Result<Option<DeltaEvent>> {
    let response: anthropic::ChatResponse = serde_json::from_str(body)
        .map_err(|error| ChatError::Decode(format!("Claude response: {error}")))?;

    let mut content = String::new();
    let mut thinking = String::new();
    for block in response.content {
        match block {
            anthropic::ResponseContentBlock::Text { text } => content.push_str(&text),
            anthropic::ResponseContentBlock::Thinking { thinking: text } => {
                thinking.push_str(&text);
            }
            anthropic::ResponseContentBlock::Unsupported => {}
        }
    }
    let usage = response.usage.map(|usage| TokenUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: Some(usage.input_tokens + usage.output_tokens),
    });

    let split = extractor.process(&content, (!thinking.is_empty()).then_some(thinking.as_str()));
    Ok(wrap(split, usage))
}

fn gemini_event(body: &str, extractor: &mut ReasoningExtractor) -> Result<Option<DeltaEvent>> {
    let response: gemini::GenerateContentResponse = serde_json::from_str(body)
        .map_err(|error| ChatError::Decode(format!("Gemini response: {error}")))?;
    if let Some(error) = response.error {
        return Err(ChatError::transport(200, &error.message));
    }

    let mut content = String::new();
    let mut thoughts = String::new();
    let parts = response
        .candidates
        .into_iter()
        .flatten()
        .take(1)
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts);
    for part in parts {
        let Some(text) = part.text else { continue };
        if part.thought {
            thoughts.push_str(&text);
        } else {
            content.push_str(&text);
        }
    }
    let usage = response.usage_metadata.map(|usage| TokenUsage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    });

    let split = extractor.process(&content, (!thoughts.is_empty()).then_some(thoughts.as_str()));
    Ok(wrap(split, usage))
}

fn wrap(split: ReasoningDelta, usage: Option<TokenUsage>) -> Option<DeltaEvent> {
    let event = DeltaEvent::text(split.visible, split.reasoning).with_usage(usage);
    (!event.is_empty()).then_some(event)
}

fn terminal_event(tail: ReasoningDelta) -> DeltaEvent {
    DeltaEvent {
        is_terminal: true,
        ..DeltaEvent::text(tail.visible, tail.reasoning)
    }
}

enum LineOutcome {
    Event(DeltaEvent),
    Nothing,
    Done,
}

/// Per-stream frame state: the wire format and the reasoning splitter.
struct FrameDecoder {
    wire: WireFormat,
    extractor: ReasoningExtractor,
}

impl FrameDecoder {
    fn new(wire: WireFormat) -> Self {
        Self {
            wire,
            extractor: ReasoningExtractor::new(),
        }
    }

    fn feed_line(&mut self, line: &str) -> Result<LineOutcome> {
        let data = match classify_line(line) {
            SseLine::Done => return Ok(LineOutcome::Done),
            SseLine::Ignored => return Ok(LineOutcome::Nothing),
            SseLine::Data(data) => data,
        };

        let event = match self.wire {
            WireFormat::Responses => self.responses_frame(data)?,
            _ => self.chat_frame(data),
        };
        Ok(event.map_or(LineOutcome::Nothing, LineOutcome::Event))
    }

    fn chat_frame(&mut self, data: &str) -> Option<DeltaEvent> {
        let chunk = match serde_json::from_str::<openai::ChatCompletionChunk>(data) {
            Ok(chunk) => chunk,
            Err(error) => {
                tracing::debug!("dropping undecodable frame: {error}");
                return None;
            }
        };

        let usage = chunk.usage.map(|usage| TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        });
        let (content, explicit) = chunk
            .choices
            .first()
            .map(|choice| {
                (
                    choice.delta.content.clone().unwrap_or_default(),
                    choice.delta.explicit_reasoning(),
                )
            })
            .unwrap_or_default();

        let split = self.extractor.process(&content, explicit.as_deref());
        wrap(split, usage)
    }

    fn responses_frame(&mut self, data: &str) -> Result<Option<DeltaEvent>> {
        let event = match serde_json::from_str::<responses::ResponsesEvent>(data) {
            Ok(event) => event,
            Err(error) => {
                tracing::debug!("dropping undecodable responses event: {error}");
                return Ok(None);
            }
        };

        let delta = event.delta.as_deref().unwrap_or_default();
        match event.kind.as_str() {
            "response.output_text.delta" => Ok(wrap(self.extractor.process(delta, None), None)),
            "response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
                Ok(wrap(self.extractor.process("", Some(delta)), None))
            }
            "response.completed" => {
                let usage = event
                    .response
                    .and_then(|response| response.usage)
                    .map(|usage| TokenUsage {
                        prompt_tokens: usage.input_tokens,
                        completion_tokens: usage.output_tokens,
                        total_tokens: usage.total_tokens,
                    });
                Ok(wrap(ReasoningDelta::default(), usage))
            }
            "error" => {
                let message = event
                    .message
                    .or(event.code)
                    .unwrap_or_else(|| "unknown stream error".to_string());
                Err(ChatError::transport(200, &message))
            }
            "response.failed" => {
                let message = event
                    .response
                    .and_then(|response| response.error)
                    .and_then(|error| error.message.or(error.code))
                    .unwrap_or_else(|| "response failed".to_string());
                Err(ChatError::transport(200, &message))
            }
            _ => Ok(None),
        }
    }

    fn finish(&mut self) -> DeltaEvent {
        terminal_event(self.extractor.finish())
    }
}

#[cfg(test)]
mod tests;
