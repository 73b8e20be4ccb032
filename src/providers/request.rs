//! Vendor-shaped request construction.
//!
//! One normalized message list goes in, a [`PreparedRequest`] comes out. The
//! wire format and credential placement come from the provider table.

use super::anthropic_types as anthropic;
use super::catalog::{AuthStyle, ResolvedProvider, WireFormat};
use super::gemini_types as gemini;
use super::images::{ResolvedImage, resolve_images};
use super::openai_types as openai;
use super::responses_types as responses;
use crate::config::GenerationConfig;
use crate::core::{Message, ModelDescriptor, Role};
use crate::error::{ChatError, Result};
use serde_json::Value;

/// Sampling parameters applied to one request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: None,
            system_prompt: None,
            max_tokens: None,
        }
    }
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            system_prompt: config
                .system_prompt
                .clone()
                .filter(|prompt| !prompt.trim().is_empty()),
            max_tokens: Some(config.max_tokens),
        }
    }
}

/// A ready-to-send request. Holds the credential, so `Debug` redacts it.
#[derive(Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub streaming: bool,
    pub wire: WireFormat,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl std::fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        let url = self.url.split('?').next().unwrap_or(&self.url);
        f.debug_struct("PreparedRequest")
            .field("url", &url)
            .field("headers", &header_names)
            .field("streaming", &self.streaming)
            .field("wire", &self.wire)
            .finish_non_exhaustive()
    }
}

/// A message after image resolution, in vendor-neutral form.
struct Turn {
    role: Role,
    text: String,
    images: Vec<ResolvedImage>,
}

pub struct RequestBuilder<'a> {
    provider: &'a ResolvedProvider,
    model: &'a ModelDescriptor,
    params: &'a GenerationParams,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        provider: &'a ResolvedProvider,
        model: &'a ModelDescriptor,
        params: &'a GenerationParams,
    ) -> Self {
        Self {
            provider,
            model,
            params,
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        self.provider.config.wire_format()
    }

    /// Build the request for `messages`. Image files are read here.
    pub async fn build(&self, messages: &[Message]) -> Result<PreparedRequest> {
        let mut system_parts: Vec<String> = self.params.system_prompt.iter().cloned().collect();
        let mut turns = Vec::with_capacity(messages.len());
        for message in messages {
            if message.role == Role::System {
                if !message.text.trim().is_empty() {
                    system_parts.push(message.text.clone());
                }
                continue;
            }
            turns.push(Turn {
                role: message.role,
                text: message.text.clone(),
                images: resolve_images(&message.images).await,
            });
        }
        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

        let wire = self.wire_format();
        let body = match wire {
            WireFormat::ChatCompletions => serde_json::to_value(self.chat_body(system, turns)),
            WireFormat::Responses => serde_json::to_value(self.responses_body(system, turns)),
            WireFormat::AnthropicMessages => {
                serde_json::to_value(self.anthropic_body(system, turns))
            }
            WireFormat::GeminiGenerate => serde_json::to_value(self.gemini_body(system, turns)),
        }
        .map_err(|error| ChatError::Decode(format!("request body serialization failed: {error}")))?;

        let (url, headers) = self.transport_target()?;
        Ok(PreparedRequest {
            url,
            headers,
            body,
            streaming: wire.is_streaming(),
            wire,
        })
    }

    fn transport_target(&self) -> Result<(String, Vec<(String, String)>)> {
        let config = &self.provider.config;
        let key = &self.provider.api_key;
        let mut url = config.endpoint_url(&self.model.id);
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];

        match config.auth_style {
            AuthStyle::BearerHeader => {
                headers.push(("Authorization".to_string(), format!("Bearer {key}")));
            }
            AuthStyle::ApiKeyHeader => headers.push(("x-api-key".to_string(), key.clone())),
            AuthStyle::UrlQueryKey => {
                let mut parsed = url::Url::parse(&url).map_err(|error| {
                    ChatError::Configuration(format!("{} endpoint is invalid: {error}", config.name))
                })?;
                parsed.query_pairs_mut().append_pair("key", key);
                url = parsed.into();
            }
        }
        headers.extend(config.extra_headers.iter().cloned());
        Ok((url, headers))
    }

    fn chat_body(&self, system: Option<String>, turns: Vec<Turn>) -> openai::ChatRequest {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if let Some(system) = system {
            messages.push(openai::Message {
                role: "system",
                content: openai::MessageContent::Text(system),
            });
        }
        messages.extend(turns.into_iter().map(|turn| {
            let content = if turn.images.is_empty() {
                openai::MessageContent::Text(turn.text)
            } else {
                let mut parts = vec![openai::ContentPart::Text { text: turn.text }];
                parts.extend(turn.images.iter().map(|image| openai::ContentPart::ImageUrl {
                    image_url: openai::ImageUrlContent {
                        url: image.data_url(),
                    },
                }));
                openai::MessageContent::Parts(parts)
            };
            openai::Message {
                role: role_name(turn.role),
                content,
            }
        }));

        openai::ChatRequest {
            model: self.model.id.clone(),
            messages,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
            max_tokens: self.params.max_tokens,
            stream: true,
            stream_options: Some(openai::StreamOptions {
                include_usage: true,
            }),
        }
    }

    fn responses_body(&self, system: Option<String>, turns: Vec<Turn>) -> responses::ResponsesRequest {
        let input = turns
            .into_iter()
            .map(|turn| {
                let content = if turn.images.is_empty() {
                    responses::ResponsesContent::Text(turn.text)
                } else {
                    let mut parts = vec![responses::ResponsesPart::InputText { text: turn.text }];
                    parts.extend(turn.images.iter().map(|image| {
                        responses::ResponsesPart::InputImage {
                            image_url: image.data_url(),
                        }
                    }));
                    responses::ResponsesContent::Parts(parts)
                };
                responses::ResponsesInput {
                    role: role_name(turn.role),
                    content,
                }
            })
            .collect();

        responses::ResponsesRequest {
            model: self.model.id.clone(),
            input,
            instructions: system,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
            max_output_tokens: self.params.max_tokens,
            stream: true,
        }
    }

    fn anthropic_body(&self, system: Option<String>, turns: Vec<Turn>) -> anthropic::ChatRequest {
        let messages = turns
            .into_iter()
            .map(|turn| {
                let content = if turn.images.is_empty() {
                    anthropic::MessageContent::Text(turn.text)
                } else {
                    let mut blocks = vec![anthropic::InputContentBlock::Text { text: turn.text }];
                    blocks.extend(turn.images.into_iter().map(|image| {
                        anthropic::InputContentBlock::Image {
                            source: anthropic::AnthropicImageSource::Base64 {
                                media_type: image.mime_type,
                                data: image.data,
                            },
                        }
                    }));
                    anthropic::MessageContent::Blocks(blocks)
                };
                anthropic::Message {
                    role: role_name(turn.role),
                    content,
                }
            })
            .collect();

        anthropic::ChatRequest {
            model: self.model.id.clone(),
            max_tokens: self.params.max_tokens.unwrap_or(4096),
            system,
            messages,
            temperature: self.params.temperature.min(1.0),
            top_p: self.params.top_p,
        }
    }

    fn gemini_body(&self, system: Option<String>, turns: Vec<Turn>) -> gemini::GenerateContentRequest {
        let contents = turns
            .into_iter()
            .map(|turn| {
                let mut parts = vec![gemini::Part::text(turn.text)];
                parts.extend(turn.images.into_iter().map(|image| gemini::Part {
                    text: None,
                    inline_data: Some(gemini::InlineData {
                        mime_type: image.mime_type,
                        data: image.data,
                    }),
                }));
                gemini::Content {
                    role: Some(match turn.role {
                        Role::Assistant => "model",
                        Role::User | Role::System => "user",
                    }),
                    parts,
                }
            })
            .collect();

        gemini::GenerateContentRequest {
            contents,
            system_instruction: system.map(|text| gemini::Content {
                role: None,
                parts: vec![gemini::Part::text(text)],
            }),
            generation_config: gemini::GenerationConfig {
                temperature: self.params.temperature,
                top_p: self.params.top_p,
                max_output_tokens: self.params.max_tokens,
            },
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}
