use super::decoder::{DeltaStream, open_response};
use super::http_client::build_provider_client;
use super::request::PreparedRequest;
use crate::error::Result;
use std::future::Future;
use std::pin::Pin;

/// Sends a prepared request and hands back its decoded delta stream.
///
/// The orchestrator only talks to providers through this seam, so tests can
/// substitute scripted streams.
pub trait CompletionClient: Send + Sync {
    fn open_stream<'a>(
        &'a self,
        request: PreparedRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    client: reqwest::Client,
}

impl HttpCompletionClient {
    pub fn new() -> Self {
        Self::with_client(build_provider_client())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionClient for HttpCompletionClient {
    fn open_stream<'a>(
        &'a self,
        request: PreparedRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self.client.post(&request.url).json(&request.body);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if request.streaming {
                builder = builder.header("Accept", "text/event-stream");
            }

            let response = builder.send().await?;
            open_response(response, request.wire).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeltaEvent, Message, ModelDescriptor};
    use crate::providers::catalog::{ProviderConfig, ProviderKind, ResolvedProvider};
    use crate::providers::request::{GenerationParams, RequestBuilder};
    use futures_util::StreamExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn custom_provider(base_url: String) -> ResolvedProvider {
        ResolvedProvider {
            config: ProviderConfig {
                kind: ProviderKind::Custom,
                name: "mock".into(),
                base_url,
                auth_style: crate::providers::catalog::AuthStyle::BearerHeader,
                endpoint_path: "/v1/chat/completions".into(),
                extra_headers: Vec::new(),
            },
            api_key: "mock-key".into(),
        }
    }

    #[tokio::test]
    async fn streams_sse_body_from_server() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer mock-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = custom_provider(server.uri());
        let model = ModelDescriptor::infer("mock-model", ProviderKind::Custom);
        let params = GenerationParams::default();
        let request = RequestBuilder::new(&provider, &model, &params)
            .build(&[Message::user("hello")])
            .await
            .unwrap();

        let client = HttpCompletionClient::new();
        let events: Vec<DeltaEvent> = client
            .open_stream(request)
            .await
            .unwrap()
            .map(|event| event.unwrap())
            .collect()
            .await;

        let text: String = events.iter().map(|e| e.visible_text.as_str()).collect();
        assert_eq!(text, "Hi!");
        assert!(events.last().unwrap().is_terminal);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connection_error() {
        let provider = custom_provider("http://127.0.0.1:9".into());
        let model = ModelDescriptor::infer("m", ProviderKind::Custom);
        let params = GenerationParams::default();
        let request = RequestBuilder::new(&provider, &model, &params)
            .build(&[Message::user("x")])
            .await
            .unwrap();

        let Err(error) = HttpCompletionClient::new().open_stream(request).await else {
            panic!("expected connection failure");
        };
        assert!(matches!(error, crate::error::ChatError::Connection(_)));
    }
}
