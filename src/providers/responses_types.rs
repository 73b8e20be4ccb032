use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(super) struct ResponsesRequest {
    pub(super) model: String,
    pub(super) input: Vec<ResponsesInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) instructions: Option<String>,
    pub(super) temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) max_output_tokens: Option<u32>,
    pub(super) stream: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct ResponsesInput {
    pub(super) role: &'static str,
    pub(super) content: ResponsesContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(super) enum ResponsesContent {
    Text(String),
    Parts(Vec<ResponsesPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum ResponsesPart {
    InputText { text: String },
    InputImage { image_url: String },
}

/// One typed event of a responses stream. Unused fields of other event
/// kinds are ignored.
#[derive(Debug, Deserialize)]
pub(super) struct ResponsesEvent {
    #[serde(rename = "type")]
    pub(super) kind: String,
    pub(super) delta: Option<String>,
    pub(super) response: Option<ResponsesEnvelope>,
    pub(super) message: Option<String>,
    pub(super) code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ResponsesEnvelope {
    pub(super) usage: Option<ResponsesUsage>,
    pub(super) error: Option<ResponsesError>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ResponsesUsage {
    #[serde(default)]
    pub(super) input_tokens: u64,
    #[serde(default)]
    pub(super) output_tokens: u64,
    pub(super) total_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ResponsesError {
    pub(super) code: Option<String>,
    pub(super) message: Option<String>,
}
