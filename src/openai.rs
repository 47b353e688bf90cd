//! OpenAI chat completion API related types.
//!
//! This module contains the subset of the chat completions API used by this crate: request
//! bodies, transcript messages, streamed reply chunks and error envelopes.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Default API endpoint host to use.
pub const DEFAULT_ENDPOINT_HOST: &str = "api.openai.com";

/// Path of the chat completions endpoint.
pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Default model to use for requests.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Default system prompt placed at the start of every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are ChatGPT, a large language model trained by \
     OpenAI. Answer my questions as concisely as possible.";

/// Data payload that marks the end of a streamed reply.
pub const DONE_MARKER: &str = "[DONE]";

/// The body of a request to the chat completions endpoint.
///
/// Usually it is better to use [`crate::CompletionRequestBuilder`] instead.
#[derive(Debug, Serialize)]
pub struct CompletionBody<'a> {
    /// The model to use for the request.
    pub model: &'a str,
    /// The messages to include in the request, in transcript order.
    pub messages: &'a im::Vector<Message>,
    /// The maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature. Always serialized, `0` is meaningful.
    pub temperature: f32,
    /// Number of candidates to generate.
    pub n: u32,
    /// Whether to stream the reply as server-sent events.
    pub stream: bool,
}

/// A role in a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Instructions that set up the assistant.
    System,
    /// Message from the user.
    User,
    /// Message from the model.
    Assistant,
}

/// A message in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Message {
    /// The role of the message.
    pub role: Role,
    /// The text of the message.
    pub content: String,
}

impl Message {
    /// Convenience function to construct a message.
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// OpenAI API error.
///
/// The `error` object of an error envelope, either returned as the body of a non-success response
/// or sent as an event in the middle of a stream.
#[derive(Clone, Debug, PartialEq, thiserror::Error, Deserialize, Serialize)]
#[error("{message}")]
pub struct ApiError {
    /// Human readable description.
    pub message: String,
    /// Error category, e.g. `invalid_request_error`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Machine readable code, e.g. `invalid_api_key`.
    #[serde(default)]
    pub code: Option<String>,
}

/// One decoded `data:` payload of a streamed reply.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChunkEnvelope {
    Error { error: ApiError },
    Chunk(StreamChunk),
}

/// A chunk of a streamed chat completion.
///
/// Only the parts needed to reassemble the reply are decoded. `choices` is required.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Delta,
}

/// Incremental message content carried by a chunk.
#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamChunk {
    /// Returns the text fragment carried by the first choice, if any.
    ///
    /// Role announcements and `finish_reason` chunks carry no text.
    pub fn fragment(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

/// Deserializes a single streamed chunk from an event's data payload.
///
/// Error envelopes are turned into [`Error::Api`].
pub fn deserialize_chunk(data: &str) -> Result<StreamChunk, Error> {
    match serde_json::from_str::<ChunkEnvelope>(data)? {
        ChunkEnvelope::Error { error } => Err(Error::Api(error)),
        ChunkEnvelope::Chunk(chunk) => Ok(chunk),
    }
}

/// Deserializes the error envelope of a non-success response body.
pub fn deserialize_error(body: &str) -> Option<ApiError> {
    #[derive(Deserialize)]
    struct Envelope {
        error: ApiError,
    }

    serde_json::from_str::<Envelope>(body)
        .ok()
        .map(|envelope| envelope.error)
}
