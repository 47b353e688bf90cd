#![doc = include_str!("../README.md")]

pub mod config;
pub mod conversation;
pub mod http_request;
pub mod input;
pub mod openai;
pub mod session;
pub mod sse;
pub mod stream;
pub mod transport;

use std::{io, sync::Arc};

use http_request::HttpRequest;
use openai::{CompletionBody, Message, Role};

/// A completion API configuration.
#[derive(Clone, Debug)]
pub struct Api {
    /// The API token, sent as a bearer token.
    token: Arc<str>,
    /// The default model to use for requests.
    default_model: Arc<str>,
    /// The default maximum number of tokens for responses.
    default_max_tokens: u32,
    /// The API endpoint host (without protocol or path).
    endpoint_host: Arc<str>,
}

impl Api {
    /// Creates a new API instance.
    ///
    /// Requires a valid API token.
    pub fn new<S: Into<Arc<str>>>(token: S) -> Self {
        Self {
            token: token.into(),
            default_model: Arc::from(openai::DEFAULT_MODEL),
            default_max_tokens: 1024,
            endpoint_host: Arc::from(openai::DEFAULT_ENDPOINT_HOST),
        }
    }

    /// Sets the default model for requests.
    ///
    /// If not set, [`openai::DEFAULT_MODEL`] will be used.
    pub fn default_model<S: Into<Arc<str>>>(mut self, model: S) -> Self {
        self.default_model = model.into();
        self
    }

    /// Sets the default maximum tokens for responses.
    ///
    /// If not set, the default is 1024.
    pub fn default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    /// Sets the API endpoint host.
    ///
    /// If not set, [`openai::DEFAULT_ENDPOINT_HOST`] will be used.
    pub fn endpoint_host<S: Into<Arc<str>>>(mut self, endpoint_host: S) -> Self {
        self.endpoint_host = endpoint_host.into();
        self
    }

    /// Creates the required headers for any API request.
    fn create_default_headers(&self) -> Vec<(&'static str, Arc<str>)> {
        vec![
            ("content-type", Arc::from("application/json")),
            ("authorization", Arc::from(format!("Bearer {}", self.token))),
        ]
    }
}

/// Builder for chat completion requests.
///
/// Generation parameters default to deterministic, single candidate, streamed replies.
#[derive(Debug)]
pub struct CompletionRequestBuilder {
    /// The model to use for the request.
    ///
    /// If none is provided, the default model will be used.
    model: Option<String>,
    /// The maximum number of tokens for the response.
    ///
    /// If none is provided, the default max tokens will be used.
    max_tokens: Option<u32>,
    temperature: f32,
    n: u32,
    stream: bool,
    /// The messages to send.
    messages: im::Vector<Message>,
}

impl Default for CompletionRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionRequestBuilder {
    /// Creates a new completion request builder.
    pub fn new() -> Self {
        Self {
            model: None,
            max_tokens: None,
            temperature: 0.0,
            n: 1,
            stream: true,
            messages: im::Vector::new(),
        }
    }

    /// Sets the model for the request.
    pub fn model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the maximum tokens for the request.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the number of candidates to generate.
    pub fn n(mut self, n: u32) -> Self {
        self.n = n;
        self
    }

    /// Sets whether the reply is streamed.
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Appends a message to the request.
    pub fn push(mut self, message: Message) -> Self {
        self.messages.push_back(message);
        self
    }

    /// Constructs and appends a message to the request.
    pub fn push_message<S: Into<String>>(self, role: Role, text: S) -> Self {
        self.push(Message::new(role, text))
    }

    /// Replace all messages in the request with given messages.
    pub fn set_messages(mut self, messages: im::Vector<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Builds the HTTP request.
    pub fn build(&self, api: &Api) -> HttpRequest {
        let mut headers = api.create_default_headers();

        if self.stream {
            headers.push(("accept", Arc::from("text/event-stream")));
        }

        let body = {
            let model: &str = match self.model {
                Some(ref model) => model,
                None => &api.default_model,
            };

            let body = CompletionBody {
                model,
                messages: &self.messages,
                max_tokens: self.max_tokens.unwrap_or(api.default_max_tokens),
                temperature: self.temperature,
                n: self.n,
                stream: self.stream,
            };

            serde_json::to_string(&body).expect("failed to serialize messages")
        };

        HttpRequest {
            host: api.endpoint_host.to_string(),
            path: openai::COMPLETIONS_PATH.to_string(),
            method: "POST",
            headers,
            body,
        }
    }
}

/// A completion API error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("API error: {0}")]
    Api(#[from] openai::ApiError),
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Connection closed in the middle of an event")]
    UnexpectedEof,
    #[error("Response is not an event stream: {0}")]
    InvalidStream(String),
}
